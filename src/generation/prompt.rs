//! Prompt templates for app generation.

use serde_json::{json, Value};

use super::{DocStyle, GenerationRequest, RevisionContext};

/// A system instruction and the user message that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const BASE_RULES: &str = r#"Build a web page according to the brief. Return ONLY a JSON object with:
"index": complete HTML with a working implementation
"README": documentation for the app
"assets": optional object mapping extra file names to their text content or data URI

Rules:
- Follow the brief EXACTLY
- Match element ID names precisely
- Make every check pass
- Process all data client-side
- No placeholder or mock functionality
- Appropriate JavaScript libraries may be used, loaded from a CDN

Attachments:
- Attachments arrive as URLs or data URIs (data:<mime>;base64,<payload>)
- For text/csv, text/markdown, text/plain and application/json data URIs, decode the base64 payload and use the decoded content
- For image/* data URIs, reference the data URI directly (for example as an <img> src)"#;

const FULL_README_RULES: &str = r#"README format (use these sections, in this order):
# <App title>
## Summary
## Setup
## Usage
## Code Explanation
## License (MIT)"#;

const BRIEF_README_RULES: &str = "README format: a short markdown document with a title and usage notes.";

const UPDATE_RULES: &str = r#"Update mode:
- You are revising an app that is already published; its current files are in "existing_files"
- Preserve every behavior that already works and add the new requirements from the brief and checks
- Return the complete updated files, not a diff
- Inside data URIs, keep any ${...} sequences exactly as written; never decode, evaluate or rewrite them"#;

const UPDATE_INSTRUCTIONS: &str =
    "Update the existing app: keep everything that already works and implement the new brief and checks.";

/// Build the system instruction and user message for one generation round.
///
/// `revision` is only consulted for rounds after the first.
pub fn build(
    request: &GenerationRequest,
    revision: Option<&RevisionContext>,
    style: DocStyle,
) -> Prompt {
    let revising = request.is_revision();

    Prompt {
        system: system_instruction(style, revising),
        user: user_message(request, revision.filter(|_| revising)),
    }
}

fn system_instruction(style: DocStyle, revising: bool) -> String {
    let readme_rules = match style {
        DocStyle::Full => FULL_README_RULES,
        DocStyle::Brief => BRIEF_README_RULES,
    };

    let mut sections = vec![BASE_RULES, readme_rules];
    if revising {
        sections.push(UPDATE_RULES);
    }
    sections.join("\n\n")
}

fn user_message(request: &GenerationRequest, revision: Option<&RevisionContext>) -> String {
    let mut payload = json!({
        "brief": request.brief,
        "checks": request.checks,
        "attachments": request.attachments,
        "round": request.round,
    });

    if request.is_revision() {
        let existing = revision.cloned().unwrap_or_default();
        payload["mode"] = Value::from("update");
        payload["instructions"] = Value::from(UPDATE_INSTRUCTIONS);
        payload["existing_files"] = json!({
            "index.html": existing.index_html,
            "README.md": existing.readme_md,
        });
    }

    // Serializing a `Value` cannot fail.
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}
