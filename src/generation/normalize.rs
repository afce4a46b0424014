//! Recover a [`GeneratedFileSet`] from raw model output.
//!
//! Models asked for "only a JSON object" still wrap it in prose or markdown
//! fences, or return something that is not JSON at all. Candidates are tried
//! in order until one is an object carrying both `index` and `README`:
//! 1. the whole (trimmed) reply
//! 2. the bodies of fenced code blocks
//! 3. every complete top-level `{...}` found by [`balanced_objects`]
//! 4. a greedy first-`{`-to-last-`}` match
//!
//! The last candidate is best-effort only: on adversarial input it can span
//! several objects or cut one short, and then it simply fails to parse.
//!
//! When nothing qualifies the reply is used as the page itself and a README
//! is synthesized from the brief. Normalization never fails.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde_json::{Map, Value};

use super::{DocStyle, GeneratedFileSet};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap());
static GREEDY_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Normalize a model reply into the files to publish.
pub fn normalize(raw: &str, brief: &str, style: DocStyle) -> GeneratedFileSet {
    match find_file_object(raw) {
        Some(object) => from_object(&object),
        None => {
            tracing::debug!(
                reply_len = raw.len(),
                "Model reply held no usable JSON object, using fallback files"
            );
            fallback(raw, brief, style)
        }
    }
}

fn find_file_object(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();

    let fenced = FENCE_RE
        .captures_iter(trimmed)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim()));

    let greedy = GREEDY_OBJECT_RE.find(trimmed).map(|m| m.as_str());

    std::iter::once(trimmed)
        .chain(fenced)
        .chain(balanced_objects(trimmed))
        .chain(greedy)
        .find_map(parse_file_object)
}

fn parse_file_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) if map.contains_key("index") && map.contains_key("README") => {
            Some(map)
        }
        _ => None,
    }
}

/// Every complete top-level `{...}` in `text`, in order of appearance.
///
/// Braces inside JSON string literals (including escaped quotes) do not
/// count. An opening brace that never closes is skipped and scanning resumes
/// right after it, so a stray `{` in leading prose does not hide a later
/// object.
pub fn balanced_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut start = 0;

    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        match scan_object(&text.as_bytes()[open..]) {
            Some(len) => {
                objects.push(&text[open..open + len]);
                start = open + len;
            }
            None => start = open + 1,
        }
    }

    objects
}

/// Length of the object starting at `bytes[0] == b'{'`, if it closes.
fn scan_object(bytes: &[u8]) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(b),
            b'}' | b']' => {
                let expected = if b == b'}' { b'{' } else { b'[' };
                if stack.pop() != Some(expected) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

fn from_object(object: &Map<String, Value>) -> GeneratedFileSet {
    let assets = object
        .get("assets")
        .and_then(Value::as_object)
        .map(sanitize_assets)
        .filter(|assets| !assets.is_empty());

    GeneratedFileSet {
        index: value_text(object.get("index")),
        readme: value_text(object.get("README")),
        assets,
    }
}

/// Keep string (and null, as empty) asset values; drop everything else.
fn sanitize_assets(assets: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut kept = BTreeMap::new();
    for (name, value) in assets {
        match value {
            Value::String(content) => {
                kept.insert(name.clone(), content.clone());
            }
            Value::Null => {
                kept.insert(name.clone(), String::new());
            }
            other => {
                tracing::debug!(
                    asset = %name,
                    kind = json_kind(other),
                    "Dropping non-string asset value"
                );
            }
        }
    }
    kept
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn fallback(raw: &str, brief: &str, style: DocStyle) -> GeneratedFileSet {
    let readme = match style {
        DocStyle::Brief => format!("# {}\n\n{}", brief, raw),
        DocStyle::Full => full_readme(raw, brief, chrono::Utc::now().year()),
    };
    GeneratedFileSet {
        index: raw.to_string(),
        readme,
        assets: None,
    }
}

fn full_readme(raw: &str, brief: &str, year: i32) -> String {
    let title = brief
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Generated App");

    format!(
        r#"# {title}

## Summary

{brief}

## Setup

1. Clone this repository.
2. Open `index.html` in a modern browser, or serve the folder with any static file server.
3. The published copy is served by GitHub Pages from the `main` branch.

## Usage

{raw}

## Code Explanation

The whole application lives in `index.html`. Markup, styles and scripts run in the browser; there is no server-side component. Any files under the repository root besides `index.html` and `README.md` are assets loaded by the page.

## License

{license}
"#,
        title = title,
        brief = brief.trim(),
        raw = raw,
        license = mit_license(year),
    )
}

pub(crate) fn mit_license(year: i32) -> String {
    format!(
        r#"MIT License

Copyright (c) {year}

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE."#,
        year = year
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRIEF: &str = "Build a tip calculator";

    #[test]
    fn strict_json_keeps_fields_verbatim() {
        let raw = r##"{"index": "<html>{{ x }}</html>", "README": "# Tips\n", "extra": 1}"##;
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, "<html>{{ x }}</html>");
        assert_eq!(files.readme, "# Tips\n");
        assert_eq!(files.assets, None);
    }

    #[test]
    fn prose_wrapped_object_is_extracted() {
        let raw = "Here is the app:\n{\"index\": \"<p>hi</p>\", \"README\": \"readme\"}\nEnjoy!";
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, "<p>hi</p>");
        assert_eq!(files.readme, "readme");
    }

    #[test]
    fn fenced_block_is_extracted() {
        let raw = "Sure!\n```json\n{\"index\": \"a\", \"README\": \"b\"}\n```\n";
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, "a");
        assert_eq!(files.readme, "b");
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        let raw = r#"Result: {"index": "<script>if (a) { b(\"}\"); }</script>", "README": "x"} trailing }"#;
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, r#"<script>if (a) { b("}"); }</script>"#);
        assert_eq!(files.readme, "x");
    }

    #[test]
    fn stray_brace_in_prose_does_not_hide_the_object() {
        let raw = "Note { this is not json.\n{\"index\": \"i\", \"README\": \"r\"}";
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, "i");
    }

    #[test]
    fn later_object_with_required_keys_wins_over_earlier_one() {
        let raw = r#"{"note": "ignore"} then {"index": "i", "README": "r"}"#;
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, "i");
        assert_eq!(files.readme, "r");
    }

    #[test]
    fn non_string_required_values_become_text() {
        let raw = r#"{"index": null, "README": {"title": "x"}}"#;
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, "");
        assert_eq!(files.readme, r#"{"title":"x"}"#);
        assert!(!files.is_complete());
    }

    #[test]
    fn assets_keep_only_string_and_null_values() {
        let raw = r#"{
            "index": "i",
            "README": "r",
            "assets": {"style.css": "body{}", "empty.txt": null, "n.json": 3, "list": ["a"]}
        }"#;
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        let assets = files.assets.expect("assets kept");
        assert_eq!(assets.len(), 2);
        assert_eq!(assets["style.css"], "body{}");
        assert_eq!(assets["empty.txt"], "");
    }

    #[test]
    fn assets_without_string_entries_are_dropped() {
        let raw = r#"{"index": "i", "README": "r", "assets": {"a": 1, "b": false}}"#;
        assert_eq!(normalize(raw, BRIEF, DocStyle::Brief).assets, None);

        let raw = r#"{"index": "i", "README": "r", "assets": ["style.css"]}"#;
        assert_eq!(normalize(raw, BRIEF, DocStyle::Brief).assets, None);

        let raw = r#"{"index": "i", "README": "r", "assets": {}}"#;
        assert_eq!(normalize(raw, BRIEF, DocStyle::Brief).assets, None);
    }

    #[test]
    fn object_missing_readme_falls_back() {
        let raw = r#"{"index": "<html></html>"}"#;
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, raw);
        assert_eq!(files.readme, format!("# {}\n\n{}", BRIEF, raw));
    }

    #[test]
    fn plain_text_falls_back_to_brief_readme() {
        let raw = "<!DOCTYPE html><html><body>Tips</body></html>";
        let files = normalize(raw, BRIEF, DocStyle::Brief);
        assert_eq!(files.index, raw);
        assert_eq!(files.readme, format!("# {}\n\n{}", BRIEF, raw));
        assert_eq!(files.assets, None);
    }

    #[test]
    fn full_style_fallback_has_all_sections() {
        let raw = "just some text";
        let files = normalize(raw, "Tip calculator\nwith split support", DocStyle::Full);
        assert!(files.readme.starts_with("# Tip calculator\n"));
        for heading in [
            "## Summary",
            "## Setup",
            "## Usage",
            "## Code Explanation",
            "## License",
        ] {
            assert!(files.readme.contains(heading), "missing {}", heading);
        }
        assert!(files.readme.contains("## Usage\n\njust some text"));
        assert!(files.readme.contains("MIT License"));
    }

    #[test]
    fn empty_reply_does_not_panic() {
        let files = normalize("", BRIEF, DocStyle::Brief);
        assert_eq!(files.index, "");
        assert!(!files.is_complete());
    }

    #[test]
    fn balanced_objects_lists_top_level_objects_only() {
        let text = r#"a {"x": {"y": 1}} b {"z": [1, {"w": 2}]} c {unclosed"#;
        assert_eq!(
            balanced_objects(text),
            vec![r#"{"x": {"y": 1}}"#, r#"{"z": [1, {"w": 2}]}"#]
        );
    }

    #[test]
    fn mismatched_brackets_are_rejected() {
        assert!(balanced_objects("{ ] }").is_empty());
    }

    #[test]
    fn license_names_year() {
        assert!(mit_license(2031).contains("Copyright (c) 2031"));
    }
}
