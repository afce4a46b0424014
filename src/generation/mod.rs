//! App generation: prompt construction, the LLM call and reply normalization.
//!
//! The flow for one task is:
//! 1. `prompt::build` turns a [`GenerationRequest`] (plus an optional
//!    [`RevisionContext`] for round > 1) into a system/user message pair
//! 2. a [`TextGenerator`] sends them to the chat-completion endpoint
//! 3. `normalize::normalize` recovers a [`GeneratedFileSet`] from whatever
//!    text came back

mod client;
pub mod normalize;
pub mod prompt;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use client::{extract_reply, LlmClient, ReplyShape, TextGenerator};
pub use normalize::normalize;
pub use prompt::{build as build_prompt, Prompt};

/// Checks the generated app must satisfy.
///
/// Submissions send either a list of assertions or one free-text block; both
/// are passed to the model as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Checks {
    List(Vec<String>),
    Text(String),
}

impl Default for Checks {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// A named attachment: an http(s) URL or a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

impl Attachment {
    /// MIME type declared by a `data:` URI, if this is one.
    pub fn data_uri_mime(&self) -> Option<&str> {
        let rest = self.url.strip_prefix("data:")?;
        let header = rest.split(',').next()?;
        let mime = header.split(';').next().unwrap_or("");
        if mime.is_empty() {
            Some("text/plain")
        } else {
            Some(mime)
        }
    }
}

/// Everything the prompt needs to describe one generation round.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: String,
    pub brief: String,
    pub checks: Checks,
    pub attachments: Vec<Attachment>,
    pub round: u32,
}

impl GenerationRequest {
    pub fn is_revision(&self) -> bool {
        self.round > 1
    }
}

/// Previously published files, loaded before prompting a revision round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionContext {
    pub index_html: Option<String>,
    pub readme_md: Option<String>,
}

/// Files recovered from a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFileSet {
    pub index: String,
    #[serde(rename = "README")]
    pub readme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<BTreeMap<String, String>>,
}

impl GeneratedFileSet {
    /// Both required files carry content.
    pub fn is_complete(&self) -> bool {
        !self.index.trim().is_empty() && !self.readme.trim().is_empty()
    }
}

/// README template the model is asked for, and the one synthesized when a
/// reply cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStyle {
    /// `# {brief}` heading followed by the reply text
    Brief,
    /// Summary / Setup / Usage / Code Explanation / License sections
    Full,
}

impl FromStr for DocStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "brief" | "basic" => Ok(Self::Brief),
            "full" | "rich" => Ok(Self::Full),
            other => Err(format!("expected `brief` or `full`, got: {}", other)),
        }
    }
}
