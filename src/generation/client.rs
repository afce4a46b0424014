//! Chat-completion client.
//!
//! Sends one system + user exchange and returns the assistant text. The
//! upstream response shape has drifted across API revisions, so the reply is
//! read as a [`ReplyShape`]: the modern message content, the legacy
//! completion `text`, or, when neither is present, the raw body.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;
use crate::error::TaskError;

/// Anything that can turn a system/user message pair into reply text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String, TaskError>;
}

/// The shape an assistant reply was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyShape {
    /// `choices[0].message.content` (a string or a list of text parts)
    Message(String),
    /// `choices[0].text` from the legacy completions format
    LegacyText(String),
    /// Neither field was present; the whole body as text
    Raw(String),
}

impl ReplyShape {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::LegacyText(_) => "legacy_text",
            Self::Raw(_) => "raw",
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Message(text) | Self::LegacyText(text) | Self::Raw(text) => text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

impl MessageContent {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Parts(parts) => {
                let texts: Vec<String> = parts.into_iter().filter_map(|p| p.text).collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join(""))
                }
            }
        }
    }
}

/// Classify a response body into the reply shape it carries.
pub fn extract_reply(body: &str) -> ReplyShape {
    let Ok(parsed) = serde_json::from_str::<CompletionBody>(body) else {
        return ReplyShape::Raw(body.to_string());
    };

    let Some(choice) = parsed.choices.into_iter().next() else {
        return ReplyShape::Raw(body.to_string());
    };

    if let Some(text) = choice
        .message
        .and_then(|m| m.content)
        .and_then(MessageContent::into_text)
    {
        return ReplyShape::Message(text);
    }

    match choice.text {
        Some(text) => ReplyShape::LegacyText(text),
        None => ReplyShape::Raw(body.to_string()),
    }
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String, TaskError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| TaskError::Configuration("AI_API_KEY is not set".to_string()))?;

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let url = self.completions_url();
        tracing::debug!(model = %self.config.model, url = %url, "Requesting completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskError::upstream("llm", e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TaskError::upstream("llm", format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            tracing::warn!(status = %status, "LLM request returned non-success status");
            return Err(TaskError::upstream(
                "llm",
                format!("HTTP {}: {}", status, truncate(&text, 500)),
            ));
        }

        let reply = extract_reply(&text);
        tracing::info!(
            shape = reply.kind(),
            body_len = text.len(),
            "LLM reply received"
        );
        Ok(reply.into_text())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    &s[..idx]
}
