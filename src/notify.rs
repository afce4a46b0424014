//! Evaluation callback with bounded retries.
//!
//! Delivery is best effort: [`Notifier::notify`] reports whether some attempt
//! got an HTTP 200 and never returns an error. After every failed attempt,
//! including the last one, it sleeps before moving on; the delay starts at
//! [`RetryPolicy::initial_delay`] and doubles each time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

/// Completion report sent to the evaluation URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationPayload {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

/// Attempt budget and timing for callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Delivers one JSON POST and reports the response status code.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> anyhow::Result<u16>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallbackTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> anyhow::Result<u16> {
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn CallbackTransport>,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(transport: Arc<dyn CallbackTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Notifier using [`HttpTransport`].
    pub fn http(policy: RetryPolicy) -> Self {
        Self::new(Arc::new(HttpTransport::new()), policy)
    }

    /// POST `payload` to `url`; `true` once an attempt gets HTTP 200.
    pub async fn notify(&self, url: &str, payload: &EvaluationPayload) -> bool {
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize evaluation payload");
                return false;
            }
        };

        let mut delay = self.policy.initial_delay;
        for attempt in 1..=self.policy.max_attempts {
            match self
                .transport
                .post_json(url, &body, self.policy.attempt_timeout)
                .await
            {
                Ok(200) => {
                    tracing::info!(attempt, url, "Evaluation callback delivered");
                    return true;
                }
                Ok(status) => {
                    tracing::warn!(attempt, status, url, "Evaluation callback rejected");
                }
                Err(e) => {
                    tracing::warn!(attempt, url, error = %e, "Evaluation callback failed");
                }
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        tracing::error!(
            attempts = self.policy.max_attempts,
            url,
            "Giving up on evaluation callback"
        );
        false
    }
}
