//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::generation::{Attachment, Checks};
use crate::pipeline::TaskSubmission;

/// Body of `POST /task1`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    pub email: String,

    /// Task id; also the repository name
    pub task: String,

    pub brief: String,

    /// List of assertions or one free-text block
    #[serde(default)]
    pub checks: Checks,

    /// 1 creates the app, anything higher revises it
    pub round: u32,

    pub nonce: String,

    pub secret: String,

    pub evaluation_url: String,

    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

impl TaskRequest {
    /// Drop the secret and default the optional fields.
    pub fn into_submission(self) -> TaskSubmission {
        TaskSubmission {
            email: self.email,
            task: self.task,
            brief: self.brief,
            checks: self.checks,
            attachments: self.attachments.unwrap_or_default(),
            round: self.round,
            nonce: self.nonce,
            evaluation_url: self.evaluation_url,
        }
    }
}

/// Successful `POST /task1` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskResponse {
    pub repository_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

impl From<crate::publish::PublishResult> for TaskResponse {
    fn from(result: crate::publish::PublishResult) -> Self {
        Self {
            repository_url: result.repository_url,
            commit_sha: result.commit_sha,
            pages_url: result.pages_url,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_and_checks_are_optional() {
        let request: TaskRequest = serde_json::from_str(
            r#"{
                "email": "a@b.c",
                "task": "demo",
                "brief": "Hello",
                "round": 1,
                "nonce": "n",
                "secret": "s",
                "evaluation_url": "http://eval.invalid/"
            }"#,
        )
        .unwrap();
        let submission = request.into_submission();
        assert!(submission.attachments.is_empty());
        assert_eq!(submission.checks, Checks::List(Vec::new()));
    }
}
