//! Errors raised while turning a task submission into a published app.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    /// A credential or setting needed for this step is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A remote service (LLM or source host) failed or answered non-success.
    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// The repository a revision round expects does not exist.
    #[error("Repository not found: {0}")]
    NotFound(String),

    /// Creating or updating a single file failed; the publish is aborted.
    #[error("Failed to handle file {path}: {message}")]
    FileOperation { path: String, message: String },

    /// The model output normalized to an empty `index` or `README`.
    #[error("LLM did not return expected file structure")]
    IncompleteGeneration,
}

impl TaskError {
    pub(crate) fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    pub(crate) fn file(path: &str, err: impl std::fmt::Display) -> Self {
        Self::FileOperation {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}
