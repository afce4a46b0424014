//! # pagesmith
//!
//! Turns a web-app brief into a published single-page app.
//!
//! For each submission the service:
//! 1. builds a prompt from the brief, checks and attachments (plus the
//!    currently published files when revising)
//! 2. asks a chat-completion model for `{index, README, assets?}`
//! 3. normalizes whatever came back into a file set
//! 4. commits the files to a repository named after the task and enables
//!    static hosting
//! 5. reports the commit and URLs to the submitter's evaluation endpoint
//!
//! ## Example
//!
//! ```rust,ignore
//! use pagesmith::{api, config::Config};
//!
//! let config = Config::from_env()?;
//! api::serve(config).await?;
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod generation;
pub mod notify;
pub mod pipeline;
pub mod publish;

#[cfg(test)]
mod test_support;

pub use config::Config;
