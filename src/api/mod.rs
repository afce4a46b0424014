//! HTTP API for task submission.
//!
//! Endpoints:
//! - `GET /` - health check
//! - `POST /task1` - generate (round 1) or revise (round > 1) an app and publish it

pub mod error;
pub mod receiver;
mod routes;
pub mod types;

pub use routes::{build_router, serve, AppState};
