//! Stand-in evaluation endpoint for local runs.
//!
//! Accepts the callback the notifier sends, logs headers and fields, and
//! answers 200 only when the body is a complete [`EvaluationPayload`].

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::notify::EvaluationPayload;

pub fn router() -> Router {
    Router::new()
        .route("/", post(receive))
        .layer(TraceLayer::new_for_http())
}

async fn receive(headers: HeaderMap, body: Bytes) -> Response {
    for (name, value) in headers.iter() {
        tracing::debug!(header = %name, value = ?value, "Evaluation request header");
    }

    match serde_json::from_slice::<EvaluationPayload>(&body) {
        Ok(payload) => {
            tracing::info!(
                email = %payload.email,
                task = %payload.task,
                round = payload.round,
                nonce = %payload.nonce,
                repo_url = %payload.repo_url,
                commit_sha = %payload.commit_sha,
                pages_url = %payload.pages_url,
                "Evaluation payload received"
            );
            Json(json!({
                "status": "ok",
                "message": "Evaluation payload received and validated",
            }))
            .into_response()
        }
        Err(e) => {
            let detail = format!("Invalid payload structure: {}", e);
            tracing::warn!(%detail, "Rejected evaluation payload");
            (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use serde_json::Value;

    #[tokio::test]
    async fn complete_payload_is_accepted() {
        let base = spawn_server(router()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/", base))
            .json(&json!({
                "email": "student@example.com",
                "task": "hello-app",
                "round": 1,
                "nonce": "n-1",
                "repo_url": "https://github.com/octo/hello-app",
                "commit_sha": "abc123",
                "pages_url": "https://octo.github.io/hello-app/",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let value: Value = response.json().await.unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn missing_field_or_bad_json_is_rejected() {
        let base = spawn_server(router()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/", base))
            .json(&json!({ "email": "student@example.com", "round": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let value: Value = response.json().await.unwrap();
        assert!(value["detail"]
            .as_str()
            .unwrap()
            .starts_with("Invalid payload structure"));

        let response = client
            .post(format!("{}/", base))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }
}
