//! HTTP route definitions.

use std::sync::{Arc, LazyLock};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use regex::Regex;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::types::{HealthResponse, TaskRequest, TaskResponse};
use crate::config::{Config, RepoBackend};
use crate::generation::LlmClient;
use crate::notify::Notifier;
use crate::pipeline::TaskRunner;
use crate::publish::{GitHubHost, InMemoryRepoHost, Publisher, RepoHost};

/// Repository names GitHub accepts.
static TASK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,100}$").unwrap());

/// Owner reported by the in-memory backend.
const LOCAL_OWNER: &str = "local";

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub runner: TaskRunner,
}

impl AppState {
    pub fn new(config: Config, runner: TaskRunner) -> Self {
        Self { config, runner }
    }

    /// Wire the runner for `config`: LLM client, selected repository backend
    /// and HTTP notifier.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let host: Arc<dyn RepoHost> = match config.repo_backend {
            RepoBackend::GitHub => {
                let token = config
                    .github
                    .token
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("GITHUB_TOKEN is required for the github backend"))?;
                Arc::new(GitHubHost::new(token, &config.github))
            }
            RepoBackend::Memory => {
                tracing::warn!("Using in-memory repository backend, nothing will be published");
                Arc::new(InMemoryRepoHost::new(LOCAL_OWNER))
            }
        };

        let runner = TaskRunner::new(
            Arc::new(LlmClient::new(config.llm.clone())),
            Publisher::new(host),
            Notifier::http(config.notify_retry.clone()),
            config.doc_style,
            config.notify_settle,
        );
        Ok(Self::new(config, runner))
    }
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::from_config(config)?);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/task1", post(submit_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    if req.secret != state.config.shared_secret {
        return Err(ApiError::Forbidden);
    }
    validate(&req)?;

    tracing::info!(
        task = %req.task,
        round = req.round,
        email = %req.email,
        "Accepted task submission"
    );
    let submission = req.into_submission();

    // Run detached so a dropped connection cannot stop a half-done publish
    // or the evaluation callback.
    let runner = state.runner.clone();
    let result = tokio::spawn(async move { runner.run(&submission).await })
        .await
        .map_err(|e| ApiError::Internal(format!("task runner aborted: {}", e)))??;
    Ok(Json(result.into()))
}

fn validate(req: &TaskRequest) -> Result<(), ApiError> {
    if req.round < 1 {
        return Err(ApiError::Validation("round must be at least 1".to_string()));
    }
    if !TASK_ID_RE.is_match(&req.task) || req.task == "." || req.task == ".." {
        return Err(ApiError::Validation(format!(
            "invalid task id: {:?}",
            req.task
        )));
    }
    match url::Url::parse(&req.evaluation_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(ApiError::Validation(format!(
            "unsupported evaluation_url scheme: {}",
            url.scheme()
        ))),
        Err(e) => Err(ApiError::Validation(format!("invalid evaluation_url: {}", e))),
    }
}
