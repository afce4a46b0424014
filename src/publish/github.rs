//! GitHub REST API host.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;

use super::{HostError, RemoteFile, RepoHost, RepoInfo};
use crate::config::GitHubConfig;

#[derive(Debug, Deserialize)]
struct UserBody {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoBody {
    name: String,
    html_url: String,
    owner: UserBody,
}

impl From<RepoBody> for RepoInfo {
    fn from(body: RepoBody) -> Self {
        Self {
            owner: body.owner.login,
            name: body.name,
            html_url: body.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    sha: String,
}

/// Talks to `api.github.com` (or a compatible base URL) with a token.
///
/// The authenticated login is resolved on first use and cached.
pub struct GitHubHost {
    http: reqwest::Client,
    api_url: String,
    token: String,
    timeout: Duration,
    login: OnceCell<String>,
}

impl GitHubHost {
    pub fn new(token: String, config: &GitHubConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            timeout: config.timeout,
            login: OnceCell::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header(AUTHORIZATION, format!("token {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("pagesmith/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
    }

    /// Send a request, mapping 404 and other non-success statuses to errors.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, HostError> {
        let response = request
            .send()
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(HostError::NotFound(what.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, what, "GitHub request failed");
        Err(HostError::Status {
            status: status.as_u16(),
            message: github_message(&body),
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, HostError> {
        response
            .json()
            .await
            .map_err(|e| HostError::Decode(e.to_string()))
    }

    fn contents_path(repo: &RepoInfo, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "/repos/{}/{}/contents/{}",
            repo.owner,
            repo.name,
            encoded.join("/")
        )
    }

    async fn put_file(
        &self,
        repo: &RepoInfo,
        path: &str,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), HostError> {
        let mut body = json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        self.send(
            self.request(Method::PUT, &Self::contents_path(repo, path))
                .json(&body),
            path,
        )
        .await?;
        Ok(())
    }
}

/// Pull GitHub's `message` field out of an error body, if there is one.
fn github_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(300).collect())
}

#[async_trait]
impl RepoHost for GitHubHost {
    async fn owner(&self) -> Result<String, HostError> {
        self.login
            .get_or_try_init(|| async {
                let response = self.send(self.request(Method::GET, "/user"), "user").await?;
                let user: UserBody = Self::json(response).await?;
                tracing::info!(login = %user.login, "Resolved GitHub user");
                Ok::<_, HostError>(user.login)
            })
            .await
            .cloned()
    }

    async fn create_repo(&self, name: &str) -> Result<RepoInfo, HostError> {
        let body = json!({
            "name": name,
            "private": false,
            "auto_init": false,
            "license_template": "mit",
        });
        let response = self
            .send(self.request(Method::POST, "/user/repos").json(&body), name)
            .await?;
        Ok(Self::json::<RepoBody>(response).await?.into())
    }

    async fn find_repo(&self, owner: &str, name: &str) -> Result<Option<RepoInfo>, HostError> {
        let path = format!("/repos/{}/{}", owner, name);
        match self.send(self.request(Method::GET, &path), name).await {
            Ok(response) => Ok(Some(Self::json::<RepoBody>(response).await?.into())),
            Err(HostError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_file(&self, repo: &RepoInfo, path: &str) -> Result<Option<RemoteFile>, HostError> {
        let response = match self
            .send(self.request(Method::GET, &Self::contents_path(repo, path)), path)
            .await
        {
            Ok(response) => response,
            Err(HostError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let body: ContentBody = Self::json(response).await?;
        let content = match (body.encoding.as_deref(), body.content) {
            (Some("base64"), Some(encoded)) => {
                let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| HostError::Decode(format!("{}: {}", path, e)))?
            }
            (_, Some(raw)) => raw.into_bytes(),
            (_, None) => Vec::new(),
        };

        Ok(Some(RemoteFile {
            sha: body.sha,
            content,
        }))
    }

    async fn create_file(
        &self,
        repo: &RepoInfo,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<(), HostError> {
        self.put_file(repo, path, content, message, None).await
    }

    async fn update_file(
        &self,
        repo: &RepoInfo,
        path: &str,
        content: &[u8],
        message: &str,
        sha: &str,
    ) -> Result<(), HostError> {
        self.put_file(repo, path, content, message, Some(sha)).await
    }

    async fn enable_pages(&self, repo: &RepoInfo, branch: &str, path: &str) -> Result<(), HostError> {
        let body = json!({"source": {"branch": branch, "path": path}});
        let route = format!("/repos/{}/{}/pages", repo.owner, repo.name);
        self.send(self.request(Method::POST, &route).json(&body), "pages")
            .await?;
        tracing::info!(repo = %repo.name, branch, "Enabled GitHub Pages");
        Ok(())
    }

    async fn latest_commit(&self, repo: &RepoInfo) -> Result<String, HostError> {
        let route = format!("/repos/{}/{}/commits?per_page=1", repo.owner, repo.name);
        let response = self.send(self.request(Method::GET, &route), "commits").await?;
        let commits: Vec<CommitBody> = Self::json(response).await?;
        commits
            .into_iter()
            .next()
            .map(|c| c.sha)
            .ok_or_else(|| HostError::Decode("repository has no commits".to_string()))
    }
}
