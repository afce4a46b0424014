//! Publishing generated files to a hosted repository.
//!
//! The [`Publisher`] drives a [`RepoHost`] through one of two flows:
//! - round 1 creates a public repository named after the task, commits every
//!   file and enables static hosting (hosting failures are logged only)
//! - later rounds locate the existing repository and update each file in
//!   place, creating files that do not exist yet
//!
//! Either way the latest commit is read back once all file operations are
//! done.

mod github;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::TaskError;
use crate::generation::{GeneratedFileSet, RevisionContext};

pub use github::GitHubHost;
pub use memory::InMemoryRepoHost;

pub const INDEX_PATH: &str = "index.html";
pub const README_PATH: &str = "README.md";

/// Branch and directory static hosting is served from.
const PAGES_BRANCH: &str = "main";
const PAGES_PATH: &str = "/";

/// Errors reported by a [`RepoHost`].
#[derive(Debug, Error)]
pub enum HostError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// A repository as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub owner: String,
    pub name: String,
    pub html_url: String,
}

/// A file's current content and the revision token needed to replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub sha: String,
    pub content: Vec<u8>,
}

/// Source-hosting operations the publisher needs.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Login of the authenticated account.
    async fn owner(&self) -> Result<String, HostError>;

    /// Create a public repository without default content, MIT license metadata.
    async fn create_repo(&self, name: &str) -> Result<RepoInfo, HostError>;

    async fn find_repo(&self, owner: &str, name: &str) -> Result<Option<RepoInfo>, HostError>;

    async fn read_file(&self, repo: &RepoInfo, path: &str) -> Result<Option<RemoteFile>, HostError>;

    async fn create_file(
        &self,
        repo: &RepoInfo,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<(), HostError>;

    /// Replace a file; `sha` is the revision token from [`RepoHost::read_file`].
    async fn update_file(
        &self,
        repo: &RepoInfo,
        path: &str,
        content: &[u8],
        message: &str,
        sha: &str,
    ) -> Result<(), HostError>;

    async fn enable_pages(&self, repo: &RepoInfo, branch: &str, path: &str)
        -> Result<(), HostError>;

    /// SHA of the most recent commit on the default branch.
    async fn latest_commit(&self, repo: &RepoInfo) -> Result<String, HostError>;
}

/// Where a published app can be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub repository_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

/// One file to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub path: String,
    pub content: Vec<u8>,
}

/// Public hosting URL for a task repository.
pub fn pages_url(owner: &str, task_id: &str) -> String {
    format!("https://{}.github.io/{}/", owner, task_id)
}

/// Files to commit, in order: `index.html`, `README.md`, then assets by name.
///
/// Asset values that are base64 `data:` URIs are committed as decoded bytes.
/// Assets with unsafe paths, or named like the two required files, are
/// skipped.
pub fn files_to_commit(files: &GeneratedFileSet) -> Vec<FileUpload> {
    let mut uploads = vec![
        FileUpload {
            path: INDEX_PATH.to_string(),
            content: files.index.clone().into_bytes(),
        },
        FileUpload {
            path: README_PATH.to_string(),
            content: files.readme.clone().into_bytes(),
        },
    ];

    for (name, value) in files.assets.iter().flatten() {
        if !is_safe_asset_path(name) {
            tracing::warn!(asset = %name, "Skipping asset with unsafe or reserved path");
            continue;
        }
        uploads.push(FileUpload {
            path: name.clone(),
            content: asset_bytes(value),
        });
    }

    uploads
}

fn is_safe_asset_path(path: &str) -> bool {
    !path.trim().is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && !path.split('/').any(|segment| segment.is_empty() || segment == "..")
        && path != INDEX_PATH
        && path != README_PATH
}

fn asset_bytes(value: &str) -> Vec<u8> {
    if let Some(rest) = value.strip_prefix("data:") {
        if let Some((header, payload)) = rest.split_once(',') {
            if header.ends_with(";base64") {
                let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
                if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(compact) {
                    return bytes;
                }
            }
        }
    }
    value.as_bytes().to_vec()
}

/// Creates or updates task repositories through a [`RepoHost`].
#[derive(Clone)]
pub struct Publisher {
    host: Arc<dyn RepoHost>,
}

impl Publisher {
    pub fn new(host: Arc<dyn RepoHost>) -> Self {
        Self { host }
    }

    async fn owner(&self) -> Result<String, TaskError> {
        self.host
            .owner()
            .await
            .map_err(|e| TaskError::upstream("github", format!("failed to resolve user: {}", e)))
    }

    async fn existing_repo(&self, owner: &str, task_id: &str) -> Result<RepoInfo, TaskError> {
        match self.host.find_repo(owner, task_id).await {
            Ok(Some(repo)) => Ok(repo),
            Ok(None) | Err(HostError::NotFound(_)) => {
                Err(TaskError::NotFound(format!("{}/{}", owner, task_id)))
            }
            Err(e) => Err(TaskError::upstream("github", e.to_string())),
        }
    }

    /// Load the currently published `index.html` and `README.md` of a task.
    ///
    /// Fails with [`TaskError::NotFound`] if the repository does not exist.
    /// Missing or unreadable files are reported as absent.
    pub async fn revision_context(&self, task_id: &str) -> Result<RevisionContext, TaskError> {
        let owner = self.owner().await?;
        let repo = self.existing_repo(&owner, task_id).await?;

        Ok(RevisionContext {
            index_html: self.read_text(&repo, INDEX_PATH).await,
            readme_md: self.read_text(&repo, README_PATH).await,
        })
    }

    async fn read_text(&self, repo: &RepoInfo, path: &str) -> Option<String> {
        match self.host.read_file(repo, path).await {
            Ok(Some(file)) => Some(String::from_utf8_lossy(&file.content).into_owned()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(repo = %repo.name, path, error = %e, "Failed to read existing file");
                None
            }
        }
    }

    /// Commit `files` for `task_id`; round 1 creates the repository, later
    /// rounds update it.
    pub async fn publish(
        &self,
        task_id: &str,
        files: &GeneratedFileSet,
        round: u32,
    ) -> Result<PublishResult, TaskError> {
        let owner = self.owner().await?;
        let uploads = files_to_commit(files);

        let repo = if round <= 1 {
            let repo = self
                .host
                .create_repo(task_id)
                .await
                .map_err(|e| TaskError::upstream("github", format!("failed to create repo: {}", e)))?;
            tracing::info!(repo = %repo.html_url, "Created repository");

            for upload in &uploads {
                self.host
                    .create_file(&repo, &upload.path, &upload.content, &format!("add {}", upload.path))
                    .await
                    .map_err(|e| TaskError::file(&upload.path, e))?;
                tracing::debug!(path = %upload.path, bytes = upload.content.len(), "Created file");
            }

            if let Err(e) = self.host.enable_pages(&repo, PAGES_BRANCH, PAGES_PATH).await {
                tracing::warn!(repo = %repo.name, error = %e, "Failed to enable static hosting, continuing");
            }
            repo
        } else {
            let repo = self.existing_repo(&owner, task_id).await?;
            for upload in &uploads {
                self.upsert(&repo, upload, round).await?;
            }
            repo
        };

        let commit_sha = self
            .host
            .latest_commit(&repo)
            .await
            .map_err(|e| TaskError::upstream("github", format!("failed to read latest commit: {}", e)))?;

        let result = PublishResult {
            repository_url: repo.html_url.clone(),
            commit_sha,
            pages_url: pages_url(&owner, task_id),
        };
        tracing::info!(
            repo = %result.repository_url,
            commit = %result.commit_sha,
            files = uploads.len(),
            "Published files"
        );
        Ok(result)
    }

    async fn upsert(&self, repo: &RepoInfo, upload: &FileUpload, round: u32) -> Result<(), TaskError> {
        let path = upload.path.as_str();
        let current = self
            .host
            .read_file(repo, path)
            .await
            .map_err(|e| TaskError::file(path, e))?;

        match current {
            Some(existing) => {
                let message = format!("update {} for round {}", path, round);
                self.host
                    .update_file(repo, path, &upload.content, &message, &existing.sha)
                    .await
                    .map_err(|e| TaskError::file(path, e))?;
                tracing::debug!(path, "Updated file");
            }
            None => {
                let message = format!("add {} for round {}", path, round);
                self.host
                    .create_file(repo, path, &upload.content, &message)
                    .await
                    .map_err(|e| TaskError::file(path, e))?;
                tracing::debug!(path, "File absent remotely, created it");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::sync::Mutex;

    /// Wraps the in-memory host, recording calls and injecting failures.
    struct RecordingHost {
        inner: InMemoryRepoHost,
        calls: Mutex<Vec<String>>,
        fail_pages: bool,
        fail_path: Option<String>,
    }

    impl RecordingHost {
        fn new(inner: InMemoryRepoHost) -> Self {
            Self {
                inner,
                calls: Mutex::new(Vec::new()),
                fail_pages: false,
                fail_path: None,
            }
        }

        async fn record(&self, call: String) {
            self.calls.lock().await.push(call);
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }

        fn check_path(&self, path: &str) -> Result<(), HostError> {
            if self.fail_path.as_deref() == Some(path) {
                return Err(HostError::Status {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RepoHost for RecordingHost {
        async fn owner(&self) -> Result<String, HostError> {
            self.inner.owner().await
        }

        async fn create_repo(&self, name: &str) -> Result<RepoInfo, HostError> {
            self.record(format!("create_repo {}", name)).await;
            self.inner.create_repo(name).await
        }

        async fn find_repo(&self, owner: &str, name: &str) -> Result<Option<RepoInfo>, HostError> {
            self.record(format!("find_repo {}/{}", owner, name)).await;
            self.inner.find_repo(owner, name).await
        }

        async fn read_file(&self, repo: &RepoInfo, path: &str) -> Result<Option<RemoteFile>, HostError> {
            self.record(format!("read_file {}", path)).await;
            self.inner.read_file(repo, path).await
        }

        async fn create_file(
            &self,
            repo: &RepoInfo,
            path: &str,
            content: &[u8],
            message: &str,
        ) -> Result<(), HostError> {
            self.record(format!("create_file {} ({})", path, message)).await;
            self.check_path(path)?;
            self.inner.create_file(repo, path, content, message).await
        }

        async fn update_file(
            &self,
            repo: &RepoInfo,
            path: &str,
            content: &[u8],
            message: &str,
            sha: &str,
        ) -> Result<(), HostError> {
            self.record(format!("update_file {} ({})", path, message)).await;
            self.check_path(path)?;
            self.inner.update_file(repo, path, content, message, sha).await
        }

        async fn enable_pages(&self, repo: &RepoInfo, branch: &str, path: &str) -> Result<(), HostError> {
            self.record(format!("enable_pages {} {}", branch, path)).await;
            if self.fail_pages {
                return Err(HostError::Status {
                    status: 422,
                    message: "pages unavailable".to_string(),
                });
            }
            self.inner.enable_pages(repo, branch, path).await
        }

        async fn latest_commit(&self, repo: &RepoInfo) -> Result<String, HostError> {
            self.inner.latest_commit(repo).await
        }
    }

    fn file_set(assets: &[(&str, &str)]) -> GeneratedFileSet {
        let assets: BTreeMap<String, String> = assets
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GeneratedFileSet {
            index: "<html>app</html>".to_string(),
            readme: "# App".to_string(),
            assets: if assets.is_empty() { None } else { Some(assets) },
        }
    }

    #[test]
    fn commit_order_and_asset_filtering() {
        let files = file_set(&[
            ("style.css", "body {}"),
            ("../escape.txt", "x"),
            ("index.html", "shadow"),
            ("/abs.txt", "x"),
            ("data/app.js", "run()"),
        ]);
        let paths: Vec<String> = files_to_commit(&files).into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["index.html", "README.md", "data/app.js", "style.css"]);
    }

    #[test]
    fn base64_data_uri_assets_are_decoded() {
        assert_eq!(asset_bytes("data:text/plain;base64,aGVsbG8="), b"hello".to_vec());
        assert_eq!(asset_bytes("data:text/plain,hello"), b"data:text/plain,hello".to_vec());
        assert_eq!(asset_bytes("data:image/png;base64,@@@"), b"data:image/png;base64,@@@".to_vec());
        assert_eq!(asset_bytes("plain"), b"plain".to_vec());
    }

    #[test]
    fn pages_url_format() {
        assert_eq!(pages_url("octo", "task-1"), "https://octo.github.io/task-1/");
    }

    #[tokio::test]
    async fn create_mode_creates_repo_then_each_file() {
        let host = Arc::new(RecordingHost::new(InMemoryRepoHost::new("octo")));
        let publisher = Publisher::new(host.clone());

        let result = publisher
            .publish("task-1", &file_set(&[("style.css", "body {}")]), 1)
            .await
            .unwrap();

        assert_eq!(
            host.calls().await,
            vec![
                "create_repo task-1",
                "create_file index.html (add index.html)",
                "create_file README.md (add README.md)",
                "create_file style.css (add style.css)",
                "enable_pages main /",
            ]
        );
        assert_eq!(result.repository_url, "https://github.com/octo/task-1");
        assert_eq!(result.pages_url, "https://octo.github.io/task-1/");
        let head = host.inner.latest_commit(&host.inner.repo("task-1").await.unwrap()).await.unwrap();
        assert_eq!(result.commit_sha, head);
        assert!(host.inner.pages_enabled("task-1").await);
    }

    #[tokio::test]
    async fn pages_failure_does_not_fail_publish() {
        let mut host = RecordingHost::new(InMemoryRepoHost::new("octo"));
        host.fail_pages = true;
        let publisher = Publisher::new(Arc::new(host));

        let result = publisher.publish("task-2", &file_set(&[]), 1).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failing_file_aborts_with_its_path() {
        let mut host = RecordingHost::new(InMemoryRepoHost::new("octo"));
        host.fail_path = Some("README.md".to_string());
        let host = Arc::new(host);
        let publisher = Publisher::new(host.clone());

        let err = publisher
            .publish("task-3", &file_set(&[("style.css", "x")]), 1)
            .await
            .unwrap_err();
        match err {
            TaskError::FileOperation { path, .. } => assert_eq!(path, "README.md"),
            other => panic!("unexpected error: {:?}", other),
        }
        let calls = host.calls().await;
        assert!(!calls.iter().any(|c| c.starts_with("create_file style.css")));
        assert!(!calls.iter().any(|c| c.starts_with("enable_pages")));
    }

    #[tokio::test]
    async fn update_mode_updates_existing_and_creates_missing_files() {
        let inner = InMemoryRepoHost::new("octo");
        let publisher = Publisher::new(Arc::new(inner.clone()));
        publisher
            .publish("task-4", &file_set(&[("style.css", "body {}")]), 1)
            .await
            .unwrap();
        let first_head = inner.latest_commit(&inner.repo("task-4").await.unwrap()).await.unwrap();

        let host = Arc::new(RecordingHost::new(inner.clone()));
        let publisher = Publisher::new(host.clone());
        // `a.js` is new and sorts before the existing `style.css`.
        let mut revised = file_set(&[("a.js", "draw()"), ("style.css", "body { margin: 0 }")]);
        revised.index = "<html>v2</html>".to_string();

        let result = publisher.publish("task-4", &revised, 2).await.unwrap();

        assert_eq!(
            host.calls().await,
            vec![
                "find_repo octo/task-4",
                "read_file index.html",
                "update_file index.html (update index.html for round 2)",
                "read_file README.md",
                "update_file README.md (update README.md for round 2)",
                "read_file a.js",
                "create_file a.js (add a.js for round 2)",
                "read_file style.css",
                "update_file style.css (update style.css for round 2)",
            ]
        );
        assert_ne!(result.commit_sha, first_head);
        let repo = inner.repo("task-4").await.unwrap();
        let index = inner.read_file(&repo, "index.html").await.unwrap().unwrap();
        assert_eq!(index.content, b"<html>v2</html>".to_vec());
        assert!(inner.read_file(&repo, "a.js").await.unwrap().is_some());
        let style = inner.read_file(&repo, "style.css").await.unwrap().unwrap();
        assert_eq!(style.content, b"body { margin: 0 }".to_vec());
    }

    #[tokio::test]
    async fn update_of_missing_repo_is_not_found() {
        let publisher = Publisher::new(Arc::new(InMemoryRepoHost::new("octo")));
        let err = publisher.publish("nope", &file_set(&[]), 2).await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(ref name) if name == "octo/nope"));

        let err = publisher.revision_context("nope").await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn revision_context_reads_published_files() {
        let inner = InMemoryRepoHost::new("octo");
        let publisher = Publisher::new(Arc::new(inner));
        publisher.publish("task-5", &file_set(&[]), 1).await.unwrap();

        let context = publisher.revision_context("task-5").await.unwrap();
        assert_eq!(context.index_html.as_deref(), Some("<html>app</html>"));
        assert_eq!(context.readme_md.as_deref(), Some("# App"));
    }

    #[tokio::test]
    async fn creating_an_existing_repo_is_an_upstream_error() {
        let publisher = Publisher::new(Arc::new(InMemoryRepoHost::new("octo")));
        publisher.publish("dup", &file_set(&[]), 1).await.unwrap();
        let err = publisher.publish("dup", &file_set(&[]), 1).await.unwrap_err();
        assert!(matches!(err, TaskError::Upstream { service: "github", .. }));
    }
}
