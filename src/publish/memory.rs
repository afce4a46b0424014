//! In-memory repository host (non-persistent).
//!
//! Mirrors the GitHub behaviors the publisher relies on: duplicate repository
//! names are rejected, files carry content-hash revision tokens that must
//! match on update, and every file write is a commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{HostError, RemoteFile, RepoHost, RepoInfo};
use crate::generation::normalize::mit_license;

#[derive(Debug, Clone)]
struct MemoryRepo {
    info: RepoInfo,
    files: BTreeMap<String, Vec<u8>>,
    commits: Vec<String>,
    pages: Option<(String, String)>,
}

impl MemoryRepo {
    fn commit(&mut self, message: &str, path: &str) {
        let mut hasher = Sha256::new();
        if let Some(parent) = self.commits.last() {
            hasher.update(parent.as_bytes());
        }
        hasher.update(message.as_bytes());
        hasher.update(path.as_bytes());
        if let Some(content) = self.files.get(path) {
            hasher.update(content);
        }
        self.commits.push(hex::encode(hasher.finalize()));
    }
}

/// Revision token for a file body, in the style of a git blob id.
fn blob_sha(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct InMemoryRepoHost {
    owner: String,
    repos: Arc<RwLock<HashMap<String, MemoryRepo>>>,
}

impl InMemoryRepoHost {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repos: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up a repository by name.
    pub async fn repo(&self, name: &str) -> Option<RepoInfo> {
        self.repos.read().await.get(name).map(|r| r.info.clone())
    }

    pub async fn pages_enabled(&self, name: &str) -> bool {
        self.repos
            .read()
            .await
            .get(name)
            .map(|r| r.pages.is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl RepoHost for InMemoryRepoHost {
    async fn owner(&self) -> Result<String, HostError> {
        Ok(self.owner.clone())
    }

    async fn create_repo(&self, name: &str) -> Result<RepoInfo, HostError> {
        let mut repos = self.repos.write().await;
        if repos.contains_key(name) {
            return Err(HostError::Status {
                status: 422,
                message: format!("name already exists on this account: {}", name),
            });
        }

        let info = RepoInfo {
            owner: self.owner.clone(),
            name: name.to_string(),
            html_url: format!("https://github.com/{}/{}", self.owner, name),
        };
        let mut repo = MemoryRepo {
            info: info.clone(),
            files: BTreeMap::new(),
            commits: Vec::new(),
            pages: None,
        };
        let year = chrono::Datelike::year(&chrono::Utc::now());
        repo.files
            .insert("LICENSE".to_string(), mit_license(year).into_bytes());
        repo.commit("Initial commit", "LICENSE");
        repos.insert(name.to_string(), repo);

        Ok(info)
    }

    async fn find_repo(&self, owner: &str, name: &str) -> Result<Option<RepoInfo>, HostError> {
        if owner != self.owner {
            return Ok(None);
        }
        Ok(self.repo(name).await)
    }

    async fn read_file(&self, repo: &RepoInfo, path: &str) -> Result<Option<RemoteFile>, HostError> {
        let repos = self.repos.read().await;
        let stored = repos
            .get(&repo.name)
            .ok_or_else(|| HostError::NotFound(repo.name.clone()))?;
        Ok(stored.files.get(path).map(|content| RemoteFile {
            sha: blob_sha(content),
            content: content.clone(),
        }))
    }

    async fn create_file(
        &self,
        repo: &RepoInfo,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<(), HostError> {
        let mut repos = self.repos.write().await;
        let stored = repos
            .get_mut(&repo.name)
            .ok_or_else(|| HostError::NotFound(repo.name.clone()))?;
        if stored.files.contains_key(path) {
            return Err(HostError::Status {
                status: 422,
                message: format!("\"sha\" wasn't supplied for existing file {}", path),
            });
        }
        stored.files.insert(path.to_string(), content.to_vec());
        stored.commit(message, path);
        Ok(())
    }

    async fn update_file(
        &self,
        repo: &RepoInfo,
        path: &str,
        content: &[u8],
        message: &str,
        sha: &str,
    ) -> Result<(), HostError> {
        let mut repos = self.repos.write().await;
        let stored = repos
            .get_mut(&repo.name)
            .ok_or_else(|| HostError::NotFound(repo.name.clone()))?;
        let current = stored
            .files
            .get(path)
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        if blob_sha(current) != sha {
            return Err(HostError::Status {
                status: 409,
                message: format!("{} does not match {}", path, sha),
            });
        }
        stored.files.insert(path.to_string(), content.to_vec());
        stored.commit(message, path);
        Ok(())
    }

    async fn enable_pages(&self, repo: &RepoInfo, branch: &str, path: &str) -> Result<(), HostError> {
        let mut repos = self.repos.write().await;
        let stored = repos
            .get_mut(&repo.name)
            .ok_or_else(|| HostError::NotFound(repo.name.clone()))?;
        if stored.pages.is_some() {
            return Err(HostError::Status {
                status: 409,
                message: "GitHub Pages is already enabled".to_string(),
            });
        }
        stored.pages = Some((branch.to_string(), path.to_string()));
        Ok(())
    }

    async fn latest_commit(&self, repo: &RepoInfo) -> Result<String, HostError> {
        let repos = self.repos.read().await;
        let stored = repos
            .get(&repo.name)
            .ok_or_else(|| HostError::NotFound(repo.name.clone()))?;
        stored
            .commits
            .last()
            .cloned()
            .ok_or_else(|| HostError::Decode("repository has no commits".to_string()))
    }
}
