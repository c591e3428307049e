//! Remote connectors: how a repository identifier plus credential becomes
//! the bottom layer of a handle.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use crate::storage::{
    build_client, Credential, GitStore, GithubStore, ObjectStore, RepoId, StorageResult, DEFAULT_API_URL,
};

/// Binds a remote store to one repository.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, repo: &RepoId, credential: &Credential) -> StorageResult<Arc<dyn ObjectStore>>;
}

/// Connects to repositories on GitHub (or a GitHub Enterprise API root).
#[derive(Clone)]
pub struct GithubConnector {
    client: Client,
    api_url: String,
}

impl GithubConnector {
    pub fn new() -> StorageResult<Self> {
        Ok(Self {
            client: build_client()?,
            api_url: DEFAULT_API_URL.to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl RemoteConnector for GithubConnector {
    fn connect(&self, repo: &RepoId, credential: &Credential) -> StorageResult<Arc<dyn ObjectStore>> {
        debug!(%repo, api = %self.api_url, "connecting to github");
        Ok(Arc::new(GithubStore::with_client(
            self.client.clone(),
            self.api_url.clone(),
            repo.clone(),
            credential.clone(),
        )))
    }
}

/// Serves `owner/name` from `<root>/<owner>/<name>` on the local disk.
///
/// The credential is not checked.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    root: PathBuf,
}

impl LocalConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl RemoteConnector for LocalConnector {
    fn connect(&self, repo: &RepoId, _credential: &Credential) -> StorageResult<Arc<dyn ObjectStore>> {
        let path = self.root.join(repo.owner()).join(repo.name());
        debug!(%repo, path = %path.display(), "opening local repository");
        Ok(Arc::new(GitStore::open(path)?))
    }
}
