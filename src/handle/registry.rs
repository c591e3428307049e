//! Repository registry.
//!
//! Memoizes one [`RepositoryHandle`] per `owner/name` for the registry's
//! lifetime. There is no eviction; [`Registry::clear`] drops everything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::handle::builder::HandleBuilder;
use crate::handle::cache::{CacheNamespace, CacheRoot};
use crate::handle::connector::RemoteConnector;
use crate::handle::RepositoryHandle;
use crate::storage::{Credential, RepoId, StorageResult};

struct Entry {
    credential: Credential,
    handle: RepositoryHandle,
}

pub struct Registry {
    connector: Arc<dyn RemoteConnector>,
    cache_root: CacheRoot,
    handles: Mutex<HashMap<RepoId, Entry>>,
}

impl Registry {
    pub fn new(connector: Arc<dyn RemoteConnector>, cache_root: CacheRoot) -> Self {
        Self {
            connector,
            cache_root,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_root(&self) -> &CacheRoot {
        &self.cache_root
    }

    /// Get the handle for `repo`, composing it on first use.
    ///
    /// Later calls return the same handle whatever credential they carry.
    /// `cache` replaces the fresh namespace, and only matters on first use.
    pub fn get_handle(
        &self,
        repo: &RepoId,
        credential: &Credential,
        cache: Option<&CacheNamespace>,
    ) -> StorageResult<RepositoryHandle> {
        if let Some(handle) = self.existing(repo, credential) {
            return Ok(handle);
        }

        // connect may block, keep the map unlocked
        let remote = self.connector.connect(repo, credential)?;
        let cache = cache.cloned().unwrap_or_else(|| self.cache_root.namespace(repo));
        let handle = HandleBuilder::new(repo.clone(), remote).cache(cache).build();

        let mut handles = self.handles.lock();
        if let Some(entry) = handles.get(repo) {
            // another caller won the race
            return Ok(entry.handle.clone());
        }
        handles.insert(
            repo.clone(),
            Entry {
                credential: credential.clone(),
                handle: handle.clone(),
            },
        );
        info!(%repo, "repository handle created");
        Ok(handle)
    }

    fn existing(&self, repo: &RepoId, credential: &Credential) -> Option<RepositoryHandle> {
        let handles = self.handles.lock();
        let entry = handles.get(repo)?;
        if entry.credential != *credential {
            warn!(%repo, "credential differs from the one the handle was built with, reusing existing handle");
        }
        Some(entry.handle.clone())
    }

    pub fn contains(&self, repo: &RepoId) -> bool {
        self.handles.lock().contains_key(repo)
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every handle. Jobs already holding one keep it alive.
    pub fn clear(&self) {
        self.handles.lock().clear();
    }
}
