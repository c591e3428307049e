//! Fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::handle::RemoteConnector;
use crate::storage::{
    Commit, Credential, GitObject, GitStore, ObjectId, ObjectKind, ObjectStore, PathEntry, RepoId, Signature,
    StorageError, StorageResult,
};

/// Create a repository holding `files` committed on `branch`.
pub(crate) async fn seed_repo(branch: &str, files: &[(&str, &str)]) -> (TempDir, GitStore, ObjectId) {
    let dir = TempDir::new().unwrap();
    let store = GitStore::init(dir.path()).unwrap();
    let head = commit_files(&store, branch, files).await;
    (dir, store, head)
}

/// Commit `files` on top of `branch` (or as its first commit) and move the ref.
pub(crate) async fn commit_files(store: &dyn ObjectStore, branch: &str, files: &[(&str, &str)]) -> ObjectId {
    let ref_name = format!("refs/heads/{branch}");
    let parent = store.read_ref(&ref_name).await.ok();
    let base = match &parent {
        Some(parent) => Some(store.load(ObjectKind::Commit, parent).await.unwrap().into_commit().unwrap().tree),
        None => None,
    };

    let entries = files
        .iter()
        .map(|(path, content)| PathEntry::blob(*path, *content))
        .collect();
    let tree = store.create_tree(base, entries).await.unwrap();

    let commit = Commit::new(tree, parent.into_iter().collect(), Signature::gitrecords(), "seed");
    let id = store.save(&GitObject::Commit(commit)).await.unwrap();
    store.update_ref(&ref_name, &id).await.unwrap();
    id
}

/// Pass-through store that counts what reaches it.
pub(crate) struct CountingStore {
    inner: Arc<dyn ObjectStore>,
    loads: Mutex<HashMap<ObjectKind, usize>>,
    ref_reads: AtomicUsize,
    offline: AtomicBool,
    delay: Option<Duration>,
}

impl CountingStore {
    pub(crate) fn new(inner: impl ObjectStore + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            loads: Mutex::new(HashMap::new()),
            ref_reads: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            delay: None,
        }
    }

    /// slow every load down, so concurrent callers overlap
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// make every call fail like an unreachable remote
    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn loads(&self, kind: ObjectKind) -> usize {
        self.loads.lock().get(&kind).copied().unwrap_or(0)
    }

    pub(crate) fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }

    pub(crate) fn ref_reads(&self) -> usize {
        self.ref_reads.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn load(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<GitObject> {
        *self.loads.lock().entry(kind).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;
        self.inner.load(kind, id).await
    }

    async fn save(&self, object: &GitObject) -> StorageResult<ObjectId> {
        self.check_online()?;
        self.inner.save(object).await
    }

    async fn read_ref(&self, name: &str) -> StorageResult<ObjectId> {
        self.ref_reads.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.inner.read_ref(name).await
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> StorageResult<ObjectId> {
        self.check_online()?;
        self.inner.update_ref(name, id).await
    }

    async fn has_hash(&self, id: &ObjectId) -> StorageResult<bool> {
        self.check_online()?;
        self.inner.has_hash(id).await
    }
}

/// Connector that hands out one fixed store and counts connections.
pub(crate) struct StaticConnector {
    store: Arc<dyn ObjectStore>,
    connects: AtomicUsize,
}

impl StaticConnector {
    pub(crate) fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            connects: AtomicUsize::new(0),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl RemoteConnector for StaticConnector {
    fn connect(&self, _repo: &RepoId, _credential: &Credential) -> StorageResult<Arc<dyn ObjectStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.store))
    }
}
