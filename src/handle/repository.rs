//! Repository handle: the composed store stack for one repository.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::handle::cache::CacheNamespace;
use crate::storage::{GitObject, ObjectId, ObjectKind, ObjectStore, RepoId, StorageResult};

/// The composed capability bundle for one repository.
///
/// Immutable after construction. Clone this to share across jobs - it uses
/// Arc internally, and clones compare equal under [`RepositoryHandle::ptr_eq`].
#[derive(Clone)]
pub struct RepositoryHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    repo: RepoId,
    store: Arc<dyn ObjectStore>,
    cache: CacheNamespace,
}

impl RepositoryHandle {
    pub(crate) fn new(repo: RepoId, store: Arc<dyn ObjectStore>, cache: CacheNamespace) -> Self {
        Self {
            inner: Arc::new(HandleInner { repo, store, cache }),
        }
    }

    pub fn repo(&self) -> &RepoId {
        &self.inner.repo
    }

    pub fn cache(&self) -> &CacheNamespace {
        &self.inner.cache
    }

    /// true when both handles are the same instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("repo", &self.inner.repo)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

#[async_trait]
impl ObjectStore for RepositoryHandle {
    async fn load(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<GitObject> {
        self.inner.store.load(kind, id).await
    }

    async fn save(&self, object: &GitObject) -> StorageResult<ObjectId> {
        self.inner.store.save(object).await
    }

    async fn read_ref(&self, name: &str) -> StorageResult<ObjectId> {
        self.inner.store.read_ref(name).await
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> StorageResult<ObjectId> {
        self.inner.store.update_ref(name, id).await
    }

    async fn has_hash(&self, id: &ObjectId) -> StorageResult<bool> {
        self.inner.store.has_hash(id).await
    }
}
