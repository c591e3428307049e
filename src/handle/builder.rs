//! Handle composition.

use std::sync::Arc;

use tracing::debug;

use crate::handle::cache::CacheNamespace;
use crate::handle::cached::CachedStore;
use crate::handle::dedup::DedupStore;
use crate::handle::ref_cache::RefCachedStore;
use crate::handle::RepositoryHandle;
use crate::storage::{ObjectStore, RepoId};

/// Stacks the layers of a repository handle on top of a remote store.
///
/// The order is fixed:
///
/// ```text
/// remote -> cached objects -> ref cache -> request combining
/// ```
///
/// Tree creation and typed formatting are not layers of their own: they come
/// from `ObjectStore::create_tree` and `ObjectStoreExt` on whatever the stack
/// ends with, so every tree write passes through the cache.
pub struct HandleBuilder {
    repo: RepoId,
    remote: Arc<dyn ObjectStore>,
    cache: Option<CacheNamespace>,
}

impl HandleBuilder {
    pub fn new(repo: RepoId, remote: Arc<dyn ObjectStore>) -> Self {
        Self {
            repo,
            remote,
            cache: None,
        }
    }

    /// use this namespace instead of a fresh in-memory one
    pub fn cache(mut self, cache: CacheNamespace) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> RepositoryHandle {
        let cache = self
            .cache
            .unwrap_or_else(|| CacheNamespace::detached(self.repo.to_string()));
        debug!(repo = %self.repo, cache = ?cache, "composing repository handle");

        let cached: Arc<dyn ObjectStore> = Arc::new(CachedStore::new(self.remote, cache.clone()));
        let refs: Arc<dyn ObjectStore> = Arc::new(RefCachedStore::new(cached, cache.clone()));
        let combined: Arc<dyn ObjectStore> = Arc::new(DedupStore::new(refs));

        RepositoryHandle::new(self.repo, combined, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ObjectKind, ObjectStoreExt, PathEntry};
    use crate::test_support::{seed_repo, CountingStore};

    #[tokio::test]
    async fn test_composed_handle_reads_through_cache() {
        let (_dir, git, head) = seed_repo("master", &[("todos/a.json", r#"{"id":"a"}"#)]).await;
        let counting = Arc::new(CountingStore::new(git));
        let handle = HandleBuilder::new(RepoId::parse("acme/widgets").unwrap(), counting.clone()).build();

        for _ in 0..3 {
            assert_eq!(handle.read_ref("refs/heads/master").await.unwrap(), head);
            let commit = handle.load_commit(&head).await.unwrap();
            handle.load_tree(&commit.tree).await.unwrap();
        }

        assert_eq!(counting.ref_reads(), 3);
        assert_eq!(counting.loads(ObjectKind::Commit), 1);
        assert_eq!(counting.loads(ObjectKind::Tree), 1);
        assert_eq!(handle.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_tree_creation_goes_through_the_stack() {
        let (_dir, git, _) = seed_repo("master", &[]).await;
        let cache = CacheNamespace::detached("acme/widgets");
        let handle = HandleBuilder::new(RepoId::parse("acme/widgets").unwrap(), Arc::new(git))
            .cache(cache.clone())
            .build();

        let root = handle
            .create_tree(None, vec![PathEntry::blob("todos/a.json", "{}")])
            .await
            .unwrap();
        assert!(handle.has_hash(&root).await.unwrap());
        assert!(handle.cache().ptr_eq(&cache));
        assert_eq!(cache.len(), 3);
    }
}
