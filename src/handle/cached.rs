//! Cached object access.
//!
//! Objects are immutable once hashed, so anything loaded or saved through
//! this layer is kept in the repository's cache namespace and served from
//! there afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::handle::cache::CacheNamespace;
use crate::storage::{GitObject, ObjectId, ObjectKind, ObjectStore, StorageResult};

pub struct CachedStore {
    remote: Arc<dyn ObjectStore>,
    cache: CacheNamespace,
}

impl CachedStore {
    pub fn new(remote: Arc<dyn ObjectStore>, cache: CacheNamespace) -> Self {
        Self { remote, cache }
    }
}

#[async_trait]
impl ObjectStore for CachedStore {
    async fn load(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<GitObject> {
        if let Some(object) = self.cache.get_object(kind, id).await {
            trace!(cache = %self.cache.label(), %kind, hash = %id.short(), "cache hit");
            return Ok(object);
        }
        let object = self.remote.load(kind, id).await?;
        self.cache.put_object(id, &object).await;
        Ok(object)
    }

    async fn save(&self, object: &GitObject) -> StorageResult<ObjectId> {
        let id = self.remote.save(object).await?;
        self.cache.put_object(&id, object).await;
        Ok(id)
    }

    async fn read_ref(&self, name: &str) -> StorageResult<ObjectId> {
        self.remote.read_ref(name).await
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> StorageResult<ObjectId> {
        self.remote.update_ref(name, id).await
    }

    async fn has_hash(&self, id: &ObjectId) -> StorageResult<bool> {
        if self.cache.contains(id).await {
            return Ok(true);
        }
        self.remote.has_hash(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ObjectStoreExt, PathEntry};
    use crate::test_support::{seed_repo, CountingStore};

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let (_dir, git, _) = seed_repo("master", &[("todos/a.json", r#"{"id":"a"}"#)]).await;
        let counting = Arc::new(CountingStore::new(git));
        let cache = CacheNamespace::detached("acme/widgets");
        let store = CachedStore::new(counting.clone(), cache.clone());

        let head = store.read_ref("refs/heads/master").await.unwrap();
        let first = store.load_commit(&head).await.unwrap();
        let second = store.load_commit(&head).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(counting.loads(ObjectKind::Commit), 1);
        assert!(store.has_hash(&head).await.unwrap());
    }

    #[tokio::test]
    async fn test_saved_objects_are_cached() {
        let (_dir, git, _) = seed_repo("master", &[]).await;
        let counting = Arc::new(CountingStore::new(git));
        let cache = CacheNamespace::detached("acme/widgets");
        let store = CachedStore::new(counting.clone(), cache.clone());

        let root = store
            .create_tree(None, vec![PathEntry::blob("todos/b.json", "{}")])
            .await
            .unwrap();
        let tree = store.load_tree(&root).await.unwrap();

        assert!(tree.subtree("todos").is_some());
        assert_eq!(counting.total_loads(), 0);
        // blob, subtree and root tree
        assert_eq!(cache.len(), 3);
    }
}
