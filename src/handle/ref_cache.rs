//! Ref cache.
//!
//! Refs are mutable, so the remote is always asked first. The last answer is
//! remembered in the cache namespace and only used when the remote cannot be
//! reached at all; a remote that says "no such ref" is believed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::handle::cache::CacheNamespace;
use crate::storage::{GitObject, ObjectId, ObjectKind, ObjectStore, StorageResult};

pub struct RefCachedStore {
    inner: Arc<dyn ObjectStore>,
    cache: CacheNamespace,
}

impl RefCachedStore {
    pub fn new(inner: Arc<dyn ObjectStore>, cache: CacheNamespace) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl ObjectStore for RefCachedStore {
    async fn load(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<GitObject> {
        self.inner.load(kind, id).await
    }

    async fn save(&self, object: &GitObject) -> StorageResult<ObjectId> {
        self.inner.save(object).await
    }

    async fn read_ref(&self, name: &str) -> StorageResult<ObjectId> {
        match self.inner.read_ref(name).await {
            Ok(id) => {
                self.cache.put_ref(name, &id).await;
                Ok(id)
            }
            Err(err) if err.is_transport() => match self.cache.get_ref(name).await {
                Some(id) => {
                    warn!(cache = %self.cache.label(), reference = name, error = %err, "remote unreachable, using cached ref");
                    Ok(id)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> StorageResult<ObjectId> {
        let id = self.inner.update_ref(name, id).await?;
        self.cache.put_ref(name, &id).await;
        Ok(id)
    }

    async fn has_hash(&self, id: &ObjectId) -> StorageResult<bool> {
        self.inner.has_hash(id).await
    }
}
