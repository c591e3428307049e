//! Request combining.
//!
//! When several jobs ask for the same hash at the same time (a collection
//! fan-out loading the same tree, two callers reading one record) only the
//! first load reaches the inner store. The others wait on the same shared
//! future and receive a clone of its result.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::trace;

use crate::storage::{GitObject, ObjectId, ObjectKind, ObjectStore, StorageResult};

type InflightLoad = Shared<BoxFuture<'static, StorageResult<GitObject>>>;

pub struct DedupStore {
    inner: Arc<dyn ObjectStore>,
    inflight: Mutex<HashMap<(ObjectKind, ObjectId), InflightLoad>>,
}

impl DedupStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// number of loads currently waiting on the inner store
    pub fn inflight(&self) -> usize {
        self.inflight.lock().len()
    }
}

#[async_trait]
impl ObjectStore for DedupStore {
    async fn load(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<GitObject> {
        let key = (kind, id.clone());
        let load = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&key) {
                Some(load) => {
                    trace!(%kind, hash = %id.short(), "joining in-flight load");
                    load.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let id = id.clone();
                    let load = async move { inner.load(kind, &id).await }.boxed().shared();
                    inflight.insert(key.clone(), load.clone());
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut inflight = self.inflight.lock();
        if inflight.get(&key).is_some_and(|current| current.ptr_eq(&load)) {
            inflight.remove(&key);
        }
        result
    }

    async fn save(&self, object: &GitObject) -> StorageResult<ObjectId> {
        self.inner.save(object).await
    }

    async fn read_ref(&self, name: &str) -> StorageResult<ObjectId> {
        self.inner.read_ref(name).await
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> StorageResult<ObjectId> {
        self.inner.update_ref(name, id).await
    }

    async fn has_hash(&self, id: &ObjectId) -> StorageResult<bool> {
        self.inner.has_hash(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::storage::ObjectStoreExt;
    use crate::test_support::{seed_repo, CountingStore};

    #[tokio::test]
    async fn test_concurrent_loads_share_one_request() {
        let (_dir, git, head) = seed_repo("master", &[("todos/a.json", "{}")]).await;
        let counting = Arc::new(CountingStore::new(git).with_delay(Duration::from_millis(50)));
        let store = Arc::new(DedupStore::new(counting.clone()));

        let loads = (0..5).map(|_| {
            let store = Arc::clone(&store);
            let head = head.clone();
            tokio::spawn(async move { store.load_commit(&head).await })
        });
        let commits = futures::future::join_all(loads).await;

        for commit in commits {
            assert!(commit.unwrap().is_ok());
        }
        assert_eq!(counting.loads(ObjectKind::Commit), 1);
        assert_eq!(store.inflight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_loads_are_not_combined() {
        let (_dir, git, head) = seed_repo("master", &[("todos/a.json", "{}")]).await;
        let counting = Arc::new(CountingStore::new(git));
        let store = DedupStore::new(counting.clone());

        store.load_commit(&head).await.unwrap();
        store.load_commit(&head).await.unwrap();
        assert_eq!(counting.loads(ObjectKind::Commit), 2);
    }

    #[tokio::test]
    async fn test_errors_reach_every_waiter() {
        let (_dir, git, _) = seed_repo("master", &[]).await;
        let counting = Arc::new(CountingStore::new(git).with_delay(Duration::from_millis(20)));
        let store = Arc::new(DedupStore::new(counting.clone()));
        let missing = ObjectId::from_hex("1111111111111111111111111111111111111111").unwrap();

        let (a, b) = tokio::join!(store.load_blob(&missing), store.load_blob(&missing));
        assert!(a.unwrap_err().is_not_found());
        assert!(b.unwrap_err().is_not_found());
        assert_eq!(counting.loads(ObjectKind::Blob), 1);
    }
}
