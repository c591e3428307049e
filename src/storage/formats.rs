//! Typed load/save helpers on top of any [`ObjectStore`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::store::ObjectStore;
use crate::storage::types::{Commit, GitObject, ObjectId, ObjectKind, Tree};

/// Value formatting for stores: text, JSON, tree and commit views of objects.
#[async_trait]
pub trait ObjectStoreExt: ObjectStore {
    async fn load_blob(&self, id: &ObjectId) -> StorageResult<Vec<u8>> {
        self.load(ObjectKind::Blob, id).await?.into_blob()
    }

    /// load a blob and decode it as UTF-8
    async fn load_text(&self, id: &ObjectId) -> StorageResult<String> {
        let bytes = self.load_blob(id).await?;
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidUtf8(id.clone()))
    }

    /// load a blob and parse it as JSON
    async fn load_json<T: DeserializeOwned + Send>(&self, id: &ObjectId) -> StorageResult<T> {
        let text = self.load_text(id).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn load_tree(&self, id: &ObjectId) -> StorageResult<Tree> {
        self.load(ObjectKind::Tree, id).await?.into_tree()
    }

    async fn load_commit(&self, id: &ObjectId) -> StorageResult<Commit> {
        self.load(ObjectKind::Commit, id).await?.into_commit()
    }

    async fn save_text(&self, text: &str) -> StorageResult<ObjectId> {
        self.save(&GitObject::Blob(text.as_bytes().to_vec())).await
    }

    /// serialize a value as pretty JSON and store it as a blob
    async fn save_json<T: Serialize + Sync>(&self, value: &T) -> StorageResult<ObjectId> {
        let text = serde_json::to_string_pretty(value)?;
        self.save_text(&text).await
    }
}

impl<S: ObjectStore + ?Sized> ObjectStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::git::GitStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_text_and_json_helpers() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::init(dir.path()).unwrap();

        let id = store.save_json(&serde_json::json!({"title": "milk"})).await.unwrap();
        let value: serde_json::Value = store.load_json(&id).await.unwrap();
        assert_eq!(value["title"], "milk");
        assert!(store.load_text(&id).await.unwrap().contains("\n"));
    }

    #[tokio::test]
    async fn test_wrong_kind_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::init(dir.path()).unwrap();

        let id = store.save_text("plain").await.unwrap();
        let result = store.load_tree(&id).await;
        assert!(matches!(
            result,
            Err(StorageError::UnexpectedObjectType { expected: ObjectKind::Tree, found: ObjectKind::Blob })
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let store = GitStore::init(dir.path()).unwrap();

        let id = store.save(&GitObject::Blob(vec![0xff, 0xfe, 0x00])).await.unwrap();
        assert!(matches!(store.load_text(&id).await, Err(StorageError::InvalidUtf8(_))));
    }
}
