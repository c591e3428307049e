//! The object store capability interface.
//!
//! Every layer of a repository handle implements [`ObjectStore`]: the remote
//! (GitHub or a local git repository), the local cache, the ref cache and the
//! request combiner. Layers wrap each other, so the resolver never knows which
//! of them actually answered.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{EntryMode, GitObject, InvalidNameError, ObjectId, ObjectKind, Tree, TreeEntry};

/// Load/save/ref access to one logical repository.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// load an object of the given kind by hash
    async fn load(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<GitObject>;

    /// store an object, returning its hash
    async fn save(&self, object: &GitObject) -> StorageResult<ObjectId>;

    /// resolve a full ref name (`refs/heads/master`) to the hash it points at
    async fn read_ref(&self, name: &str) -> StorageResult<ObjectId>;

    /// point a ref at a hash, creating it if needed
    async fn update_ref(&self, name: &str, id: &ObjectId) -> StorageResult<ObjectId>;

    /// check whether an object exists
    async fn has_hash(&self, id: &ObjectId) -> StorageResult<bool>;

    /// build a (possibly nested) tree from path entries on top of `base`
    ///
    /// Blobs given inline are saved first, intermediate trees are created as
    /// needed. All writes go through `self.save`, so a layer that caches saved
    /// objects sees every tree this creates.
    async fn create_tree(&self, base: Option<ObjectId>, entries: Vec<PathEntry>) -> StorageResult<ObjectId> {
        let mut root = PendingTree::default();
        for entry in entries {
            let segments: Vec<String> = entry
                .path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect();
            if segments.is_empty() {
                return Err(StorageError::InvalidName(InvalidNameError::InvalidPath(entry.path)));
            }
            root.insert(&segments, entry.mode, entry.content);
        }
        write_pending(self, base, root).await
    }
}

/// One change for [`ObjectStore::create_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: String,
    pub mode: EntryMode,
    pub content: EntryContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    /// an object that already exists
    Hash(ObjectId),
    /// bytes to save as a new blob
    Blob(Vec<u8>),
    /// drop the entry from the base tree
    Remove,
}

impl PathEntry {
    /// a regular file with inline content
    pub fn blob(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            mode: EntryMode::File,
            content: EntryContent::Blob(content.into()),
        }
    }

    pub fn hash(path: impl Into<String>, mode: EntryMode, id: ObjectId) -> Self {
        Self {
            path: path.into(),
            mode,
            content: EntryContent::Hash(id),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: EntryMode::File,
            content: EntryContent::Remove,
        }
    }
}

#[derive(Default)]
struct PendingTree {
    leaves: BTreeMap<String, (EntryMode, EntryContent)>,
    subtrees: BTreeMap<String, PendingTree>,
}

impl PendingTree {
    fn insert(&mut self, segments: &[String], mode: EntryMode, content: EntryContent) {
        match segments {
            [name] => {
                self.leaves.insert(name.clone(), (mode, content));
            }
            [dir, rest @ ..] => self
                .subtrees
                .entry(dir.clone())
                .or_default()
                .insert(rest, mode, content),
            [] => {}
        }
    }
}

fn write_pending<'a, S>(store: &'a S, base: Option<ObjectId>, pending: PendingTree) -> BoxFuture<'a, StorageResult<ObjectId>>
where
    S: ObjectStore + ?Sized,
{
    async move {
        let mut tree = match base {
            Some(id) => store.load(ObjectKind::Tree, &id).await?.into_tree()?,
            None => Tree::new(),
        };

        for (name, subtree) in pending.subtrees {
            let sub_base = tree.subtree(&name).cloned();
            let id = write_pending(store, sub_base, subtree).await?;
            tree.insert(name, TreeEntry::new(EntryMode::Tree, id));
        }

        for (name, (mode, content)) in pending.leaves {
            match content {
                EntryContent::Remove => {
                    tree.remove(&name);
                }
                EntryContent::Hash(id) => {
                    tree.insert(name, TreeEntry::new(mode, id));
                }
                EntryContent::Blob(bytes) => {
                    let id = store.save(&GitObject::Blob(bytes)).await?;
                    tree.insert(name, TreeEntry::new(mode, id));
                }
            }
        }

        store.save(&GitObject::Tree(tree)).await
    }
    .boxed()
}
