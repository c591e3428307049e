//! Local git repository store.
//!
//! Wraps `git2::Repository` behind a mutex and runs every call on the blocking
//! pool, so it can sit under the same async layers as the GitHub remote. Used
//! for local mirrors, the CLI's `--local` mode and the test-suite.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use git2::{ErrorCode, ObjectType, Repository};
use parking_lot::Mutex;
use tracing::warn;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::store::ObjectStore;
use crate::storage::types::{Commit, EntryMode, GitObject, ObjectId, ObjectKind, Signature, Tree, TreeEntry};

/// A git repository on disk.
///
/// Clone this to share across tasks - it uses Arc internally.
#[derive(Clone)]
pub struct GitStore {
    inner: Arc<GitStoreInner>,
}

struct GitStoreInner {
    repo: Mutex<Repository>,
    path: PathBuf,
}

impl GitStore {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        Ok(Self::from_repository(repo, path))
    }

    /// Initialize a new repository.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;
        Ok(Self::from_repository(repo, path))
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() || path.join("HEAD").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    fn from_repository(repo: Repository, path: &Path) -> Self {
        Self {
            inner: Arc::new(GitStoreInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
            }),
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Execute a function with the repository on the blocking pool.
    async fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let repo = inner.repo.lock();
            f(&repo)
        })
        .await
        .map_err(|err| StorageError::Internal(format!("git task failed: {err}")))?
    }
}

#[async_trait]
impl ObjectStore for GitStore {
    async fn load(&self, kind: ObjectKind, id: &ObjectId) -> StorageResult<GitObject> {
        let oid = id.to_oid()?;
        let id = id.clone();
        self.with_repo(move |repo| {
            let object = repo.find_object(oid, None).map_err(|err| {
                if err.code() == ErrorCode::NotFound {
                    StorageError::ObjectNotFound(id.clone())
                } else {
                    StorageError::from(err)
                }
            })?;
            decode_object(&object, kind)
        })
        .await
    }

    async fn save(&self, object: &GitObject) -> StorageResult<ObjectId> {
        let object = object.clone();
        self.with_repo(move |repo| {
            let oid = match object {
                GitObject::Blob(bytes) => repo.blob(&bytes)?,
                GitObject::Tree(tree) => write_tree(repo, &tree)?,
                GitObject::Commit(commit) => write_commit(repo, &commit)?,
            };
            Ok(ObjectId::from_oid(oid))
        })
        .await
    }

    async fn read_ref(&self, name: &str) -> StorageResult<ObjectId> {
        let name = name.to_string();
        self.with_repo(move |repo| {
            let reference = repo
                .find_reference(&name)
                .and_then(|reference| reference.resolve())
                .map_err(|_| StorageError::RefNotFound(name.clone()))?;

            reference
                .target()
                .map(ObjectId::from_oid)
                .ok_or(StorageError::RefNotFound(name))
        })
        .await
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> StorageResult<ObjectId> {
        let name = name.to_string();
        let oid = id.to_oid()?;
        self.with_repo(move |repo| {
            repo.reference(&name, oid, true, &format!("gitrecords: update {name}"))?;
            Ok(ObjectId::from_oid(oid))
        })
        .await
    }

    async fn has_hash(&self, id: &ObjectId) -> StorageResult<bool> {
        let oid = id.to_oid()?;
        self.with_repo(move |repo| Ok(repo.odb()?.exists(oid))).await
    }
}

fn object_kind(kind: Option<ObjectType>) -> StorageResult<ObjectKind> {
    match kind {
        Some(ObjectType::Blob) => Ok(ObjectKind::Blob),
        Some(ObjectType::Tree) => Ok(ObjectKind::Tree),
        Some(ObjectType::Commit) => Ok(ObjectKind::Commit),
        other => Err(StorageError::Internal(format!("unsupported object type {other:?}"))),
    }
}

fn decode_object(object: &git2::Object<'_>, expected: ObjectKind) -> StorageResult<GitObject> {
    let found = object_kind(object.kind())?;
    if found != expected {
        return Err(StorageError::UnexpectedObjectType { expected, found });
    }

    let missing = || StorageError::Internal(format!("object {} is not a {expected}", object.id()));
    match expected {
        ObjectKind::Blob => {
            let blob = object.as_blob().ok_or_else(missing)?;
            Ok(GitObject::Blob(blob.content().to_vec()))
        }
        ObjectKind::Tree => {
            let tree = object.as_tree().ok_or_else(missing)?;
            Ok(GitObject::Tree(read_tree(tree)?))
        }
        ObjectKind::Commit => {
            let commit = object.as_commit().ok_or_else(missing)?;
            Ok(GitObject::Commit(read_commit(commit)))
        }
    }
}

fn read_tree(tree: &git2::Tree<'_>) -> StorageResult<Tree> {
    let mut entries = Tree::new();
    for entry in tree.iter() {
        let Some(name) = entry.name() else {
            warn!(tree = %tree.id(), "skipping tree entry with a non utf-8 name");
            continue;
        };
        let mode = EntryMode::from_raw(entry.filemode() as u32).ok_or_else(|| {
            StorageError::Internal(format!("unknown mode {:o} for entry {name}", entry.filemode()))
        })?;
        entries.insert(name, TreeEntry::new(mode, ObjectId::from_oid(entry.id())));
    }
    Ok(entries)
}

fn read_commit(commit: &git2::Commit<'_>) -> Commit {
    Commit {
        tree: ObjectId::from_oid(commit.tree_id()),
        parents: commit.parent_ids().map(ObjectId::from_oid).collect(),
        author: Signature::from_git2(&commit.author()),
        committer: Signature::from_git2(&commit.committer()),
        message: commit.message().unwrap_or("").to_string(),
    }
}

fn write_tree(repo: &Repository, tree: &Tree) -> StorageResult<git2::Oid> {
    let mut builder = repo.treebuilder(None)?;
    for (name, entry) in tree.iter() {
        builder.insert(name, entry.hash.to_oid()?, entry.mode.as_raw() as i32)?;
    }
    Ok(builder.write()?)
}

fn write_commit(repo: &Repository, commit: &Commit) -> StorageResult<git2::Oid> {
    let tree = repo.find_tree(commit.tree.to_oid()?)?;
    let parents = commit
        .parents
        .iter()
        .map(|id| Ok(repo.find_commit(id.to_oid()?)?))
        .collect::<StorageResult<Vec<_>>>()?;
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

    let oid = repo.commit(
        None,
        &commit.author.to_git2()?,
        &commit.committer.to_git2()?,
        &commit.message,
        &tree,
        &parent_refs,
    )?;
    Ok(oid)
}
