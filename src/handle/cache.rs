//! Local object cache.
//!
//! A [`CacheRoot`] owns the cache location (memory only, or a directory on
//! disk). Each repository gets its own [`CacheNamespace`] below it, so hashes
//! and refs of two repositories never mix.
//!
//! On-disk layout per namespace:
//!
//! ```text
//! <root>/<owner>/<name>/blob/<hash>      raw bytes
//! <root>/<owner>/<name>/tree/<hash>      JSON
//! <root>/<owner>/<name>/commit/<hash>    JSON
//! <root>/<owner>/<name>/refs/heads/<b>   hash
//! ```
//!
//! Cache writes are best effort: a failing disk only costs a warning. Files
//! are written to a temporary name and renamed into place, so a reader never
//! sees a partial object.
//!
//! With a directory configured, blobs larger than [`MEMORY_BLOB_LIMIT`] are
//! kept on disk only; trees, commits and small blobs are also held in memory.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::storage::{GitObject, ObjectId, ObjectKind, RepoId, StorageError, StorageResult};

/// Largest blob held in memory when the namespace also has a directory.
pub const MEMORY_BLOB_LIMIT: usize = 100;

/// Where namespaces live.
#[derive(Debug, Clone, Default)]
pub struct CacheRoot {
    dir: Option<PathBuf>,
}

impl CacheRoot {
    /// Cache that lives for the process only.
    pub fn in_memory() -> Self {
        Self { dir: None }
    }

    /// Cache mirrored to `dir`.
    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Prepare the cache location. Must finish before jobs are dispatched.
    pub async fn init(&self) -> StorageResult<()> {
        if let Some(dir) = &self.dir {
            tokio::fs::create_dir_all(dir).await?;
            debug!(dir = %dir.display(), "cache directory ready");
        }
        Ok(())
    }

    /// A fresh namespace for one repository.
    pub fn namespace(&self, repo: &RepoId) -> CacheNamespace {
        let dir = self.dir.as_ref().map(|dir| dir.join(repo.owner()).join(repo.name()));
        CacheNamespace::new(repo.to_string(), dir)
    }
}

/// Cache scoped to one repository.
///
/// Clone this to share across layers - it uses Arc internally.
#[derive(Clone)]
pub struct CacheNamespace {
    inner: Arc<NamespaceInner>,
}

struct NamespaceInner {
    label: String,
    dir: Option<PathBuf>,
    objects: RwLock<HashMap<ObjectId, GitObject>>,
    refs: RwLock<HashMap<String, ObjectId>>,
}

impl CacheNamespace {
    fn new(label: String, dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(NamespaceInner {
                label,
                dir,
                objects: RwLock::new(HashMap::new()),
                refs: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// A memory-only namespace not attached to any root.
    pub fn detached(label: impl Into<String>) -> Self {
        Self::new(label.into(), None)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// true when both values are the same namespace
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// number of objects held in memory
    pub fn len(&self) -> usize {
        self.inner.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn get_object(&self, kind: ObjectKind, id: &ObjectId) -> Option<GitObject> {
        let cached = self.inner.objects.read().get(id).cloned();
        if let Some(object) = cached {
            return (object.kind() == kind).then_some(object);
        }

        let path = self.object_path(kind, id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(cache = %self.label(), path = %path.display(), error = %err, "cache read failed");
                return None;
            }
        };

        let object = match decode(kind, bytes) {
            Ok(object) => object,
            Err(err) => {
                warn!(cache = %self.label(), hash = %id, error = %err, "dropping corrupt cache entry");
                return None;
            }
        };
        self.remember(id, &object);
        Some(object)
    }

    pub async fn put_object(&self, id: &ObjectId, object: &GitObject) {
        self.remember(id, object);

        let Some(path) = self.object_path(object.kind(), id) else {
            return;
        };
        let result = match encode(object) {
            Ok(bytes) => write_file(&path, &bytes).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(cache = %self.label(), hash = %id, error = %err, "cache write failed");
        }
    }

    pub async fn contains(&self, id: &ObjectId) -> bool {
        let cached = self.inner.objects.read().contains_key(id);
        if cached {
            return true;
        }
        for kind in [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::Commit] {
            if let Some(path) = self.object_path(kind, id) {
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return true;
                }
            }
        }
        false
    }

    /// last known hash of a ref
    pub async fn get_ref(&self, name: &str) -> Option<ObjectId> {
        let cached = self.inner.refs.read().get(name).cloned();
        if cached.is_some() {
            return cached;
        }

        let path = self.ref_path(name)?;
        let text = tokio::fs::read_to_string(&path).await.ok()?;
        let id = ObjectId::from_hex(text.trim()).ok()?;
        self.inner.refs.write().insert(name.to_string(), id.clone());
        Some(id)
    }

    pub async fn put_ref(&self, name: &str, id: &ObjectId) {
        self.inner.refs.write().insert(name.to_string(), id.clone());

        if let Some(path) = self.ref_path(name) {
            if let Err(err) = write_file(&path, id.as_str().as_bytes()).await {
                warn!(cache = %self.label(), reference = name, error = %err, "ref cache write failed");
            }
        }
    }

    fn remember(&self, id: &ObjectId, object: &GitObject) {
        let resident = match object {
            GitObject::Blob(bytes) => self.inner.dir.is_none() || bytes.len() <= MEMORY_BLOB_LIMIT,
            GitObject::Tree(_) | GitObject::Commit(_) => true,
        };
        if resident {
            self.inner.objects.write().insert(id.clone(), object.clone());
        }
    }

    fn object_path(&self, kind: ObjectKind, id: &ObjectId) -> Option<PathBuf> {
        Some(self.inner.dir.as_ref()?.join(kind.as_str()).join(id.as_str()))
    }

    fn ref_path(&self, name: &str) -> Option<PathBuf> {
        let dir = self.inner.dir.as_ref()?;
        // never let a ref name escape the namespace
        if name.split('/').any(|part| part.is_empty() || part == "..") {
            return None;
        }
        Some(dir.join(name))
    }
}

impl std::fmt::Debug for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheNamespace")
            .field("label", &self.inner.label)
            .field("dir", &self.inner.dir)
            .finish()
    }
}

fn encode(object: &GitObject) -> StorageResult<Vec<u8>> {
    Ok(match object {
        GitObject::Blob(bytes) => bytes.clone(),
        GitObject::Tree(tree) => serde_json::to_vec(tree)?,
        GitObject::Commit(commit) => serde_json::to_vec(commit)?,
    })
}

fn decode(kind: ObjectKind, bytes: Vec<u8>) -> StorageResult<GitObject> {
    Ok(match kind {
        ObjectKind::Blob => GitObject::Blob(bytes),
        ObjectKind::Tree => GitObject::Tree(serde_json::from_slice(&bytes)?),
        ObjectKind::Commit => GitObject::Commit(serde_json::from_slice(&bytes)?),
    })
}

async fn write_file(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::Internal(format!("cache path {} has no parent", path.display())))?
        .to_path_buf();
    tokio::fs::create_dir_all(&parent).await?;

    let (path, bytes) = (path.to_path_buf(), bytes.to_vec());
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut file = tempfile::NamedTempFile::new_in(&parent)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(|err| StorageError::Internal(format!("cache write task failed: {err}")))??;
    Ok(())
}
