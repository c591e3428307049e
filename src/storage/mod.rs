//! storage layer for gitrecords
//!
//! this module is the object-level view of a repository. Upper layers (the
//! handle stack and the sync resolver) only speak [`ObjectStore`] and never
//! touch git2 or HTTP directly.
//!
//! # Architecture
//!
//! ```text
//!                       ┌──────────────────────┐
//!                       │     ObjectStore      │
//!                       │ load / save / refs   │
//!                       └──────────────────────┘
//!                                  │
//!              ┌───────────────────┼───────────────────┐
//!              ▼                                       ▼
//!       ┌─────────────┐                         ┌─────────────┐
//!       │  GitStore   │                         │ GithubStore │
//!       │ (git2, disk)│                         │ (REST API)  │
//!       └─────────────┘                         └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use gitrecords::storage::{GitStore, ObjectStore, ObjectStoreExt};
//!
//! let store = GitStore::open("./records")?;
//! let head = store.read_ref("refs/heads/master").await?;
//! let commit = store.load_commit(&head).await?;
//! let root = store.load_tree(&commit.tree).await?;
//! ```

mod error;
mod formats;
mod git;
mod github;
mod store;
mod types;

pub use error::{StorageError, StorageResult};
pub use formats::ObjectStoreExt;
pub use git::GitStore;
pub use github::{build_client, GithubStore, DEFAULT_API_URL};
pub use store::{EntryContent, ObjectStore, PathEntry};
pub use types::{
    BranchName, Commit, Credential, EntryMode, GitObject, InvalidNameError, ObjectId, ObjectKind, RepoId,
    Signature, Tree, TreeEntry,
};
