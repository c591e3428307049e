//! core type-safe wrappers around git primitives for the storage layer.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use git2::Oid;
use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};

/// A content-addressed object hash (40 lowercase hex characters).
///
/// Every backend speaks in these: git2 oids, GitHub `sha` fields and the
/// on-disk cache file names are all converted through this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// parse an ObjectId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, InvalidNameError> {
        if hex.len() != 40 {
            return Err(InvalidNameError::InvalidHash(hex.to_string()));
        }
        if let Some((position, char)) = hex.chars().enumerate().find(|(_, c)| !c.is_ascii_hexdigit()) {
            return Err(InvalidNameError::InvalidCharacter { char, position });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub(crate) fn from_oid(oid: Oid) -> Self {
        Self(oid.to_string())
    }

    pub(crate) fn to_oid(&self) -> Result<Oid, git2::Error> {
        Oid::from_str(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// short form of the hash
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// The three object kinds a record repository is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic names for the octal modes used by git trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    /// `040000`
    Tree,
    /// `100644`, a regular file
    File,
    /// `100755`
    Exec,
    /// `120000`
    Symlink,
    /// `160000`, a submodule commit
    Commit,
}

impl EntryMode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0o040000 => Some(Self::Tree),
            0o100644 => Some(Self::File),
            0o100755 => Some(Self::Exec),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Commit),
            _ => None,
        }
    }

    /// parse the zero-padded octal form used by the GitHub API (`"100644"`)
    pub fn from_octal(octal: &str) -> Option<Self> {
        u32::from_str_radix(octal, 8).ok().and_then(Self::from_raw)
    }

    pub fn as_raw(&self) -> u32 {
        match self {
            Self::Tree => 0o040000,
            Self::File => 0o100644,
            Self::Exec => 0o100755,
            Self::Symlink => 0o120000,
            Self::Commit => 0o160000,
        }
    }

    pub fn as_octal(&self) -> String {
        format!("{:06o}", self.as_raw())
    }

    /// the object kind an entry with this mode points at
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Self::Tree => ObjectKind::Tree,
            Self::Commit => ObjectKind::Commit,
            Self::File | Self::Exec | Self::Symlink => ObjectKind::Blob,
        }
    }
}

/// A single child of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub hash: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, hash: ObjectId) -> Self {
        Self { mode, hash }
    }
}

/// A tree: path-segment name -> `{mode, hash}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: TreeEntry) -> Option<TreeEntry> {
        self.entries.insert(name.into(), entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<TreeEntry> {
        self.entries.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// the child tree with the given name, if there is one
    pub fn subtree(&self, name: &str) -> Option<&ObjectId> {
        self.get(name)
            .filter(|entry| entry.mode == EntryMode::Tree)
            .map(|entry| &entry.hash)
    }

    /// record files in this tree: regular files ending in `.json`
    ///
    /// yields `(record id, entry)` where the id is the file name without
    /// its extension.
    pub fn json_records(&self) -> impl Iterator<Item = (&str, &TreeEntry)> {
        self.iter().filter_map(|(name, entry)| {
            if entry.mode != EntryMode::File {
                return None;
            }
            let id = name.strip_suffix(".json")?;
            Some((id, entry))
        })
    }
}

impl FromIterator<(String, TreeEntry)> for Tree {
    fn from_iter<I: IntoIterator<Item = (String, TreeEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub time: DateTime<Utc>,
}

impl Signature {
    /// create a new signature stamped with the current time
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time: Self::truncate(Utc::now()),
        }
    }

    /// default signature for gitrecords commits
    pub fn gitrecords() -> Self {
        Self::now("gitrecords", "gitrecords@localhost")
    }

    // git stores whole seconds only
    fn truncate(time: DateTime<Utc>) -> DateTime<Utc> {
        Utc.timestamp_opt(time.timestamp(), 0).single().unwrap_or(time)
    }

    pub(crate) fn from_git2(signature: &git2::Signature<'_>) -> Self {
        let time = Utc
            .timestamp_opt(signature.when().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            name: signature.name().unwrap_or("Unknown").to_string(),
            email: signature.email().unwrap_or("unknown@unknown").to_string(),
            time,
        }
    }

    pub(crate) fn to_git2(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::new(
            &self.name,
            &self.email,
            &git2::Time::new(self.time.timestamp(), 0),
        )
    }
}

/// A commit: root tree plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    pub fn new(tree: ObjectId, parents: Vec<ObjectId>, signature: Signature, message: impl Into<String>) -> Self {
        Self {
            tree,
            parents,
            author: signature.clone(),
            committer: signature,
            message: message.into(),
        }
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }
}

/// A decoded object as moved between store layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitObject {
    Blob(Vec<u8>),
    Tree(Tree),
    Commit(Commit),
}

impl GitObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
        }
    }

    pub fn into_blob(self) -> StorageResult<Vec<u8>> {
        match self {
            Self::Blob(bytes) => Ok(bytes),
            other => Err(StorageError::UnexpectedObjectType {
                expected: ObjectKind::Blob,
                found: other.kind(),
            }),
        }
    }

    pub fn into_tree(self) -> StorageResult<Tree> {
        match self {
            Self::Tree(tree) => Ok(tree),
            other => Err(StorageError::UnexpectedObjectType {
                expected: ObjectKind::Tree,
                found: other.kind(),
            }),
        }
    }

    pub fn into_commit(self) -> StorageResult<Commit> {
        match self {
            Self::Commit(commit) => Ok(commit),
            other => Err(StorageError::UnexpectedObjectType {
                expected: ObjectKind::Commit,
                found: other.kind(),
            }),
        }
    }
}

/// a branch name; reads always go through `refs/heads/<branch>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// branch used when neither the address nor the options name one
    pub const DEFAULT: &'static str = "master";

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        // git is more permissive, we stay restrictive
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name.contains("..") || name.ends_with('/') || name.starts_with('/') {
            return Err(InvalidNameError::InvalidPath(name));
        }
        if let Some((position, char)) = name
            .chars()
            .enumerate()
            .find(|(_, c)| c.is_whitespace() || matches!(*c, '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
        {
            return Err(InvalidNameError::InvalidCharacter { char, position });
        }
        Ok(Self(name))
    }

    pub fn default_branch() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    /// get the full ref path (e.g., "refs/heads/master")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BranchName {
    fn default() -> Self {
        Self::default_branch()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote repository identifier, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let owner = owner.into();
        let name = name.into();
        for part in [&owner, &name] {
            if part.is_empty() {
                return Err(InvalidNameError::Empty);
            }
            if part.contains('/') || part == "." || part == ".." {
                return Err(InvalidNameError::InvalidPath(format!("{owner}/{name}")));
            }
        }
        Ok(Self { owner, name })
    }

    /// parse `owner/name`
    pub fn parse(identifier: &str) -> Result<Self, InvalidNameError> {
        let (owner, name) = identifier
            .split_once('/')
            .ok_or_else(|| InvalidNameError::InvalidPath(identifier.to_string()))?;
        Self::new(owner, name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// An access token for the remote. Never printed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

/// error type for invalid names (hashes, branches, repositories, paths)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    InvalidHash(String),
    InvalidCharacter { char: char, position: usize },
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::InvalidHash(hash) => write!(f, "not a 40 character object hash: '{}'", hash),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}
