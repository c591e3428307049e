//! Storage layer error types
//!
//! All errors that can occur while talking to an object store are defined here.
//! The error is `Clone` because one failed load can be handed to every caller
//! that was waiting on the same in-flight request, so foreign errors are kept
//! as their rendered message.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::{InvalidNameError, ObjectId, ObjectKind};

/// the main error type for storage operations
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(String),

    /// no object with this hash exists in the store
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// the specified branch/ref was not found
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// an object was loaded as the wrong kind
    #[error("unexpected object type: expected {expected}, found {found}")]
    UnexpectedObjectType { expected: ObjectKind, found: ObjectKind },

    /// a hash, branch or repository name failed validation
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// invalid UTF-8 in blob content
    #[error("invalid utf-8 in blob {0}")]
    InvalidUtf8(ObjectId),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// the remote answered with a non-success status
    #[error("remote returned {status}: {message}")]
    Http { status: u16, message: String },

    /// the remote could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(String),

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ObjectNotFound(_) | StorageError::RefNotFound(_) | StorageError::NotInitialized(_)
        )
    }

    /// check if this error came from the wire rather than from the data
    pub fn is_transport(&self) -> bool {
        match self {
            StorageError::Transport(_) => true,
            StorageError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<git2::Error> for StorageError {
    fn from(err: git2::Error) -> Self {
        StorageError::Git(err.message().to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => StorageError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => StorageError::Transport(err.to_string()),
        }
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
