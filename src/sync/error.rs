//! Sync error types.

use thiserror::Error;

use crate::storage::{InvalidNameError, StorageError};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors delivered to the caller of a sync job.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Only reads are implemented; every other method fails immediately.
    #[error("Only \"read\" supported at this stage")]
    UnsupportedMethod(String),

    /// The branch's root tree has no subtree named after the collection.
    #[error("Collection not found")]
    CollectionNotFound { collection: String },

    /// The collection subtree has no `<id>.json`.
    #[error("model not found")]
    ModelNotFound { collection: String, id: String },

    /// A record blob is not valid JSON.
    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// No repository could be derived from the model address or the options.
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    /// The model has no address, neither its own nor through a collection.
    #[error("model has no url")]
    MissingAddress,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The queue went away before the job finished.
    #[error("sync queue closed before the job completed")]
    QueueClosed,

    /// At least one record of a collection failed to load.
    ///
    /// `records` holds every record in collection order with `null` in place
    /// of the failed ones; `first` is the first failure to complete.
    #[error("{first}")]
    Collection {
        #[source]
        first: Box<SyncError>,
        records: Vec<serde_json::Value>,
    },
}

impl SyncError {
    /// check if this error means the data simply isn't there
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::CollectionNotFound { .. } | SyncError::ModelNotFound { .. } => true,
            SyncError::Storage(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// the records that did load, for a partially failed collection
    pub fn partial_records(&self) -> Option<&[serde_json::Value]> {
        match self {
            SyncError::Collection { records, .. } => Some(records),
            _ => None,
        }
    }
}

impl From<InvalidNameError> for SyncError {
    fn from(err: InvalidNameError) -> Self {
        SyncError::Storage(StorageError::InvalidName(err))
    }
}

/// Result type for adapter construction and option loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building an adapter.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The default options carry no usable token.
    #[error("a credential is required to create the adapter")]
    MissingCredential,

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
