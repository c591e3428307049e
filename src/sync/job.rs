//! Sync jobs and their result handles.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::handle::RepositoryHandle;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::model::Model;
use crate::sync::options::SyncOptions;

/// The persistence method a job was created for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Read,
    Create,
    Update,
    Patch,
    Delete,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Read => "read",
            Method::Create => "create",
            Method::Update => "update",
            Method::Patch => "patch",
            Method::Delete => "delete",
            Method::Other(name) => name,
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        match name {
            "read" => Method::Read,
            "create" => Method::Create,
            "update" => Method::Update,
            "patch" => Method::Patch,
            "delete" => Method::Delete,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work for the sync queue. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Ulid,
    pub method: Method,
    pub model: Model,
    pub handle: RepositoryHandle,
    pub options: SyncOptions,
}

impl Job {
    pub fn new(method: Method, model: Model, handle: RepositoryHandle, options: SyncOptions) -> Self {
        Self {
            id: Ulid::new(),
            method,
            model,
            handle,
            options,
        }
    }

    /// A read of record `id` in this job's collection, sharing handle and
    /// options. Callbacks belong to the caller of the parent job and are not
    /// passed on.
    pub fn child(&self, id: &str) -> Job {
        let mut options = self.options.clone();
        options.success = None;
        options.error = None;
        Job::new(
            Method::Read,
            Model::record(id, self.model.clone()),
            self.handle.clone(),
            options,
        )
    }
}

/// Resolves to the outcome of one job.
///
/// Dropping the handle only discards the result; the job still runs.
#[must_use = "a JobHandle does nothing unless awaited"]
pub struct JobHandle {
    id: Option<Ulid>,
    rx: oneshot::Receiver<SyncResult<Value>>,
}

impl JobHandle {
    pub(crate) fn channel(id: Option<Ulid>) -> (oneshot::Sender<SyncResult<Value>>, JobHandle) {
        let (tx, rx) = oneshot::channel();
        (tx, JobHandle { id, rx })
    }

    /// A handle that is already complete.
    pub fn ready(result: SyncResult<Value>) -> Self {
        let (tx, handle) = Self::channel(None);
        // the receiver is alive, so this cannot fail
        let _ = tx.send(result);
        handle
    }

    /// id of the job, `None` when the call failed before a job was created
    pub fn id(&self) -> Option<Ulid> {
        self.id
    }
}

impl Future for JobHandle {
    type Output = SyncResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SyncError::QueueClosed)))
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}
