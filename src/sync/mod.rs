//! model synchronisation
//!
//! `Adapter::sync(method, model, options)` merges options, finds the
//! repository handle for the model and pushes a [`Job`] onto the
//! [`SyncQueue`]. The queue's worker, [`Resolver`], turns reads into object
//! graph walks; every other method is rejected.

mod adapter;
pub mod address;
mod error;
mod job;
mod model;
mod options;
mod queue;
mod resolver;

pub use adapter::{repository_for, Adapter};
pub use error::{ConfigError, ConfigResult, SyncError, SyncResult};
pub use job::{Job, JobHandle, Method};
pub use model::{Model, ModelEvents};
pub use options::{
    ErrorCallback, SuccessCallback, SyncOptions, ENV_BRANCH, ENV_CONCURRENCY, ENV_GITHUB_TOKEN, ENV_REPO, ENV_TOKEN,
    ENV_USER,
};
pub use queue::{JobContext, QueueStats, SyncQueue, Worker, DEFAULT_CONCURRENCY};
pub use resolver::{determine_target, load_record, resolve_collection, ReadTarget, ResolvedCollection, Resolver};
