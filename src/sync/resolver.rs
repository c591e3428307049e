//! Read resolution.
//!
//! A read walks the object graph of one branch:
//!
//! ```text
//! refs/heads/<branch> -> commit -> root tree -> <collection>/ -> <id>.json
//! ```
//!
//! A record read parses the one blob. A collection read pushes one record
//! read per `.json` file back onto the queue and gathers their results in
//! tree order.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::handle::RepositoryHandle;
use crate::storage::{BranchName, ObjectId, ObjectStore, ObjectStoreExt, Tree};
use crate::sync::address;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::job::{Job, Method};
use crate::sync::model::Model;
use crate::sync::options::SyncOptions;
use crate::sync::queue::{JobContext, Worker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    DetermineTarget,
    ResolveRef,
    ResolveCommit,
    ResolveRootTree,
    ResolveCollectionTree,
    LoadOne,
    FanOut,
}

/// What a read is after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTarget {
    pub branch: BranchName,
    pub collection: String,
    /// `None` reads the whole collection
    pub record: Option<String>,
}

/// A collection subtree and the objects that led to it.
#[derive(Debug, Clone)]
pub struct ResolvedCollection {
    pub branch: BranchName,
    pub commit: ObjectId,
    pub root_tree: ObjectId,
    pub tree_id: ObjectId,
    pub tree: Tree,
}

/// Decide the branch, collection and record a model addresses.
///
/// The branch comes from a `/tree/<branch>/` address, then from the options,
/// then falls back to `master`.
pub fn determine_target(model: &Model, options: &SyncOptions) -> SyncResult<ReadTarget> {
    let collection_model = model.parent().map(|parent| parent.as_ref()).unwrap_or(model);
    let url = collection_model.url().ok_or(SyncError::MissingAddress)?;

    let branch = match address::branch(&url).or_else(|| options.branch.clone()) {
        Some(name) => BranchName::new(name)?,
        None => BranchName::default_branch(),
    };
    let collection = address::collection_id(&url)
        .ok_or(SyncError::MissingAddress)?
        .to_string();

    let record = match model.parent() {
        Some(_) => Some(
            model
                .id()
                .ok_or_else(|| SyncError::ModelNotFound {
                    collection: collection.clone(),
                    id: String::new(),
                })?
                .to_string(),
        ),
        None => None,
    };

    Ok(ReadTarget {
        branch,
        collection,
        record,
    })
}

/// Walk from the branch ref down to the collection subtree.
pub async fn resolve_collection(
    handle: &RepositoryHandle,
    branch: &BranchName,
    collection: &str,
) -> SyncResult<ResolvedCollection> {
    trace_state(handle, ReadState::ResolveRef);
    let commit = handle.read_ref(&branch.as_ref_path()).await?;

    trace_state(handle, ReadState::ResolveCommit);
    let root_tree = handle.load_commit(&commit).await?.tree;

    trace_state(handle, ReadState::ResolveRootTree);
    let root = handle.load_tree(&root_tree).await?;

    trace_state(handle, ReadState::ResolveCollectionTree);
    let tree_id = root
        .subtree(collection)
        .cloned()
        .ok_or_else(|| SyncError::CollectionNotFound {
            collection: collection.to_string(),
        })?;
    let tree = handle.load_tree(&tree_id).await?;

    Ok(ResolvedCollection {
        branch: branch.clone(),
        commit,
        root_tree,
        tree_id,
        tree,
    })
}

/// Load and parse `<id>.json` from a resolved collection.
pub async fn load_record(
    handle: &RepositoryHandle,
    resolved: &ResolvedCollection,
    collection: &str,
    id: &str,
) -> SyncResult<Value> {
    trace_state(handle, ReadState::LoadOne);
    let entry = resolved
        .tree
        .get(&format!("{id}.json"))
        .ok_or_else(|| SyncError::ModelNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
    let text = handle.load_text(&entry.hash).await?;
    Ok(serde_json::from_str(&text)?)
}

/// The worker behind the adapter's queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct Resolver;

impl Resolver {
    async fn read(&self, job: &Job, ctx: &mut JobContext) -> SyncResult<Value> {
        job.model.trigger("request", None, &job.options);

        trace_state(&job.handle, ReadState::DetermineTarget);
        let target = determine_target(&job.model, &job.options)?;
        let resolved = resolve_collection(&job.handle, &target.branch, &target.collection).await?;

        match &target.record {
            Some(id) => load_record(&job.handle, &resolved, &target.collection, id).await,
            None => self.fan_out(job, ctx, &resolved).await,
        }
    }

    async fn fan_out(&self, job: &Job, ctx: &mut JobContext, resolved: &ResolvedCollection) -> SyncResult<Value> {
        trace_state(&job.handle, ReadState::FanOut);
        let children: Vec<_> = resolved
            .tree
            .json_records()
            .map(|(id, _)| ctx.queue().push(job.child(id)))
            .collect();
        // children may need this slot
        ctx.release_slot();

        debug!(job = %job.id, children = children.len(), "collection dispatched");
        let mut records = vec![Value::Null; children.len()];
        let mut first_error = None;

        let mut pending: FuturesUnordered<_> = children
            .into_iter()
            .enumerate()
            .map(|(index, child)| async move { (index, child.await) })
            .collect();
        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(record) => records[index] = record,
                Err(err) => {
                    warn!(job = %job.id, error = %err, "record in collection failed to load");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            None => Ok(Value::Array(records)),
            Some(first) => Err(SyncError::Collection {
                first: Box::new(first),
                records,
            }),
        }
    }
}

#[async_trait]
impl Worker for Resolver {
    async fn run(&self, job: Job, mut ctx: JobContext) -> SyncResult<Value> {
        if job.method != Method::Read {
            debug!(job = %job.id, method = %job.method, "rejecting non-read job");
            return Err(SyncError::UnsupportedMethod(job.method.to_string()));
        }

        let result = self.read(&job, &mut ctx).await;
        match &result {
            Ok(_) => debug!(job = %job.id, "read done"),
            Err(err) => debug!(job = %job.id, error = %err, "read failed"),
        }
        result
    }
}

fn trace_state(handle: &RepositoryHandle, state: ReadState) {
    debug!(repo = %handle.repo(), ?state, "resolving");
}
