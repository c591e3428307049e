//! gitrecords - JSON records and collections read straight out of a Git branch
//!
//! A collection is a directory on a branch, a record is a `<id>.json` file in
//! it. Reads walk the object graph (ref, commit, root tree, collection tree,
//! blob) through a cached, de-duplicated handle per repository, on a
//! bounded-concurrency queue.
//!
//! # Example
//!
//! ```no_run
//! use gitrecords::sync::{Adapter, Model, SyncOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = Adapter::new(SyncOptions::new().with_credential("ghp_..."))?;
//! let todos = Model::collection("https://github.com/acme/widgets/tree/dev/todos");
//! let all = adapter.read(todos.clone()).await?;
//! let one = adapter.read(Model::record("a", todos)).await?;
//! # Ok(())
//! # }
//! ```

pub mod handle;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
