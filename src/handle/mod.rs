//! repository handles
//!
//! A handle is the stack of store layers used to read one repository:
//!
//! ```text
//! RepositoryHandle   shared, immutable, one per owner/name
//!        │
//!   DedupStore       concurrent loads of one hash share a request
//!        │
//!   RefCachedStore   last known refs, used when the remote is unreachable
//!        │
//!   CachedStore      immutable objects kept in the cache namespace
//!        │
//!   remote           GithubStore or GitStore, from a RemoteConnector
//! ```

mod builder;
mod cache;
mod cached;
mod connector;
mod dedup;
mod ref_cache;
mod registry;
mod repository;

pub use builder::HandleBuilder;
pub use cache::{CacheNamespace, CacheRoot};
pub use cached::CachedStore;
pub use connector::{GithubConnector, LocalConnector, RemoteConnector};
pub use dedup::DedupStore;
pub use ref_cache::RefCachedStore;
pub use registry::Registry;
pub use repository::RepositoryHandle;
