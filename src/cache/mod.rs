//! Local mirror of Jira state.
//!
//! The daemon keeps a [`Snapshot`] fresh on disk; interactive commands read
//! it through a [`CacheLayer`] and only go to the network when it is stale:
//! - [`FileStore`] persists the snapshot behind an advisory file lock
//! - [`Refresher`] fills every category concurrently
//! - [`CacheLayer`] answers single-category reads

mod layer;
mod refresh;
mod snapshot;
mod storage;

pub use layer::CacheLayer;
pub use refresh::Refresher;
pub use snapshot::Snapshot;
pub use storage::{FileStore, SnapshotRepository};

#[cfg(test)]
pub(crate) use snapshot::issue;
#[cfg(test)]
pub(crate) use storage::MemoryStore;
