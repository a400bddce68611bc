//! Persistent resource cache.
//!
//! This crate provides the storage layer behind the online and offline file
//! sources. Entries are stored per URL in one of two partitions:
//!
//! - **Ambient**: the transient online cache. Governed by a total size limit
//!   and evicted least-recently-used first.
//! - **Pinned**: resources downloaded for offline use. Never evicted.
//!
//! # Architecture
//! A [`PersistentStore`] is the raw keyed store ([`SqliteStore`] on disk,
//! [`MemoryStore`] in memory). A [`SharedCache`] wraps one store and adds the
//! policy: size limits, eviction, compression and conversion to and from
//! [`Response`](cartage_resource::Response). A [`CacheRegistry`] hands out at
//! most one live [`SharedCache`] per path, so every source pointed at the same
//! database shares the same limits and bookkeeping.

mod db;
pub mod error;
mod models;
mod registry;
mod shared;
mod store;

pub use crate::db::Database;
pub use crate::models::{Entry, Partition};
pub use crate::registry::{CacheRegistry, IN_MEMORY};
pub use crate::shared::{DEFAULT_COMPRESSION, DEFAULT_MAXIMUM_ENTRY_SIZE, DEFAULT_MAXIMUM_SIZE, SharedCache};
pub use crate::store::{MemoryStore, PersistentStore, SqliteStore, StoreHandle};
