//! Raw keyed storage for resource entries.
//!
//! A [`PersistentStore`] knows nothing about limits or eviction policy; it
//! only stores [`Entry`] values by `(partition, url)` and answers the
//! bookkeeping queries [`SharedCache`](crate::SharedCache) needs to enforce
//! them.

mod memory;
mod sqlite;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;
use crate::error::Result;
use crate::models::{Entry, Partition};
use async_trait::async_trait;
use std::sync::Arc;
use time::UtcDateTime;

pub type StoreHandle = Arc<dyn PersistentStore + Send + Sync>;

/// Keyed storage of resource entries.
///
/// Every operation is scoped to a [`Partition`]. Implementations must make
/// [`put`](Self::put) atomic per key: a concurrent [`get`](Self::get) sees
/// either the previous entry or the new one, never a mix.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, partition: Partition, url: &str) -> Result<Option<Entry>>;

    /// Insert or replace the entry stored under `url`.
    async fn put(&self, partition: Partition, url: &str, entry: &Entry) -> Result<()>;

    /// Update the access time of an entry. Returns `false` if there was no
    /// such entry.
    async fn touch(&self, partition: Partition, url: &str, accessed: UtcDateTime) -> Result<bool>;

    /// Returns `false` if there was no such entry.
    async fn remove(&self, partition: Partition, url: &str) -> Result<bool>;

    /// Sum of the decoded payload sizes of every entry in the partition.
    async fn size(&self, partition: Partition) -> Result<u64>;

    async fn count(&self, partition: Partition) -> Result<u64>;

    /// Up to `limit` `(url, size)` pairs, least recently accessed first. Ties
    /// are broken by URL so the order is stable.
    async fn least_recently_used(&self, partition: Partition, limit: u32) -> Result<Vec<(String, u64)>>;
}
