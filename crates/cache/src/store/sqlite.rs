use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Entry, EntryRow, Partition, to_nanos};
use crate::store::PersistentStore;
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::instrument;

/// [`PersistentStore`] backed by the `resources` table of a SQLite database.
///
/// Each [`put`](PersistentStore::put) runs in its own transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}
impl From<&Database> for SqliteStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn count_to_u64(value: i64, what: &'static str) -> Result<u64> {
        u64::try_from(value).or_raise(|| ErrorKind::InvalidData(what))
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get(&self, partition: Partition, url: &str) -> Result<Option<Entry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../../queries/get_entry.sql"))
            .bind(partition.as_str())
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Entry::try_from).transpose()
    }

    #[instrument(level = "debug", skip(self, entry), fields(size = entry.size))]
    async fn put(&self, partition: Partition, url: &str, entry: &Entry) -> Result<()> {
        let row = EntryRow::try_from(entry)?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../../queries/upsert_entry.sql"))
            .bind(partition.as_str())
            .bind(url)
            .bind(row.kind)
            .bind(row.data)
            .bind(row.compression)
            .bind(row.size)
            .bind(row.expires)
            .bind(row.modified)
            .bind(row.etag)
            .bind(row.accessed)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn touch(&self, partition: Partition, url: &str, accessed: UtcDateTime) -> Result<bool> {
        let result = sqlx::query(include_str!("../../queries/touch_entry.sql"))
            .bind(partition.as_str())
            .bind(url)
            .bind(to_nanos(accessed)?)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, partition: Partition, url: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../../queries/delete_entry.sql"))
            .bind(partition.as_str())
            .bind(url)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn size(&self, partition: Partition) -> Result<u64> {
        let (size,): (i64,) = sqlx::query_as(include_str!("../../queries/partition_size.sql"))
            .bind(partition.as_str())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::count_to_u64(size, "partition size")
    }

    async fn count(&self, partition: Partition) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(include_str!("../../queries/partition_count.sql"))
            .bind(partition.as_str())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::count_to_u64(count, "entry count")
    }

    async fn least_recently_used(&self, partition: Partition, limit: u32) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(include_str!("../../queries/least_recently_used.sql"))
            .bind(partition.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter()
            .map(|(url, size)| Ok((url, Self::count_to_u64(size, "entry size")?)))
            .collect()
    }
}
