use crate::error::Result;
use crate::models::{Entry, Partition};
use crate::store::PersistentStore;
use async_trait::async_trait;
use std::collections::HashMap;
use time::UtcDateTime;
use tokio::sync::RwLock;

/// [`PersistentStore`] kept entirely in memory.
///
/// Used for the `":memory:"` cache path and in tests. Contents are lost when
/// the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(Partition, String), Entry>>,
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, partition: Partition, url: &str) -> Result<Option<Entry>> {
        Ok(self.entries.read().await.get(&(partition, url.to_string())).cloned())
    }

    async fn put(&self, partition: Partition, url: &str, entry: &Entry) -> Result<()> {
        self.entries.write().await.insert((partition, url.to_string()), entry.clone());
        Ok(())
    }

    async fn touch(&self, partition: Partition, url: &str, accessed: UtcDateTime) -> Result<bool> {
        Ok(match self.entries.write().await.get_mut(&(partition, url.to_string())) {
            Some(entry) => {
                entry.accessed = accessed;
                true
            },
            None => false,
        })
    }

    async fn remove(&self, partition: Partition, url: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(&(partition, url.to_string())).is_some())
    }

    async fn size(&self, partition: Partition) -> Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|((p, _), _)| *p == partition).map(|(_, e)| e.size).sum())
    }

    async fn count(&self, partition: Partition) -> Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries.keys().filter(|(p, _)| *p == partition).count() as u64)
    }

    async fn least_recently_used(&self, partition: Partition, limit: u32) -> Result<Vec<(String, u64)>> {
        let entries = self.entries.read().await;
        let mut candidates: Vec<_> = entries
            .iter()
            .filter(|((p, _), _)| *p == partition)
            .map(|((_, url), entry)| (entry.accessed, url.clone(), entry.size))
            .collect();
        candidates.sort();
        Ok(candidates
            .into_iter()
            .take(limit as usize)
            .map(|(_, url, size)| (url, size))
            .collect())
    }
}
