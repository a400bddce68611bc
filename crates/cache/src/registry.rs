use crate::error::{ErrorKind, Result};
use crate::store::StoreHandle;
use crate::{Database, MemoryStore, SharedCache, SqliteStore};
use exn::ResultExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Cache path selecting a [`MemoryStore`] instead of a database file.
pub const IN_MEMORY: &str = ":memory:";

static SHARED: LazyLock<Arc<CacheRegistry>> = LazyLock::new(Arc::default);

/// Hands out at most one live [`SharedCache`] per path.
///
/// The registry only holds weak references: a cache lives exactly as long as
/// its longest-lived holder, and the next [`get`](Self::get) after the last
/// holder dropped it opens a fresh one. File paths are compared after
/// resolving their directory, so `cache.db` and `./cache.db` name the same
/// cache; [`IN_MEMORY`] is compared as is.
///
/// # Examples
///
/// ```
/// use cartage_cache::{CacheRegistry, IN_MEMORY};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = CacheRegistry::default();
/// let online = registry.get(IN_MEMORY).await?;
/// let offline = registry.get(IN_MEMORY).await?;
/// assert!(Arc::ptr_eq(&online, &offline));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CacheRegistry {
    caches: Mutex<HashMap<PathBuf, Weak<SharedCache>>>,
}

impl CacheRegistry {
    /// The registry of the whole process.
    pub fn shared() -> Arc<CacheRegistry> {
        SHARED.clone()
    }

    /// Acquire the cache for `path`, opening it if no holder is alive.
    ///
    /// Opening a file-backed cache creates missing parent directories and runs
    /// the database migrations.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn get(&self, path: impl AsRef<Path>) -> Result<Arc<SharedCache>> {
        let path = Self::resolve(path.as_ref()).await?;
        let mut caches = self.caches.lock().await;
        caches.retain(|_, cache| cache.strong_count() > 0);
        if let Some(cache) = caches.get(&path).and_then(Weak::upgrade) {
            return Ok(cache);
        }
        let cache = Arc::new(SharedCache::new(&path, Self::open(&path).await?));
        caches.insert(path, Arc::downgrade(&cache));
        debug!("Opened shared cache");
        Ok(cache)
    }

    /// Number of caches currently alive.
    pub async fn live(&self) -> usize {
        self.caches.lock().await.values().filter(|cache| cache.strong_count() > 0).count()
    }

    /// The key of `path`: its canonical directory joined with its file name.
    /// Missing directories are created on the way.
    async fn resolve(path: &Path) -> Result<PathBuf> {
        if path == Path::new(IN_MEMORY) {
            return Ok(path.to_path_buf());
        }
        let Some(name) = path.file_name() else {
            exn::bail!(ErrorKind::Location(path.to_path_buf()));
        };
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .or_raise(|| ErrorKind::Location(parent.to_path_buf()))?;
        let parent = tokio::fs::canonicalize(parent)
            .await
            .or_raise(|| ErrorKind::Location(parent.to_path_buf()))?;
        Ok(parent.join(name))
    }

    async fn open(path: &Path) -> Result<StoreHandle> {
        if path == Path::new(IN_MEMORY) {
            return Ok(Arc::new(MemoryStore::default()));
        }
        let db = Database::connect(path).await?;
        Ok(Arc::new(SqliteStore::from(&db)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartage_resource::{Resource, Response};

    #[tokio::test]
    async fn test_same_instance_per_path() {
        let registry = CacheRegistry::default();
        let a = registry.get(IN_MEMORY).await.unwrap();
        let b = registry.get(IN_MEMORY).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.live().await, 1);
    }

    #[tokio::test]
    async fn test_released_after_last_holder() {
        let registry = CacheRegistry::default();
        let resource = Resource::style("https://example.com/style.json");
        let first = registry.get(IN_MEMORY).await.unwrap();
        first.write(&resource, &Response::ok(b"{}".to_vec())).await.unwrap();
        let second = first.clone();
        drop(first);
        assert_eq!(registry.live().await, 1);
        drop(second);
        assert_eq!(registry.live().await, 0);
        // A fresh in-memory cache starts out empty.
        let reopened = registry.get(IN_MEMORY).await.unwrap();
        assert_eq!(reopened.read(&resource).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backed_cache_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested/dir/cache.db");
        let resource = Resource::style("https://example.com/style.json");
        let registry = CacheRegistry::default();
        let cache = registry.get(&path).await.unwrap();
        cache.write(&resource, &Response::ok(b"{}".to_vec())).await.unwrap();
        assert!(path.exists());
        drop(cache);
        let cache = registry.get(&path).await.unwrap();
        let cached = cache.read(&resource).await.unwrap().unwrap();
        assert_eq!(cached.bytes(), Some(b"{}".as_slice()));
    }

    #[tokio::test]
    async fn test_distinct_paths_are_distinct_caches() {
        let temp_dir = tempfile::tempdir().unwrap();
        let registry = CacheRegistry::default();
        let a = registry.get(temp_dir.path().join("a.db")).await.unwrap();
        let b = registry.get(temp_dir.path().join("b.db")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.live().await, 2);
    }

    #[tokio::test]
    async fn test_equivalent_paths_share_a_cache() {
        let temp_dir = tempfile::tempdir().unwrap();
        let registry = CacheRegistry::default();
        let plain = registry.get(temp_dir.path().join("cache.db")).await.unwrap();
        let dotted = registry.get(temp_dir.path().join("./cache.db")).await.unwrap();
        let detour = registry.get(temp_dir.path().join("nested/../cache.db")).await.unwrap();
        assert!(Arc::ptr_eq(&plain, &dotted));
        assert!(Arc::ptr_eq(&plain, &detour));
        assert_eq!(registry.live().await, 1);
    }

    #[tokio::test]
    async fn test_process_registry_is_a_singleton() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("shared.db");
        assert!(Arc::ptr_eq(&CacheRegistry::shared(), &CacheRegistry::shared()));
        let first = CacheRegistry::shared().get(&path).await.unwrap();
        let second = CacheRegistry::shared().get(&path).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
