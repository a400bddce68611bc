//! Cache policy on top of a [`PersistentStore`].

use crate::error::{ErrorKind, Result};
use crate::models::{Entry, Partition, to_nanos};
use crate::store::StoreHandle;
use cartage_compress::Compression;
use cartage_resource::{Resource, Response};
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use time::UtcDateTime;
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};

/// Default limit on the total size of the ambient partition (50 MiB).
pub const DEFAULT_MAXIMUM_SIZE: u64 = 50 * 1024 * 1024;
/// Default limit on a single ambient entry (5 MiB).
pub const DEFAULT_MAXIMUM_ENTRY_SIZE: u64 = 5 * 1024 * 1024;
/// Default codec of newly stored blobs.
pub const DEFAULT_COMPRESSION: Compression = Compression::Gzip;

const EVICTION_BATCH: u32 = 64;
// Codec framing costs more than it saves on tiny payloads.
const MIN_COMPRESSIBLE_SIZE: usize = 128;
const PNG_MAGIC: &[u8] = b"\x89PNG";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

/// A persistent resource cache shared by every source pointed at the same
/// path.
///
/// Obtained from a [`CacheRegistry`](crate::CacheRegistry). Owns the two
/// limits of the ambient partition:
///
/// - **Maximum size**: after every write the least-recently-used entries are
///   evicted until the partition fits again. The entry just written goes
///   last, so an entry larger than the whole cache does not survive its own
///   write.
/// - **Maximum entry size**: larger writes are rejected with
///   [`EntryTooLarge`](ErrorKind::EntryTooLarge) and leave the store
///   untouched.
///
/// Pinned entries are accounted separately and never evicted. They have their
/// own, optional, per-entry limit.
///
/// Compressible payloads are stored with the configured [`Compression`].
/// Payloads that are small or already compressed are stored as they are.
pub struct SharedCache {
    path: PathBuf,
    store: StoreHandle,
    maximum_size: AtomicU64,
    maximum_entry_size: AtomicU64,
    /// `u64::MAX` when unlimited.
    maximum_pinned_entry_size: AtomicU64,
    compression: RwLock<Compression>,
    /// Last access stamp handed out, in unix nanoseconds.
    last_access: AtomicI64,
    /// Serializes write-then-evict sequences.
    writes: Mutex<()>,
}

impl Debug for SharedCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SharedCache")
            .field("path", &self.path)
            .field("maximum_size", &self.maximum_size())
            .field("maximum_entry_size", &self.maximum_entry_size())
            .field("compression", &self.compression())
            .finish_non_exhaustive()
    }
}

impl SharedCache {
    pub fn new(path: impl Into<PathBuf>, store: StoreHandle) -> Self {
        Self {
            path: path.into(),
            store,
            maximum_size: AtomicU64::new(DEFAULT_MAXIMUM_SIZE),
            maximum_entry_size: AtomicU64::new(DEFAULT_MAXIMUM_ENTRY_SIZE),
            maximum_pinned_entry_size: AtomicU64::new(u64::MAX),
            compression: RwLock::new(DEFAULT_COMPRESSION),
            last_access: AtomicI64::new(0),
            writes: Mutex::new(()),
        }
    }

    /// Path this cache was opened with (or [`IN_MEMORY`](crate::IN_MEMORY)).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn maximum_size(&self) -> u64 {
        self.maximum_size.load(Ordering::Relaxed)
    }

    /// Takes effect from the next write.
    pub fn set_maximum_size(&self, size: u64) {
        self.maximum_size.store(size, Ordering::Relaxed);
    }

    pub fn maximum_entry_size(&self) -> u64 {
        self.maximum_entry_size.load(Ordering::Relaxed)
    }

    pub fn set_maximum_entry_size(&self, size: u64) {
        self.maximum_entry_size.store(size, Ordering::Relaxed);
    }

    pub fn set_maximum_pinned_entry_size(&self, size: Option<u64>) {
        self.maximum_pinned_entry_size.store(size.unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    pub fn compression(&self) -> Compression {
        *self.compression.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Codec for blobs written from now on. [`Compression::None`] stores
    /// everything uncompressed.
    pub fn set_compression(&self, compression: Compression) {
        *self.compression.write().unwrap_or_else(PoisonError::into_inner) = compression;
    }

    /// Total decoded size of the ambient partition.
    pub async fn size(&self) -> Result<u64> {
        self.store.size(Partition::Ambient).await
    }

    /// Look up a cached response, marking it as recently used.
    ///
    /// Expired entries are returned as they are: the caller can see `expires`
    /// in the past and revalidate using the entry's validators.
    #[instrument(level = "trace", skip_all, fields(url = %resource.url()))]
    pub async fn read(&self, resource: &Resource) -> Result<Option<Response>> {
        let Some(entry) = self.store.get(Partition::Ambient, resource.url()).await? else {
            return Ok(None);
        };
        self.store.touch(Partition::Ambient, resource.url(), self.next_access()).await?;
        Ok(Some(Self::decode(entry)?))
    }

    /// Store a successful response, then evict until the cache fits.
    ///
    /// Error and not-modified responses are ignored.
    #[instrument(level = "debug", skip_all, fields(url = %resource.url(), kind = %resource.kind()))]
    pub async fn write(&self, resource: &Resource, response: &Response) -> Result<()> {
        let Some(data) = Self::storable(response) else {
            trace!("Not caching unsuccessful response");
            return Ok(());
        };
        Self::check_entry_size(data, self.maximum_entry_size())?;
        let entry = self.encode(resource, response, data)?;
        let _guard = self.writes.lock().await;
        self.store.put(Partition::Ambient, resource.url(), &entry).await?;
        self.evict(resource.url()).await
    }

    /// Apply a successful revalidation to an existing entry.
    ///
    /// The validators and expiry present on `revalidation` replace the stored
    /// ones; the payload is kept. Returns the refreshed cached response, or
    /// `None` if the entry has meanwhile disappeared.
    #[instrument(level = "debug", skip_all, fields(url = %resource.url()))]
    pub async fn refresh(&self, resource: &Resource, revalidation: &Response) -> Result<Option<Response>> {
        let _guard = self.writes.lock().await;
        let Some(mut entry) = self.store.get(Partition::Ambient, resource.url()).await? else {
            return Ok(None);
        };
        if let Some(expires) = revalidation.expires {
            entry.expires = Some(expires);
        }
        if let Some(modified) = revalidation.modified {
            entry.modified = Some(modified);
        }
        if let Some(etag) = &revalidation.etag {
            entry.etag = Some(etag.clone());
        }
        entry.accessed = self.next_access();
        self.store.put(Partition::Ambient, resource.url(), &entry).await?;
        Ok(Some(Self::decode(entry)?))
    }

    /// Store a successful response in the pinned partition.
    ///
    /// Pinned entries are exempt from eviction; only the pinned per-entry
    /// limit applies.
    #[instrument(level = "debug", skip_all, fields(url = %resource.url(), kind = %resource.kind()))]
    pub async fn pin(&self, resource: &Resource, response: &Response) -> Result<()> {
        let Some(data) = Self::storable(response) else {
            trace!("Not pinning unsuccessful response");
            return Ok(());
        };
        Self::check_entry_size(data, self.maximum_pinned_entry_size.load(Ordering::Relaxed))?;
        let entry = self.encode(resource, response, data)?;
        self.store.put(Partition::Pinned, resource.url(), &entry).await
    }

    pub async fn read_pinned(&self, resource: &Resource) -> Result<Option<Response>> {
        self.store
            .get(Partition::Pinned, resource.url())
            .await?
            .map(Self::decode)
            .transpose()
    }

    pub async fn contains_pinned(&self, resource: &Resource) -> Result<bool> {
        Ok(self.store.get(Partition::Pinned, resource.url()).await?.is_some())
    }

    pub async fn pinned_count(&self) -> Result<u64> {
        self.store.count(Partition::Pinned).await
    }

    fn storable(response: &Response) -> Option<&[u8]> {
        match response.is_error() || response.not_modified {
            true => None,
            false => response.bytes(),
        }
    }

    fn check_entry_size(data: &[u8], maximum: u64) -> Result<()> {
        let size = data.len() as u64;
        if size > maximum {
            exn::bail!(ErrorKind::EntryTooLarge { size, maximum });
        }
        Ok(())
    }

    /// Evict least-recently-used ambient entries until the partition fits,
    /// leaving `keep` for last.
    async fn evict(&self, keep: &str) -> Result<()> {
        let maximum = self.maximum_size();
        let mut size = self.store.size(Partition::Ambient).await?;
        while size > maximum {
            let candidates: Vec<_> = self
                .store
                .least_recently_used(Partition::Ambient, EVICTION_BATCH)
                .await?
                .into_iter()
                .filter(|(url, _)| url != keep)
                .collect();
            if candidates.is_empty() {
                if self.store.remove(Partition::Ambient, keep).await? {
                    debug!(url = keep, maximum, "Evicted entry larger than the whole cache");
                }
                return Ok(());
            }
            for (url, entry_size) in candidates {
                if size <= maximum {
                    break;
                }
                if self.store.remove(Partition::Ambient, &url).await? {
                    size = size.saturating_sub(entry_size);
                    debug!(url = %url, size = entry_size, "Evicted cache entry");
                }
            }
        }
        Ok(())
    }

    fn encode(&self, resource: &Resource, response: &Response, data: &[u8]) -> Result<Entry> {
        let compression = match is_compressible(data) {
            true => self.compression(),
            false => Compression::None,
        };
        Ok(Entry {
            kind: resource.kind(),
            data: compression.compress(data).or_raise(|| ErrorKind::Compression)?,
            compression,
            size: data.len() as u64,
            expires: response.expires,
            modified: response.modified,
            etag: response.etag.clone(),
            accessed: self.next_access(),
        })
    }

    fn decode(entry: Entry) -> Result<Response> {
        let data = match entry.compression {
            Compression::None => entry.data,
            codec => codec.decompress(&entry.data).or_raise(|| ErrorKind::Compression)?,
        };
        Ok(Response {
            data: Some(Arc::new(data)),
            expires: entry.expires,
            modified: entry.modified,
            etag: entry.etag,
            ..Response::default()
        })
    }

    /// Strictly increasing access stamps, so that LRU order is exact even
    /// when the clock does not advance between two accesses.
    fn next_access(&self) -> UtcDateTime {
        let now = UtcDateTime::now();
        let Ok(now_nanos) = to_nanos(now) else {
            return now;
        };
        let previous = self
            .last_access
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now_nanos.max(last + 1)))
            .unwrap_or(now_nanos);
        let stamp = now_nanos.max(previous + 1);
        UtcDateTime::from_unix_timestamp_nanos(i128::from(stamp)).unwrap_or(now)
    }
}

/// Whether compressing `data` is worth it. Tiles and sprite images usually
/// arrive compressed already.
fn is_compressible(data: &[u8]) -> bool {
    let is_webp = data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP";
    data.len() >= MIN_COMPRESSIBLE_SIZE
        && Compression::detect(data).is_none()
        && !data.starts_with(PNG_MAGIC)
        && !data.starts_with(JPEG_MAGIC)
        && !is_webp
}
