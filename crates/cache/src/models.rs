use crate::error::{Error, ErrorKind, Result};
use cartage_compress::Compression;
use cartage_resource::ResourceKind;
use derive_more::Display;
use exn::ResultExt;
use time::UtcDateTime;

/// Which half of a store an entry lives in.
///
/// The two partitions are keyed independently: the same URL may be both
/// cached and pinned.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Transient online cache, subject to size limits and LRU eviction.
    #[display("ambient")]
    Ambient,
    /// Downloaded for offline use; never evicted.
    #[display("pinned")]
    Pinned,
}
impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Ambient => "ambient",
            Partition::Pinned => "pinned",
        }
    }
}

/// One stored resource, exactly as the store keeps it.
///
/// `data` holds the payload encoded with `compression`; `size` is the
/// decoded payload size, which is what limits are measured against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: ResourceKind,
    pub data: Vec<u8>,
    pub compression: Compression,
    pub size: u64,
    pub expires: Option<UtcDateTime>,
    pub modified: Option<UtcDateTime>,
    pub etag: Option<String>,
    pub accessed: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub kind: String,
    pub data: Vec<u8>,
    pub compression: String,
    pub size: i64,
    pub expires: Option<i64>,
    pub modified: Option<i64>,
    pub etag: Option<String>,
    pub accessed: i64,
}
impl TryFrom<&Entry> for EntryRow {
    type Error = Error;
    fn try_from(entry: &Entry) -> Result<Self> {
        Ok(Self {
            kind: entry.kind.as_str().to_string(),
            data: entry.data.clone(),
            compression: entry.compression.as_str().to_string(),
            size: i64::try_from(entry.size).or_raise(|| ErrorKind::InvalidData("entry size"))?,
            expires: entry.expires.map(UtcDateTime::unix_timestamp),
            modified: entry.modified.map(UtcDateTime::unix_timestamp),
            etag: entry.etag.clone(),
            accessed: to_nanos(entry.accessed)?,
        })
    }
}
impl TryFrom<EntryRow> for Entry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self> {
        Ok(Self {
            kind: row.kind.parse::<ResourceKind>().or_raise(|| ErrorKind::InvalidData("resource kind"))?,
            data: row.data,
            compression: row.compression.parse::<Compression>().or_raise(|| ErrorKind::InvalidData("compression format"))?,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("entry size"))?,
            expires: row.expires.map(from_seconds).transpose()?,
            modified: row.modified.map(from_seconds).transpose()?,
            etag: row.etag,
            accessed: UtcDateTime::from_unix_timestamp_nanos(i128::from(row.accessed))
                .or_raise(|| ErrorKind::InvalidData("access time"))?,
        })
    }
}

pub(crate) fn to_nanos(time: UtcDateTime) -> Result<i64> {
    i64::try_from(time.unix_timestamp_nanos()).or_raise(|| ErrorKind::InvalidData("access time"))
}

fn from_seconds(seconds: i64) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(seconds).or_raise(|| ErrorKind::InvalidData("timestamp"))
}
