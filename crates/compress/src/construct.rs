use crate::Compression;
use crate::error::{Error, ErrorKind};
use std::str::FromStr;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

impl FromStr for Compression {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gz" | "gzip" => Ok(Compression::Gzip),
            "zst" | "zstd" => Ok(Compression::Zstd),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}

impl Compression {
    /// Detect a compression format from magic bytes.
    ///
    /// Returns [`None`](Option::None) if no magic bytes match or if the input
    /// is too short to detect any format.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&GZIP_MAGIC) {
            return Some(Compression::Gzip);
        }
        if bytes.starts_with(&ZSTD_MAGIC) {
            return Some(Compression::Zstd);
        }
        None
    }
}
