//! Compression and decompression of persisted resource blobs.
//!
//! Cached styles, source documents and glyph ranges compress well; tiles and
//! sprite images usually arrive already compressed. This crate wraps the
//! codecs behind a single [`Compression`] enum providing:
//!
//! - **Format detection** from leading magic bytes ([`Compression::detect`])
//! - **In-memory** compression/decompression ([`Compression::compress`],
//!   [`Compression::decompress`])
//! - **Stable names** for storing the format next to the data
//!   ([`Compression::as_str`] / [`FromStr`](std::str::FromStr))
//!
//! Which codec new blobs use is a cache setting; blobs already stored keep
//! the codec they were written with.

mod construct;
pub mod error;
mod ops;
mod util;

use serde::{Deserialize, Serialize};

/// A supported compression format.
///
/// Defaults to [`None`](Self::None) (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Gzip compression
    Gzip,
    /// Zstd compression
    Zstd,
}
