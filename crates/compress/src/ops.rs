//! Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::GzDecoder, write::GzEncoder};
use std::io::{Read, Write};
use tracing::instrument;
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

// Cache writes happen on the request path, so favour speed over ratio. The
// default levels are a good middle ground for small JSON and PBF payloads.
const GZIP_LEVEL: GzCompression = GzCompression::new(6);
const ZSTD_LEVEL: i32 = 3;

impl Compression {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use cartage_compress::Compression;
    ///
    /// let data = br#"{"version":8,"sources":{},"layers":[]}"#;
    /// let compressed = Compression::Gzip.compress(data).unwrap();
    /// assert_eq!(Compression::detect(&compressed), Some(Compression::Gzip));
    /// ```
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.compress_into(input, &mut output)?;
        Ok(output)
    }

    /// Decompress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cartage_compress::Compression;
    ///
    /// let original = b"Hello, world!";
    /// let compressed = Compression::Gzip.compress(original).unwrap();
    /// assert_ne!(compressed, original);
    /// let decompressed = Compression::Gzip.decompress(&compressed).unwrap();
    /// assert_eq!(decompressed, original);
    /// ```
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decompress_into(input, &mut output)?;
        Ok(output)
    }

    #[instrument(level = "trace", skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn compress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(&mut *output, GZIP_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
            Compression::Zstd => {
                let mut encoder = ZstdEncoder::new(&mut *output, ZSTD_LEVEL).or_raise(|| ErrorKind::Encoder)?;
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }

    #[instrument(level = "trace", skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn decompress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(input);
                decoder.read_to_end(output).or_raise(|| ErrorKind::InvalidData)?
            },
            Compression::Zstd => {
                let mut decoder = ZstdDecoder::new(input).or_raise(|| ErrorKind::Encoder)?;
                decoder.read_to_end(output).or_raise(|| ErrorKind::InvalidData)?
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Zstd)]
    fn test_compress_then_decompress(#[case] format: Compression) {
        let glyphs = vec![0x1a_u8; 4096];
        let compressed = format.compress(&glyphs).unwrap();
        assert_eq!(format.decompress(&compressed).unwrap(), glyphs);
    }

    #[test]
    fn test_gzip_shrinks_repetitive_input() {
        let style = br#"{"layers":[{"id":"water"},{"id":"water"},{"id":"water"},{"id":"water"}]}"#.repeat(16);
        let compressed = Compression::Gzip.compress(&style).unwrap();
        assert!(compressed.len() < style.len());
    }

    #[test]
    fn test_decompress_garbage_is_invalid_data() {
        let err = Compression::Gzip.decompress(&[0x1f, 0x8b, 0x00, 0x01, 0x02]).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
    }
}
