/*!
Compression adapters for snapshot payloads.

The default snapshot visitors compress their payloads before writing them to
the data directory. Gzip is the default; `NoCompression` exists for debugging
a data directory with a text editor and for tests.
*/

use crate::{KeepsakeError, Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

/// Magic bytes at the start of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression abstraction for snapshot payloads
pub trait CompressionAdapter: Send + Sync {
    /// Compress the input data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the input data
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of the compression algorithm
    fn algorithm_name(&self) -> &str;
}

/// Gzip compression adapter
///
/// Uses the DEFLATE algorithm (gzip) to compress snapshot payloads. Provides
/// a good balance of compression ratio and speed for JSON state documents.
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    compression_level: Compression,
}

impl GzipCompressor {
    /// Create a new gzip compressor with the default compression level (6)
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Create a new gzip compressor with the specified compression level
    ///
    /// # Arguments
    /// * `level` - Compression level (0-9, where 0 is no compression and 9 is maximum)
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.compression_level);

        encoder.write_all(data).map_err(|e| {
            KeepsakeError::compression(format!("Failed to write data for compression: {e}"))
        })?;

        encoder
            .finish()
            .map_err(|e| KeepsakeError::compression(format!("Failed to finish compression: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| KeepsakeError::compression(format!("Failed to decompress data: {e}")))?;

        Ok(decompressed)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// No-compression adapter
///
/// Passes payloads through unchanged. Snapshot files written with this
/// adapter are plain JSON on disk.
#[derive(Debug, Clone)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoCompression {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}

/// Decode a snapshot payload regardless of which adapter wrote it.
///
/// Gzip streams are recognized by their magic bytes; anything else is
/// returned as-is. This lets a data directory written with one compression
/// setting be read back after the setting changes.
pub fn decode_payload(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.starts_with(&GZIP_MAGIC) {
        GzipCompressor::new().decompress(bytes)
    } else {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_compression_roundtrip() {
        let compressor = GzipCompressor::new();
        let original_data =
            b"This is some state data that should compress well because it repeats. ".repeat(10);

        let compressed = compressor.compress(&original_data).unwrap();
        assert!(compressed.len() < original_data.len());

        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(original_data, decompressed);
    }

    #[test]
    fn test_no_compression() {
        let compressor = NoCompression::new();
        let test_data = b"test data";

        let compressed = compressor.compress(test_data).unwrap();
        assert_eq!(compressed, test_data);

        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(decompressed, test_data);

        assert_eq!(compressor.algorithm_name(), "none");
    }

    #[test]
    fn test_decode_payload_sniffs_gzip() {
        let data = b"some service state";
        let gz = GzipCompressor::new().compress(data).unwrap();

        assert_eq!(decode_payload(&gz).unwrap(), data);
        assert_eq!(decode_payload(data).unwrap(), data);
    }

    #[test]
    fn test_gzip_invalid_compressed_data() {
        let compressor = GzipCompressor::new();
        let invalid_data = [0x1f, 0x8b, 0xff, 0xff, 0xff];

        assert!(compressor.decompress(&invalid_data).is_err());
    }
}
