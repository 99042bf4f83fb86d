/*!
Snapshot metadata management and schema definition.
*/

use crate::{KeepsakeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Current metadata format version for compatibility tracking
pub const METADATA_FORMAT_VERSION: u8 = 1;

/// Metadata stored alongside each service snapshot, providing traceability
/// and integrity verification
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnapshotMetadata {
    /// Name of the service this snapshot belongs to
    pub service_name: String,

    /// ISO 8601 timestamp when the snapshot was created
    pub timestamp: DateTime<Utc>,

    /// SHA-256 hash of the state payload for integrity verification
    pub content_hash: String,

    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// Unique identifier for this specific snapshot
    pub snapshot_id: String,

    /// Optional human-readable description
    pub description: Option<String>,

    /// Size of the uncompressed state document in bytes
    pub uncompressed_size: usize,

    /// Size of the compressed snapshot file in bytes
    pub compressed_size: Option<usize>,

    /// Compression algorithm used
    pub compression_algorithm: String,
}

impl SnapshotMetadata {
    /// Create new snapshot metadata for the named service
    pub fn new<S: Into<String>>(service_name: S) -> Self {
        Self {
            service_name: service_name.into(),
            timestamp: Utc::now(),
            content_hash: String::new(), // Set when computing the hash
            format_version: METADATA_FORMAT_VERSION,
            snapshot_id: Uuid::new_v4().to_string(),
            description: None,
            uncompressed_size: 0,
            compressed_size: None,
            compression_algorithm: "gzip".to_string(),
        }
    }

    /// Set optional description for the snapshot
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the content hash from the serialized state document
    ///
    /// # Arguments
    /// * `state_bytes` - The serialized state document as bytes
    ///
    /// # Returns
    /// Updated metadata with computed hash and uncompressed size
    pub fn with_content_hash(mut self, state_bytes: &[u8]) -> Self {
        self.content_hash = Self::compute_hash(state_bytes);
        self.uncompressed_size = state_bytes.len();
        self
    }

    /// Set the compressed size after compression
    pub fn with_compressed_size(mut self, compressed_size: usize) -> Self {
        self.compressed_size = Some(compressed_size);
        self
    }

    /// Set the compression algorithm
    pub fn with_compression_algorithm<S: Into<String>>(mut self, algorithm: S) -> Self {
        self.compression_algorithm = algorithm.into();
        self
    }

    /// Compute SHA-256 hash of the provided data
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Verify that the provided data matches the stored content hash
    ///
    /// # Errors
    /// * `KeepsakeError::IntegrityCheckFailed` - If the hashes don't match
    pub fn verify_integrity(&self, data: &[u8]) -> Result<()> {
        let actual = Self::compute_hash(data);
        if actual != self.content_hash {
            return Err(KeepsakeError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Check whether this metadata was written by a compatible format version
    pub fn is_compatible(&self) -> bool {
        self.format_version <= METADATA_FORMAT_VERSION
    }

    /// Validate that all required fields are populated
    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(KeepsakeError::validation("service_name must not be empty"));
        }
        if self.content_hash.is_empty() {
            return Err(KeepsakeError::validation("content_hash must not be empty"));
        }
        if self.snapshot_id.is_empty() {
            return Err(KeepsakeError::validation("snapshot_id must not be empty"));
        }
        Ok(())
    }
}
