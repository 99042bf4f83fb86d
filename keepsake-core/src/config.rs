//! Configuration module for the persistence manager
//!
//! This module provides the configuration structure shared by the snapshot
//! manager, the default visitors and the save scheduler: where state lives on
//! disk, how often the scheduler flushes, and how snapshot payloads are
//! compressed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_save_period_secs() -> u64 {
    30
}

/// Enumeration of supported snapshot payload compressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompressionChoice {
    /// Gzip-compressed JSON payloads (default)
    #[default]
    Gzip,
    /// Plain JSON payloads
    None,
}

/// Configuration structure for the persistence manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the tracker file and all service snapshots
    pub data_dir: PathBuf,
    /// Scheduler flush period in seconds
    #[serde(default = "default_save_period_secs")]
    pub save_period_secs: u64,
    /// Compression applied by the default snapshot visitors
    #[serde(default)]
    pub compression: CompressionChoice,
}

impl PersistenceConfig {
    /// Create a configuration rooted at the given data directory, with the
    /// default flush period and compression.
    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        PersistenceConfig {
            data_dir: data_dir.as_ref().to_path_buf(),
            save_period_secs: default_save_period_secs(),
            compression: CompressionChoice::default(),
        }
    }

    /// Set the scheduler flush period
    pub fn with_save_period(mut self, period: Duration) -> Self {
        self.save_period_secs = period.as_secs();
        self
    }

    /// Set the compression applied by the default snapshot visitors
    pub fn with_compression(mut self, compression: CompressionChoice) -> Self {
        self.compression = compression;
        self
    }

    /// Scheduler flush period as a [`Duration`]
    pub fn save_period(&self) -> Duration {
        Duration::from_secs(self.save_period_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(crate::KeepsakeError::validation(
                "data_dir must not be empty",
            ));
        }
        if self.save_period_secs == 0 {
            return Err(crate::KeepsakeError::validation(
                "save_period_secs must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_dir_defaults() {
        let config = PersistenceConfig::in_dir("/var/lib/keepsake");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/keepsake"));
        assert_eq!(config.save_period_secs, 30);
        assert_eq!(config.compression, CompressionChoice::Gzip);
    }

    #[test]
    fn test_with_save_period() {
        let config =
            PersistenceConfig::in_dir("/tmp/state").with_save_period(Duration::from_secs(5));
        assert_eq!(config.save_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_empty_dir() {
        let config = PersistenceConfig::in_dir("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_period() {
        let config =
            PersistenceConfig::in_dir("/tmp/state").with_save_period(Duration::from_secs(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let config: PersistenceConfig =
            serde_json::from_str(r#"{"data_dir": "/tmp/state"}"#).unwrap();
        assert_eq!(config.save_period_secs, 30);
        assert_eq!(config.compression, CompressionChoice::Gzip);
    }
}
