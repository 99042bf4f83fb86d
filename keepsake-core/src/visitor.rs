/*!
State visitors and the factory that selects them.

A visitor is a strategy object that knows how to read or write one service's
state to or from the data directory. The [`VisitorFactory`] builds one per
operation: it first asks the optional plugin lookup for a service-specific
override, then falls back to the default snapshot-file visitors. The factory
never comes back empty-handed.

The default visitors write one file per service,
`<data_dir>/<service>.snapshot`: a compressed JSON container holding
[`SnapshotMetadata`] next to the exported state document, with a SHA-256
content hash verified on the way back in.
*/

use crate::compression::{decode_payload, CompressionAdapter, GzipCompressor, NoCompression};
use crate::config::CompressionChoice;
use crate::metadata::SnapshotMetadata;
use crate::service::Service;
use crate::{KeepsakeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Visitor that restores one service's state from the data directory.
pub trait LoadVisitor: Send + Sync {
    fn visit(&self, service: &dyn Service) -> Result<()>;
}

/// Visitor that writes one service's state into the data directory.
pub trait SaveVisitor: Send + Sync {
    fn visit(&self, service: &dyn Service) -> Result<()>;
}

/// Service-specific visitor override supplied by a plugin.
///
/// Either factory method may decline (return `None`), in which case the
/// default visitor is used for that operation.
pub trait PersistencePlugin: Send + Sync {
    fn create_load_visitor(
        &self,
        service_name: &str,
        data_dir: &Path,
    ) -> Option<Box<dyn LoadVisitor>>;

    fn create_save_visitor(
        &self,
        service_name: &str,
        data_dir: &Path,
    ) -> Option<Box<dyn SaveVisitor>>;
}

/// Optional lookup from service name to persistence plugin.
///
/// Plugin discovery itself lives outside this crate; the manager only needs
/// this one question answered per operation.
pub trait PluginLookup: Send + Sync {
    fn plugin_for(&self, service_name: &str) -> Option<Arc<dyn PersistencePlugin>>;
}

/// Builds the visitor for each load/save operation.
pub struct VisitorFactory {
    plugins: Option<Arc<dyn PluginLookup>>,
    compression: CompressionChoice,
}

impl VisitorFactory {
    /// Create a factory with no plugin overrides.
    pub fn new(compression: CompressionChoice) -> Self {
        Self {
            plugins: None,
            compression,
        }
    }

    /// Create a factory that consults the given plugin lookup first.
    pub fn with_plugins(compression: CompressionChoice, plugins: Arc<dyn PluginLookup>) -> Self {
        Self {
            plugins: Some(plugins),
            compression,
        }
    }

    /// Build the load visitor for a service. Always succeeds: a plugin may
    /// take over, otherwise the default snapshot-file visitor is returned.
    pub fn load_visitor(&self, service_name: &str, data_dir: &Path) -> Box<dyn LoadVisitor> {
        if let Some(plugin) = self.plugin_for(service_name) {
            if let Some(visitor) = plugin.create_load_visitor(service_name, data_dir) {
                debug!(service = service_name, "using plugin load visitor");
                return visitor;
            }
        }
        Box::new(SnapshotFileLoadVisitor::new(service_name, data_dir))
    }

    /// Build the save visitor for a service; same fallback contract as
    /// [`VisitorFactory::load_visitor`].
    pub fn save_visitor(&self, service_name: &str, data_dir: &Path) -> Box<dyn SaveVisitor> {
        if let Some(plugin) = self.plugin_for(service_name) {
            if let Some(visitor) = plugin.create_save_visitor(service_name, data_dir) {
                debug!(service = service_name, "using plugin save visitor");
                return visitor;
            }
        }
        Box::new(SnapshotFileSaveVisitor::new(
            service_name,
            data_dir,
            self.compression,
        ))
    }

    fn plugin_for(&self, service_name: &str) -> Option<Arc<dyn PersistencePlugin>> {
        self.plugins.as_ref()?.plugin_for(service_name)
    }
}

/// Container for the complete snapshot file (metadata + state document)
#[derive(Serialize, Deserialize, Debug)]
struct SnapshotContainer {
    metadata: SnapshotMetadata,
    state: serde_json::Value,
}

/// Path of the snapshot file for a service inside the data directory.
pub fn snapshot_path(data_dir: &Path, service_name: &str) -> PathBuf {
    data_dir.join(format!("{service_name}.snapshot"))
}

/// Read a snapshot file, returning its metadata and state document.
///
/// Verifies the format version and the content hash before returning.
pub fn read_snapshot(path: &Path) -> Result<(SnapshotMetadata, serde_json::Value)> {
    let raw = fs::read(path)?;
    let payload = decode_payload(&raw)?;

    let container: SnapshotContainer = serde_json::from_slice(&payload)?;

    if !container.metadata.is_compatible() {
        return Err(KeepsakeError::invalid_format(format!(
            "Incompatible snapshot format version: {} (current: {})",
            container.metadata.format_version,
            crate::metadata::METADATA_FORMAT_VERSION
        )));
    }

    // The hash covers the normalized state document, not the container.
    let state_json = serde_json::to_string(&container.state)?;
    container.metadata.verify_integrity(state_json.as_bytes())?;

    Ok((container.metadata, container.state))
}

/// Default save visitor: one compressed snapshot file per service.
pub struct SnapshotFileSaveVisitor {
    service_name: String,
    path: PathBuf,
    compressor: Box<dyn CompressionAdapter>,
}

impl SnapshotFileSaveVisitor {
    pub fn new(service_name: &str, data_dir: &Path, compression: CompressionChoice) -> Self {
        let compressor: Box<dyn CompressionAdapter> = match compression {
            CompressionChoice::Gzip => Box::new(GzipCompressor::new()),
            CompressionChoice::None => Box::new(NoCompression::new()),
        };
        Self {
            service_name: service_name.to_string(),
            path: snapshot_path(data_dir, service_name),
            compressor,
        }
    }
}

impl SaveVisitor for SnapshotFileSaveVisitor {
    fn visit(&self, service: &dyn Service) -> Result<()> {
        let state = service.export_state()?;

        // Normalize the document so the hash is stable across save/load cycles.
        let state_json = serde_json::to_string(&state)?;

        let metadata = SnapshotMetadata::new(&self.service_name)
            .with_content_hash(state_json.as_bytes())
            .with_compression_algorithm(self.compressor.algorithm_name());
        metadata.validate()?;

        let container = SnapshotContainer { metadata, state };
        let container_json = serde_json::to_string(&container)?;
        let payload = self.compressor.compress(container_json.as_bytes())?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename: an interrupted save leaves the previous snapshot intact.
        let tmp_path = self.path.with_extension("snapshot.tmp");
        fs::write(&tmp_path, &payload)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            service = self.service_name.as_str(),
            bytes = payload.len(),
            "snapshot written"
        );
        #[cfg(feature = "metrics")]
        crate::observability::KeepsakeMetrics::global().record_snapshot_size(payload.len());
        Ok(())
    }
}

/// Default load visitor: restores a service from its snapshot file.
///
/// An absent snapshot file is not an error; the service simply keeps the
/// default state its own constructor established.
pub struct SnapshotFileLoadVisitor {
    service_name: String,
    path: PathBuf,
}

impl SnapshotFileLoadVisitor {
    pub fn new(service_name: &str, data_dir: &Path) -> Self {
        Self {
            service_name: service_name.to_string(),
            path: snapshot_path(data_dir, service_name),
        }
    }
}

impl LoadVisitor for SnapshotFileLoadVisitor {
    fn visit(&self, service: &dyn Service) -> Result<()> {
        if !self.path.exists() {
            debug!(
                service = self.service_name.as_str(),
                "no snapshot on disk, nothing to restore"
            );
            return Ok(());
        }

        let (metadata, state) = read_snapshot(&self.path)?;
        if metadata.service_name != self.service_name {
            return Err(KeepsakeError::invalid_format(format!(
                "Snapshot belongs to service '{}', expected '{}'",
                metadata.service_name, self.service_name
            )));
        }

        service.import_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MemoryService {
        name: String,
        state: Mutex<serde_json::Value>,
    }

    impl MemoryService {
        fn new(name: &str, state: serde_json::Value) -> Self {
            Self {
                name: name.to_string(),
                state: Mutex::new(state),
            }
        }
    }

    impl Service for MemoryService {
        fn name(&self) -> &str {
            &self.name
        }

        fn export_state(&self) -> Result<serde_json::Value> {
            Ok(self.state.lock().unwrap().clone())
        }

        fn import_state(&self, state: serde_json::Value) -> Result<()> {
            *self.state.lock().unwrap() = state;
            Ok(())
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let state = serde_json::json!({
            "sessions": [{"id": "s-1", "open": true}],
            "counter": 17,
        });
        let service = MemoryService::new("gateway", state.clone());

        let save = SnapshotFileSaveVisitor::new("gateway", temp_dir.path(), CompressionChoice::Gzip);
        save.visit(&service).unwrap();

        let restored = MemoryService::new("gateway", serde_json::json!(null));
        let load = SnapshotFileLoadVisitor::new("gateway", temp_dir.path());
        load.visit(&restored).unwrap();

        assert_eq!(restored.export_state().unwrap(), state);
    }

    #[test]
    fn test_load_without_snapshot_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let service = MemoryService::new("gateway", serde_json::json!({"fresh": true}));

        let load = SnapshotFileLoadVisitor::new("gateway", temp_dir.path());
        load.visit(&service).unwrap();

        assert_eq!(
            service.export_state().unwrap(),
            serde_json::json!({"fresh": true})
        );
    }

    #[test]
    fn test_uncompressed_snapshot_reads_back() {
        let temp_dir = TempDir::new().unwrap();
        let service = MemoryService::new("plain", serde_json::json!({"n": 1}));

        let save = SnapshotFileSaveVisitor::new("plain", temp_dir.path(), CompressionChoice::None);
        save.visit(&service).unwrap();

        let (metadata, state) = read_snapshot(&snapshot_path(temp_dir.path(), "plain")).unwrap();
        assert_eq!(metadata.compression_algorithm, "none");
        assert_eq!(state, serde_json::json!({"n": 1}));
    }

    #[test]
    fn test_corrupt_snapshot_fails_integrity() {
        let temp_dir = TempDir::new().unwrap();
        let service = MemoryService::new("fragile", serde_json::json!({"n": 1}));

        let save =
            SnapshotFileSaveVisitor::new("fragile", temp_dir.path(), CompressionChoice::None);
        save.visit(&service).unwrap();

        let path = snapshot_path(temp_dir.path(), "fragile");
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replace("\"n\":1", "\"n\":2")).unwrap();

        let result = read_snapshot(&path);
        assert!(matches!(
            result,
            Err(KeepsakeError::IntegrityCheckFailed { .. })
        ));
    }

    #[test]
    fn test_load_rejects_foreign_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let service = MemoryService::new("alpha", serde_json::json!({}));

        let save = SnapshotFileSaveVisitor::new("alpha", temp_dir.path(), CompressionChoice::Gzip);
        save.visit(&service).unwrap();

        // Pretend beta's snapshot file is alpha's.
        fs::rename(
            snapshot_path(temp_dir.path(), "alpha"),
            snapshot_path(temp_dir.path(), "beta"),
        )
        .unwrap();

        let load = SnapshotFileLoadVisitor::new("beta", temp_dir.path());
        assert!(load.visit(&service).is_err());
    }

    struct FixedPlugin;

    struct NullSaveVisitor;

    impl SaveVisitor for NullSaveVisitor {
        fn visit(&self, _service: &dyn Service) -> Result<()> {
            Ok(())
        }
    }

    impl PersistencePlugin for FixedPlugin {
        fn create_load_visitor(
            &self,
            _service_name: &str,
            _data_dir: &Path,
        ) -> Option<Box<dyn LoadVisitor>> {
            None
        }

        fn create_save_visitor(
            &self,
            _service_name: &str,
            _data_dir: &Path,
        ) -> Option<Box<dyn SaveVisitor>> {
            Some(Box::new(NullSaveVisitor))
        }
    }

    struct OnlyFor(&'static str);

    impl PluginLookup for OnlyFor {
        fn plugin_for(&self, service_name: &str) -> Option<Arc<dyn PersistencePlugin>> {
            (service_name == self.0).then(|| Arc::new(FixedPlugin) as Arc<dyn PersistencePlugin>)
        }
    }

    #[test]
    fn test_factory_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let factory =
            VisitorFactory::with_plugins(CompressionChoice::Gzip, Arc::new(OnlyFor("special")));

        // Plugin declines load visitors, so even "special" gets the default.
        let service = MemoryService::new("special", serde_json::json!({"v": 1}));
        factory
            .load_visitor("special", temp_dir.path())
            .visit(&service)
            .unwrap();

        // Plugin save visitor writes nothing to disk.
        factory
            .save_visitor("special", temp_dir.path())
            .visit(&service)
            .unwrap();
        assert!(!snapshot_path(temp_dir.path(), "special").exists());

        // Unclaimed services get the default save visitor.
        let plain = MemoryService::new("plain", serde_json::json!({"v": 2}));
        factory
            .save_visitor("plain", temp_dir.path())
            .visit(&plain)
            .unwrap();
        assert!(snapshot_path(temp_dir.path(), "plain").exists());
    }
}
