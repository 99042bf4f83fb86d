/*!
Persisted index of last-save timestamps per service.

One JSON object file in the data directory maps each service name to the unix
timestamp of its most recent save attempt. The file is rewritten in full on
every record; startup restoration iterates its entries to decide which
services have saved state worth loading.
*/

use crate::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the tracker file inside the data directory.
pub const TRACKER_FILE_NAME: &str = "last_saved.json";

/// Index of `service name -> last save unix timestamp`, mirrored to disk.
///
/// A name appears here iff a save was attempted for it at least once since
/// the file was created. The timestamp records the attempt, not its outcome.
#[derive(Debug)]
pub struct Tracker {
    path: PathBuf,
    entries: HashMap<String, i64>,
}

impl Tracker {
    /// Load the tracker from the data directory. A missing file is an empty
    /// tracker, not an error.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(TRACKER_FILE_NAME);
        let entries = if path.exists() {
            let raw = fs::read(&path)?;
            serde_json::from_slice(&raw)?
        } else {
            debug!(path = %path.display(), "no tracker file, starting empty");
            HashMap::new()
        };
        Ok(Self { path, entries })
    }

    /// Record a save attempt for the service and rewrite the backing file.
    ///
    /// The full map is written to a temp file and renamed into place, so an
    /// interrupted write leaves the previous file intact.
    pub fn record(&mut self, service_name: &str, timestamp: i64) -> Result<()> {
        self.entries.insert(service_name.to_string(), timestamp);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec(&self.entries)?)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Last save timestamp recorded for the service, if any.
    pub fn last_saved(&self, service_name: &str) -> Option<i64> {
        self.entries.get(service_name).copied()
    }

    /// Iterate every `(service name, timestamp)` pair. Restartable: each
    /// call produces a fresh iteration over the current entries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.entries.iter().map(|(name, ts)| (name.as_str(), *ts))
    }

    /// Number of services that have ever been saved.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
