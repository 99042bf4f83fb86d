/*!
Service and registry abstractions (ports) consumed by the snapshot manager.

Services are named, independently running components whose in-memory state can
be externally inspected and restored through a visitor. The manager never owns
services; it looks them up by name through a [`ServiceRegistry`] at the moment
an operation runs, so a service that is not currently running is simply
skipped.
*/

use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A named service whose state can be snapshotted and restored.
///
/// The state document methods are what the default snapshot visitors consume:
/// `export_state` pulls the service's in-memory state out as a JSON document,
/// `import_state` pushes a previously exported document back in. Services
/// with custom persistence needs bypass these entirely by registering a
/// [`crate::visitor::PersistencePlugin`].
///
/// The four lifecycle hooks are invoked around every load/save. Hook errors
/// are always swallowed by the caller; a broken hook never aborts the
/// operation it is attached to.
pub trait Service: Send + Sync {
    /// Unique name of this service.
    fn name(&self) -> &str;

    /// Export the service's current in-memory state as a JSON document.
    fn export_state(&self) -> Result<serde_json::Value>;

    /// Replace the service's in-memory state from a previously exported document.
    fn import_state(&self, state: serde_json::Value) -> Result<()>;

    /// Invoked immediately before this service's state is restored.
    fn on_before_state_load(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked after this service's state has been restored.
    fn on_after_state_load(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked immediately before this service's state is saved.
    fn on_before_state_save(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked after this service's state has been saved.
    fn on_after_state_save(&self) -> Result<()> {
        Ok(())
    }
}

/// Lookup of live services by name.
pub trait ServiceRegistry: Send + Sync {
    /// Return the running service with the given name, if any.
    fn get_service(&self, name: &str) -> Option<Arc<dyn Service>>;

    /// Return every currently running service.
    fn all_services(&self) -> Vec<Arc<dyn Service>>;
}

/// Simple map-backed registry.
///
/// Embedders register their services at startup and hand the registry to the
/// snapshot manager. Registration replaces any previous service with the same
/// name.
#[derive(Default)]
pub struct InMemoryRegistry {
    services: Mutex<HashMap<String, Arc<dyn Service>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under its own name.
    pub fn register(&self, service: Arc<dyn Service>) {
        let name = service.name().to_string();
        self.services.lock().unwrap().insert(name, service);
    }

    /// Remove a service from the registry, returning it if it was present.
    pub fn deregister(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.lock().unwrap().remove(name)
    }
}

impl ServiceRegistry for InMemoryRegistry {
    fn get_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.lock().unwrap().get(name).cloned()
    }

    fn all_services(&self) -> Vec<Arc<dyn Service>> {
        self.services.lock().unwrap().values().cloned().collect()
    }
}
