/*!
Snapshot orchestration.

[`SnapshotManager`] decides how one service's state gets saved or loaded: it
builds the right visitor, finds the live service, wraps the operation in the
service's lifecycle hooks, and keeps the tracker current. Persistence is
best-effort by contract: no failure in here ever propagates to the request
pipeline or the startup sequence. A broken visitor or hook costs that one
service one operation, nothing more.
*/

use crate::config::PersistenceConfig;
use crate::service::ServiceRegistry;
use crate::tracker::Tracker;
use crate::visitor::{PluginLookup, VisitorFactory};
use crate::Result;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Orchestrates load/save of service state.
///
/// All collaborators are injected at construction; the manager holds no
/// process-global state. The tracker is owned exclusively by the manager.
pub struct SnapshotManager {
    registry: Arc<dyn ServiceRegistry>,
    visitors: VisitorFactory,
    data_dir: PathBuf,
    tracker: Mutex<Tracker>,
}

impl SnapshotManager {
    /// Create a manager with no plugin overrides.
    pub fn new(config: &PersistenceConfig, registry: Arc<dyn ServiceRegistry>) -> Result<Self> {
        Self::build(config, registry, VisitorFactory::new(config.compression))
    }

    /// Create a manager whose visitor factory consults a plugin lookup first.
    pub fn with_plugins(
        config: &PersistenceConfig,
        registry: Arc<dyn ServiceRegistry>,
        plugins: Arc<dyn PluginLookup>,
    ) -> Result<Self> {
        Self::build(
            config,
            registry,
            VisitorFactory::with_plugins(config.compression, plugins),
        )
    }

    fn build(
        config: &PersistenceConfig,
        registry: Arc<dyn ServiceRegistry>,
        visitors: VisitorFactory,
    ) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let tracker = Tracker::load(&config.data_dir)?;
        Ok(Self {
            registry,
            visitors,
            data_dir: config.data_dir.clone(),
            tracker: Mutex::new(tracker),
        })
    }

    /// Restore one service's state from the data directory.
    ///
    /// A service that is not currently running is skipped. A failing visitor
    /// is logged and the load aborts for this service only; the after-load
    /// hook does not run in that case.
    pub fn load(&self, service_name: &str) {
        let visitor = self.visitors.load_visitor(service_name, &self.data_dir);

        let Some(service) = self.registry.get_service(service_name) else {
            debug!(service = service_name, "not running, nothing to load");
            return;
        };

        #[cfg(feature = "metrics")]
        crate::observability::KeepsakeMetrics::global().record_load();

        try_call(service_name, "on_before_state_load", || {
            service.on_before_state_load()
        });

        if let Err(e) = visitor.visit(service.as_ref()) {
            error!(service = service_name, error = %e, "failed to load state");
            #[cfg(feature = "metrics")]
            crate::observability::KeepsakeMetrics::global().record_load_failure();
            return;
        }

        try_call(service_name, "on_after_state_load", || {
            service.on_after_state_load()
        });
    }

    /// Save one service's state into the data directory.
    ///
    /// The tracker records the attempt before the visitor runs, so a
    /// persistently failing service does not get retried by every future
    /// flush as if it had never been saved. A failing visitor is logged and
    /// swallowed; the after-save hook still runs.
    pub fn save(&self, service_name: &str) {
        let visitor = self.visitors.save_visitor(service_name, &self.data_dir);

        let now = Utc::now().timestamp();
        if let Err(e) = self.tracker.lock().unwrap().record(service_name, now) {
            warn!(service = service_name, error = %e, "failed to update tracker");
        }

        let Some(service) = self.registry.get_service(service_name) else {
            debug!(service = service_name, "not running, nothing to save");
            return;
        };

        #[cfg(feature = "metrics")]
        crate::observability::KeepsakeMetrics::global().record_save();

        try_call(service_name, "on_before_state_save", || {
            service.on_before_state_save()
        });

        if let Err(e) = visitor.visit(service.as_ref()) {
            error!(service = service_name, error = %e, "failed to save state");
            #[cfg(feature = "metrics")]
            crate::observability::KeepsakeMetrics::global().record_save_failure();
        }

        try_call(service_name, "on_after_state_save", || {
            service.on_after_state_save()
        });
    }

    /// Save every currently-registered live service.
    pub fn save_all(&self) {
        for service in self.registry.all_services() {
            self.save(service.name());
        }
    }

    /// Restore every service the tracker has ever seen a save for.
    ///
    /// Services that were never saved keep the default state their own
    /// constructors establish.
    pub fn load_all(&self) {
        let names: Vec<String> = self
            .tracker
            .lock()
            .unwrap()
            .entries()
            .map(|(name, _)| name.to_string())
            .collect();

        for name in names {
            self.load(&name);
        }
    }

    /// Unix timestamp of the last save attempt for a service, if any.
    pub fn last_saved(&self, service_name: &str) -> Option<i64> {
        self.tracker.lock().unwrap().last_saved(service_name)
    }

    /// The data directory this manager persists into.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Invoke a lifecycle hook, swallowing any error.
///
/// A bug in a hook must never abort the save/load it is attached to; the
/// failure rates at most a debug note.
fn try_call(service_name: &str, hook: &str, f: impl FnOnce() -> Result<()>) {
    if let Err(e) = f() {
        debug!(service = service_name, hook, error = %e, "lifecycle hook failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{InMemoryRegistry, Service};
    use crate::KeepsakeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct HookCounts {
        before_save: AtomicUsize,
        after_save: AtomicUsize,
        before_load: AtomicUsize,
        after_load: AtomicUsize,
    }

    struct TestService {
        name: String,
        state: Mutex<serde_json::Value>,
        hooks: Arc<HookCounts>,
        fail_export: bool,
        fail_hooks: bool,
    }

    impl TestService {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                state: Mutex::new(serde_json::json!({"name": name})),
                hooks: Arc::new(HookCounts::default()),
                fail_export: false,
                fail_hooks: false,
            }
        }

        fn failing_export(name: &str) -> Self {
            Self {
                fail_export: true,
                ..Self::new(name)
            }
        }

        fn failing_hooks(name: &str) -> Self {
            Self {
                fail_hooks: true,
                ..Self::new(name)
            }
        }
    }

    impl Service for TestService {
        fn name(&self) -> &str {
            &self.name
        }

        fn export_state(&self) -> Result<serde_json::Value> {
            if self.fail_export {
                return Err(KeepsakeError::visitor(&self.name, "export failed"));
            }
            Ok(self.state.lock().unwrap().clone())
        }

        fn import_state(&self, state: serde_json::Value) -> Result<()> {
            *self.state.lock().unwrap() = state;
            Ok(())
        }

        fn on_before_state_save(&self) -> Result<()> {
            self.hooks.before_save.fetch_add(1, Ordering::SeqCst);
            if self.fail_hooks {
                return Err(KeepsakeError::validation("hook bug"));
            }
            Ok(())
        }

        fn on_after_state_save(&self) -> Result<()> {
            self.hooks.after_save.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_before_state_load(&self) -> Result<()> {
            self.hooks.before_load.fetch_add(1, Ordering::SeqCst);
            if self.fail_hooks {
                return Err(KeepsakeError::validation("hook bug"));
            }
            Ok(())
        }

        fn on_after_state_load(&self) -> Result<()> {
            self.hooks.after_load.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager_with(
        temp_dir: &TempDir,
        services: Vec<TestService>,
    ) -> (SnapshotManager, Arc<InMemoryRegistry>) {
        let registry = Arc::new(InMemoryRegistry::new());
        for service in services {
            registry.register(Arc::new(service));
        }
        let config = PersistenceConfig::in_dir(temp_dir.path());
        let manager = SnapshotManager::new(&config, registry.clone()).unwrap();
        (manager, registry)
    }

    #[test]
    fn test_save_records_tracker_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager_with(&temp_dir, vec![TestService::new("alpha")]);

        let before = Utc::now().timestamp();
        manager.save("alpha");

        let recorded = manager.last_saved("alpha").unwrap();
        assert!(recorded >= before);
    }

    #[test]
    fn test_save_missing_service_still_tracked() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager_with(&temp_dir, vec![]);

        manager.save("ghost");

        // The attempt is recorded even though no service was running.
        assert!(manager.last_saved("ghost").is_some());
        assert!(!crate::visitor::snapshot_path(temp_dir.path(), "ghost").exists());
    }

    #[test]
    fn test_load_missing_service_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager_with(&temp_dir, vec![]);

        manager.load("ghost");
    }

    #[test]
    fn test_failed_save_records_tracker_and_runs_after_hook() {
        let temp_dir = TempDir::new().unwrap();
        let service = TestService::failing_export("broken");
        let hooks = service.hooks.clone();
        let (manager, _) = manager_with(&temp_dir, vec![service]);

        manager.save("broken");

        assert!(manager.last_saved("broken").is_some());
        assert_eq!(hooks.before_save.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.after_save.load(Ordering::SeqCst), 1);
        assert!(!crate::visitor::snapshot_path(temp_dir.path(), "broken").exists());
    }

    #[test]
    fn test_hook_failure_does_not_block_save() {
        let temp_dir = TempDir::new().unwrap();
        let service = TestService::failing_hooks("grumpy");
        let (manager, _) = manager_with(&temp_dir, vec![service]);

        manager.save("grumpy");

        assert!(manager.last_saved("grumpy").is_some());
        assert!(crate::visitor::snapshot_path(temp_dir.path(), "grumpy").exists());
    }

    #[test]
    fn test_save_all_covers_every_live_service() {
        let temp_dir = TempDir::new().unwrap();
        let (manager, _) = manager_with(
            &temp_dir,
            vec![TestService::new("alpha"), TestService::new("beta")],
        );

        manager.save_all();

        assert!(manager.last_saved("alpha").is_some());
        assert!(manager.last_saved("beta").is_some());
    }

    #[test]
    fn test_load_all_restores_only_saved_services() {
        let temp_dir = TempDir::new().unwrap();

        {
            let (manager, _) = manager_with(&temp_dir, vec![TestService::new("alpha")]);
            manager.save_all();
        }

        // Fresh manager over the same data dir, both services running.
        let alpha = TestService::new("alpha");
        alpha
            .import_state(serde_json::json!({"name": "scrambled"}))
            .unwrap();
        let beta = TestService::new("beta");
        let beta_hooks = beta.hooks.clone();
        let (manager, registry) = manager_with(&temp_dir, vec![alpha, beta]);

        manager.load_all();

        let alpha = registry.get_service("alpha").unwrap();
        assert_eq!(
            alpha.export_state().unwrap(),
            serde_json::json!({"name": "alpha"})
        );
        // beta was never saved, so no load was attempted for it.
        assert_eq!(beta_hooks.before_load.load(Ordering::SeqCst), 0);
    }

    mockall::mock! {
        Registry {}

        impl ServiceRegistry for Registry {
            fn get_service(&self, name: &str) -> Option<Arc<dyn Service>>;
            fn all_services(&self) -> Vec<Arc<dyn Service>>;
        }
    }

    #[test]
    fn test_load_consults_registry_and_tolerates_absence() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry.expect_get_service().times(1).returning(|_| None);
        let config = PersistenceConfig::in_dir(temp_dir.path());
        let manager = SnapshotManager::new(&config, Arc::new(registry)).unwrap();

        manager.load("ghost");
    }

    #[test]
    fn test_save_all_queries_live_services() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = MockRegistry::new();
        registry
            .expect_all_services()
            .times(1)
            .returning(Vec::new);
        let config = PersistenceConfig::in_dir(temp_dir.path());
        let manager = SnapshotManager::new(&config, Arc::new(registry)).unwrap();

        manager.save_all();
        assert!(manager.last_saved("anything").is_none());
    }

    #[test]
    fn test_load_all_with_missing_tracker_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let service = TestService::new("alpha");
        let hooks = service.hooks.clone();
        let (manager, _) = manager_with(&temp_dir, vec![service]);

        manager.load_all();

        assert_eq!(hooks.before_load.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.after_load.load(Ordering::SeqCst), 0);
    }
}
