/*!
Minimal wiring of the Keepsake subsystem: two services, startup restore,
request hooks and the background save scheduler.

Run with: `cargo run --example quickstart`
*/

use keepsake_core::{
    InMemoryRegistry, LoadOnRequestHandler, Method, PersistenceConfig, RequestContext,
    RequestHook, SaveStateScheduler, Service, ServiceLocks, SnapshotManager,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A toy service: a named counter whose value is its whole state.
struct CounterService {
    name: String,
    value: Mutex<i64>,
}

impl CounterService {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            value: Mutex::new(0),
        })
    }
}

impl Service for CounterService {
    fn name(&self) -> &str {
        &self.name
    }

    fn export_state(&self) -> keepsake_core::Result<serde_json::Value> {
        Ok(serde_json::json!({"value": *self.value.lock().unwrap()}))
    }

    fn import_state(&self, state: serde_json::Value) -> keepsake_core::Result<()> {
        *self.value.lock().unwrap() = state["value"].as_i64().unwrap_or(0);
        Ok(())
    }
}

fn main() -> Result<(), keepsake_core::KeepsakeError> {
    keepsake_core::observability::init_default_observability()?;

    let registry = Arc::new(InMemoryRegistry::new());
    let hits = CounterService::new("hits");
    let misses = CounterService::new("misses");
    registry.register(hits.clone());
    registry.register(misses.clone());

    let config = PersistenceConfig::in_dir("./keepsake-data")
        .with_save_period(Duration::from_secs(2));
    let manager = Arc::new(SnapshotManager::new(&config, registry)?);

    // Restore whatever a previous run saved.
    manager.load_all();
    println!("hits starts at {}", *hits.value.lock().unwrap());

    let locks = Arc::new(ServiceLocks::new());
    let load_hook = LoadOnRequestHandler::new(Arc::clone(&manager), locks);
    let scheduler = SaveStateScheduler::new(Arc::clone(&manager), config.save_period());
    scheduler.start();

    // Simulate a little request traffic.
    for i in 0..10 {
        let service = if i % 3 == 0 { "misses" } else { "hits" };
        let ctx = RequestContext::new(Method::Post, service);

        load_hook.on_request(&ctx);
        if service == "hits" {
            *hits.value.lock().unwrap() += 1;
        } else {
            *misses.value.lock().unwrap() += 1;
        }
        scheduler.on_request(&ctx);
    }

    // Flush and stop; the next run will restore these values.
    scheduler.close();
    println!(
        "saved: hits={} misses={}",
        *hits.value.lock().unwrap(),
        *misses.value.lock().unwrap()
    );
    Ok(())
}
