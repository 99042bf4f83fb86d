/*!
# Keepsake Core Engine

Service-state snapshot and restore manager core library.

Keepsake mirrors the in-memory state of named, independently running services
to a local data directory and restores it at startup, while guaranteeing that
no two operations race on the same service's state:

- A snapshot manager orchestrating per-service load/save through pluggable
  state visitors, with failure-isolated lifecycle hooks
- A per-service lock set so concurrent requests to one service serialize
  while different services never block each other
- Three operating strategies: lazy load on first request, save after every
  mutating request, and periodic batched saves with dirty tracking

## Architecture

Persistence here is best-effort by design: a broken visitor or lifecycle hook
costs one service one operation and nothing else. Nothing in this crate
propagates an error into the request pipeline or the startup sequence.

All collaborators (service registry, plugin lookup) are injected at
construction; there are no process-wide singletons.

## Usage

```rust,no_run
use keepsake_core::{
    InMemoryRegistry, LoadOnRequestHandler, PersistenceConfig, SaveStateScheduler,
    ServiceLocks, SnapshotManager,
};
use std::sync::Arc;

let registry = Arc::new(InMemoryRegistry::new());
// ... register services ...

let config = PersistenceConfig::in_dir("/var/lib/keepsake");
let manager = Arc::new(SnapshotManager::new(&config, registry)?);

// Restore everything that was ever saved.
manager.load_all();

// Batched saves in the background.
let scheduler = SaveStateScheduler::new(Arc::clone(&manager), config.save_period());
scheduler.start();

// Lazy restore on first request.
let locks = Arc::new(ServiceLocks::new());
let load_hook = LoadOnRequestHandler::new(Arc::clone(&manager), locks);

// ... wire load_hook and scheduler into the request pipeline ...

scheduler.close();
# Ok::<(), keepsake_core::KeepsakeError>(())
```
*/

pub mod compression;
pub mod config;
pub mod error;
pub mod hooks;
pub mod locks;
pub mod manager;
pub mod metadata;
pub mod observability;
pub mod scheduler;
pub mod service;
pub mod tracker;
pub mod visitor;

pub use config::{CompressionChoice, PersistenceConfig};
pub use error::{KeepsakeError, Result};
pub use hooks::{LoadOnRequestHandler, Method, RequestContext, RequestHook, SaveOnRequestHandler};
pub use locks::{ServiceLock, ServiceLocks};
pub use manager::SnapshotManager;
pub use metadata::SnapshotMetadata;
pub use scheduler::SaveStateScheduler;
pub use service::{InMemoryRegistry, Service, ServiceRegistry};
pub use tracker::{Tracker, TRACKER_FILE_NAME};
pub use visitor::{
    read_snapshot, snapshot_path, LoadVisitor, PersistencePlugin, PluginLookup, SaveVisitor,
    VisitorFactory,
};
