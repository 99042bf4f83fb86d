/*!
Request-pipeline hooks.

An external router drives these: [`RequestHook::on_request`] before a request
is handled, [`RequestHook::on_response`] after the response is produced. Two
persistence strategies hang off that pair:

- [`LoadOnRequestHandler`] restores a service's state the first time any
  request targets it, exactly once per process.
- [`SaveOnRequestHandler`] serializes mutating requests per service and saves
  after each one completes. High save freshness, paid for in request latency;
  [`crate::scheduler::SaveStateScheduler`] is the batched alternative.
*/

use crate::locks::ServiceLocks;
use crate::manager::SnapshotManager;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// HTTP-style request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Whether requests with this method may change service state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Method::Post | Method::Put | Method::Patch | Method::Delete
        )
    }
}

impl FromStr for Method {
    type Err = crate::KeepsakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(crate::KeepsakeError::validation(format!(
                "Unknown request method: {other}"
            ))),
        }
    }
}

/// What the request pipeline tells a hook about one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Name of the service this request targets, if any.
    pub service: Option<String>,
    /// Request method.
    pub method: Method,
}

impl RequestContext {
    pub fn new<S: Into<String>>(method: Method, service: S) -> Self {
        Self {
            service: Some(service.into()),
            method,
        }
    }

    /// A request that targets no particular service.
    pub fn unrouted(method: Method) -> Self {
        Self {
            service: None,
            method,
        }
    }
}

/// Hook point pair exposed to the external request pipeline.
///
/// `on_request` and `on_response` for one request are invoked on the same
/// thread, in that order.
pub trait RequestHook: Send + Sync {
    fn on_request(&self, ctx: &RequestContext);

    fn on_response(&self, _ctx: &RequestContext) {}
}

/// Restores a service's state on the first request that targets it.
///
/// Per service the state machine is one-way: not-yet-restored -> restored,
/// never reset. Requests after the first pass through without taking the
/// per-service lock.
pub struct LoadOnRequestHandler {
    manager: Arc<SnapshotManager>,
    locks: Arc<ServiceLocks>,
    restored: RwLock<HashSet<String>>,
}

impl LoadOnRequestHandler {
    pub fn new(manager: Arc<SnapshotManager>, locks: Arc<ServiceLocks>) -> Self {
        Self {
            manager,
            locks,
            restored: RwLock::new(HashSet::new()),
        }
    }

    /// Whether the one-time load for a service has completed.
    pub fn is_restored(&self, service_name: &str) -> bool {
        self.restored.read().unwrap().contains(service_name)
    }
}

impl RequestHook for LoadOnRequestHandler {
    fn on_request(&self, ctx: &RequestContext) {
        let Some(name) = ctx.service.as_deref() else {
            return;
        };

        // Fast path: already restored, no per-service lock taken.
        if self.restored.read().unwrap().contains(name) {
            return;
        }

        let lock = self.locks.handle(name);
        let _guard = lock.lock();

        // Re-check under the lock: several requests may race to be first.
        if self.restored.read().unwrap().contains(name) {
            return;
        }

        debug!(service = name, "first request, restoring state");
        self.manager.load(name);
        self.restored.write().unwrap().insert(name.to_string());
    }
}

/// Serializes mutating requests per service and saves after each one.
///
/// `on_request` acquires and holds the service's lock for the lifetime of a
/// mutating request; `on_response` saves under that hold, then releases.
/// The two calls must pair: the pipeline invokes both on the request's
/// thread or neither.
pub struct SaveOnRequestHandler {
    manager: Arc<SnapshotManager>,
    locks: Arc<ServiceLocks>,
}

impl SaveOnRequestHandler {
    pub fn new(manager: Arc<SnapshotManager>, locks: Arc<ServiceLocks>) -> Self {
        Self { manager, locks }
    }

    fn target<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        if !ctx.method.is_mutating() {
            return None;
        }
        ctx.service.as_deref()
    }
}

impl RequestHook for SaveOnRequestHandler {
    fn on_request(&self, ctx: &RequestContext) {
        if let Some(name) = self.target(ctx) {
            self.locks.handle(name).acquire();
        }
    }

    fn on_response(&self, ctx: &RequestContext) {
        if let Some(name) = self.target(ctx) {
            self.manager.save(name);
            self.locks.handle(name).release();
        }
    }
}
