/*!
Per-service locks.

Two locking granularities live here and must not be conflated: the map mutex
guards only lock-handle creation (a short, highly-contended check), while each
[`ServiceLock`] is held for the full duration of a load or a mutating request
(a long, service-scoped hold). Different services never block each other.

Locks are reentrant for the owning thread, so a request handler that acquired
a service's lock in its request hook can run further locked sections on the
same thread without deadlocking itself.
*/

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use tracing::warn;

/// Lazily-populated map from service name to its lock.
///
/// Exactly one [`ServiceLock`] instance exists per name for the lifetime of
/// the process; `handle` is an atomic get-or-create.
#[derive(Default)]
pub struct ServiceLocks {
    inner: Mutex<HashMap<String, Arc<ServiceLock>>>,
}

impl ServiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for a service, creating it on first access.
    pub fn handle(&self, service_name: &str) -> Arc<ServiceLock> {
        let mut map = self.inner.lock().unwrap();
        match map.get(service_name) {
            Some(lock) => Arc::clone(lock),
            None => {
                let lock = Arc::new(ServiceLock::new());
                map.insert(service_name.to_string(), Arc::clone(&lock));
                lock
            }
        }
    }

    /// Number of services that have a lock instance.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[derive(Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: u32,
}

/// A mutex scoped to one service name, reentrant for the owning thread.
///
/// Supports both scoped holds ([`ServiceLock::lock`], released when the guard
/// drops) and explicit [`ServiceLock::acquire`]/[`ServiceLock::release`]
/// pairs for holds that span a request/response hook pair.
#[derive(Default)]
pub struct ServiceLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ServiceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until this thread holds the lock. Reentrant: a thread that
    /// already owns the lock acquires it again immediately.
    pub fn acquire(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => {
                    state = self.released.wait(state).unwrap();
                }
            }
        }
    }

    /// Release one level of the hold. The lock becomes free for other
    /// threads once the depth reaches zero.
    pub fn release(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        if state.owner != Some(me) {
            warn!("service lock released by a thread that does not own it");
            return;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }

    /// Acquire the lock for the current scope; released when the guard drops.
    pub fn lock(&self) -> ServiceLockGuard<'_> {
        self.acquire();
        ServiceLockGuard { lock: self }
    }

    /// Whether any thread currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.state.lock().unwrap().owner.is_some()
    }
}

/// RAII guard for a scoped [`ServiceLock`] hold.
pub struct ServiceLockGuard<'a> {
    lock: &'a ServiceLock,
}

impl Drop for ServiceLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_handle_returns_same_lock() {
        let locks = ServiceLocks::new();
        let a = locks.handle("alpha");
        let b = locks.handle("alpha");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_services_get_different_locks() {
        let locks = ServiceLocks::new();
        let a = locks.handle("alpha");
        let b = locks.handle("beta");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_reentrant_acquire() {
        let lock = ServiceLock::new();
        lock.acquire();
        lock.acquire();
        assert!(lock.is_held());
        lock.release();
        assert!(lock.is_held());
        lock.release();
        assert!(!lock.is_held());
    }

    #[test]
    fn test_release_by_non_owner_is_ignored() {
        let lock = Arc::new(ServiceLock::new());
        lock.acquire();

        let other = Arc::clone(&lock);
        thread::spawn(move || other.release()).join().unwrap();

        assert!(lock.is_held());
        lock.release();
    }

    #[test]
    fn test_lock_serializes_threads() {
        let lock = Arc::new(ServiceLock::new());
        let active = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let active = Arc::clone(&active);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _g = lock.lock();
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(50));
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(!lock.is_held());
    }

    #[test]
    fn test_concurrent_handle_creation() {
        let locks = Arc::new(ServiceLocks::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                thread::spawn(move || locks.handle("shared"))
            })
            .collect();

        let created: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for lock in &created[1..] {
            assert!(Arc::ptr_eq(&created[0], lock));
        }
        assert_eq!(locks.len(), 1);
    }
}
