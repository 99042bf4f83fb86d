/*!
Periodic batched saves.

[`SaveStateScheduler`] accumulates dirty service names and flushes them
through the snapshot manager on a fixed period, trading save freshness for
request latency: marking a service dirty is a set insert, never disk I/O.
One dedicated worker thread does the flushing; `close()` stops it and flushes
once more so nothing marked dirty is lost at shutdown.
*/

use crate::hooks::{RequestContext, RequestHook};
use crate::manager::SnapshotManager;
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

struct SchedulerShared {
    manager: Arc<SnapshotManager>,
    period: Duration,
    /// Marker lock: guards only the dirty set, never held across saves.
    dirty: Mutex<HashSet<String>>,
    stop: Mutex<bool>,
    wake: Condvar,
}

impl SchedulerShared {
    /// Drain the dirty set and save each drained name.
    ///
    /// The swap-and-clear is atomic with respect to `schedule_for_save`: a
    /// name marked during the drain lands either in this batch or in the
    /// next one, never both, never neither. Saves run outside the marker
    /// lock so marking stays non-blocking during slow disk I/O.
    fn flush(&self) -> usize {
        let batch: Vec<String> = {
            let mut dirty = self.dirty.lock().unwrap();
            dirty.drain().collect()
        };

        if batch.is_empty() {
            return 0;
        }

        let started = Instant::now();
        for name in &batch {
            self.manager.save(name);
        }
        let elapsed = started.elapsed();

        info!(
            services = batch.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "flushed scheduled saves"
        );
        #[cfg(feature = "metrics")]
        crate::observability::KeepsakeMetrics::global().record_flush(batch.len(), elapsed);

        batch.len()
    }
}

/// Background scheduler that batches service saves.
///
/// Start it once, mark services dirty from any thread, and `close()` before
/// process exit. Dropping the scheduler closes it as a safety net.
pub struct SaveStateScheduler {
    shared: Arc<SchedulerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SaveStateScheduler {
    pub fn new(manager: Arc<SnapshotManager>, period: Duration) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                manager,
                period,
                dirty: Mutex::new(HashSet::new()),
                stop: Mutex::new(false),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Mark a service's state as changed since the last flush.
    ///
    /// Non-blocking and idempotent; safe to call from request threads.
    pub fn schedule_for_save(&self, service_name: &str) {
        let mut dirty = self.shared.dirty.lock().unwrap();
        if dirty.insert(service_name.to_string()) {
            debug!(service = service_name, "scheduled for next save cycle");
        }
    }

    /// Number of services waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.shared.dirty.lock().unwrap().len()
    }

    /// Launch the background worker thread.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            warn!("save scheduler already started");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("keepsake-scheduler".into())
            .spawn(move || {
                let mut stopped = shared.stop.lock().unwrap();
                loop {
                    // Re-check before waiting: close() may have raced a flush.
                    if *stopped {
                        break;
                    }
                    let (guard, timeout) = shared
                        .wake
                        .wait_timeout(stopped, shared.period)
                        .unwrap();
                    stopped = guard;
                    if *stopped {
                        break;
                    }
                    if timeout.timed_out() {
                        drop(stopped);
                        shared.flush();
                        stopped = shared.stop.lock().unwrap();
                    }
                }
            })
            .expect("failed to spawn scheduler thread");
        *worker = Some(handle);
        info!(period_secs = self.shared.period.as_secs(), "save scheduler started");
    }

    /// Stop the worker and flush whatever is still dirty.
    ///
    /// Synchronous: the worker thread has exited and the final flush has
    /// completed before this returns. Idempotent.
    pub fn close(&self) {
        {
            let mut stopped = self.shared.stop.lock().unwrap();
            *stopped = true;
        }
        self.shared.wake.notify_all();

        if let Some(handle) = self.worker.lock().unwrap().take() {
            if handle.join().is_err() {
                warn!("save scheduler worker panicked");
            }
        }

        let flushed = self.shared.flush();
        if flushed > 0 {
            debug!(services = flushed, "final flush on close");
        }
    }
}

impl Drop for SaveStateScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

impl RequestHook for SaveStateScheduler {
    /// Mark the request's service dirty without blocking the request.
    fn on_request(&self, ctx: &RequestContext) {
        if let Some(name) = ctx.service.as_deref() {
            self.schedule_for_save(name);
        }
    }
}
