/*!
Observability infrastructure for the Keepsake system.

This module provides structured logging/tracing setup and, behind the
`metrics` feature, Prometheus instrumentation for save/load operations and
scheduler flushes.
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{KeepsakeError, Result};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<KeepsakeMetrics> = OnceLock::new();

/// Metrics collection for Keepsake operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct KeepsakeMetrics {
    // Snapshot operation metrics
    pub saves_total: Counter,
    pub save_failures_total: Counter,
    pub loads_total: Counter,
    pub load_failures_total: Counter,

    // Scheduler metrics
    pub flush_batch_size: Histogram,
    pub flush_duration_seconds: Histogram,

    // Snapshot payload metrics
    pub snapshot_size_bytes: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
impl KeepsakeMetrics {
    /// Initialize new metrics instance
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_total = Counter::new(
            "keepsake_saves_total",
            "Total service state saves attempted by Keepsake",
        )
        .map_err(|e| KeepsakeError::validation(format!("Failed to create saves_total: {e}")))?;

        let save_failures_total = Counter::new(
            "keepsake_save_failures_total",
            "Total service state saves that failed in Keepsake",
        )
        .map_err(|e| {
            KeepsakeError::validation(format!("Failed to create save_failures_total: {e}"))
        })?;

        let loads_total = Counter::new(
            "keepsake_loads_total",
            "Total service state loads attempted by Keepsake",
        )
        .map_err(|e| KeepsakeError::validation(format!("Failed to create loads_total: {e}")))?;

        let load_failures_total = Counter::new(
            "keepsake_load_failures_total",
            "Total service state loads that failed in Keepsake",
        )
        .map_err(|e| {
            KeepsakeError::validation(format!("Failed to create load_failures_total: {e}"))
        })?;

        let flush_batch_size = Histogram::with_opts(prometheus::HistogramOpts::new(
            "keepsake_flush_batch_size",
            "Number of services saved per scheduler flush",
        ))
        .map_err(|e| KeepsakeError::validation(format!("Failed to create flush_batch_size: {e}")))?;

        let flush_duration_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "keepsake_flush_duration_seconds",
            "Duration of scheduler flushes in seconds",
        ))
        .map_err(|e| {
            KeepsakeError::validation(format!("Failed to create flush_duration_seconds: {e}"))
        })?;

        let snapshot_size_bytes = Histogram::with_opts(prometheus::HistogramOpts::new(
            "keepsake_snapshot_size_bytes",
            "Size of written snapshot files in bytes",
        ))
        .map_err(|e| {
            KeepsakeError::validation(format!("Failed to create snapshot_size_bytes: {e}"))
        })?;

        for collector in [
            Box::new(saves_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(save_failures_total.clone()),
            Box::new(loads_total.clone()),
            Box::new(load_failures_total.clone()),
            Box::new(flush_batch_size.clone()),
            Box::new(flush_duration_seconds.clone()),
            Box::new(snapshot_size_bytes.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| KeepsakeError::validation(format!("Failed to register metric: {e}")))?;
        }

        Ok(Self {
            saves_total,
            save_failures_total,
            loads_total,
            load_failures_total,
            flush_batch_size,
            flush_duration_seconds,
            snapshot_size_bytes,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static KeepsakeMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize Keepsake metrics"))
    }

    /// Record a save attempt
    pub fn record_save(&self) {
        self.saves_total.inc();
    }

    /// Record a failed save
    pub fn record_save_failure(&self) {
        self.save_failures_total.inc();
    }

    /// Record a load attempt
    pub fn record_load(&self) {
        self.loads_total.inc();
    }

    /// Record a failed load
    pub fn record_load_failure(&self) {
        self.load_failures_total.inc();
    }

    /// Record one scheduler flush
    pub fn record_flush(&self, batch_size: usize, duration: std::time::Duration) {
        self.flush_batch_size.observe(batch_size as f64);
        self.flush_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record the size of a written snapshot file
    pub fn record_snapshot_size(&self, size_bytes: usize) {
        self.snapshot_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| KeepsakeError::validation(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| KeepsakeError::validation(format!("Failed to convert metrics: {e}")))
    }
}

/// Initialize the global observability system
///
/// Sets up structured logging with JSON output and, when the `metrics`
/// feature is enabled, the global metrics instance.
///
/// # Arguments
/// * `json_output` - Emit log lines as JSON (plain fmt otherwise)
pub fn init_observability(json_output: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    KeepsakeMetrics::global();

    let filter = EnvFilter::from_default_env().add_directive(
        "keepsake=info"
            .parse()
            .map_err(|e| KeepsakeError::validation(format!("Bad default directive: {e}")))?,
    );

    let result = if json_output {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };

    result.map_err(|e| {
        KeepsakeError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("Keepsake observability system initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(false)
}
