// Prometheus metrics for scanguard
//
// Exposes metrics on the /metrics HTTP endpoint:
// - Scans by outcome (counter)
// - Scan durations by outcome (histogram)
// - Scans in flight (gauge)

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Outcome label values, in the order they are pre-registered
pub const OUTCOMES: [&str; 6] = [
    "succeeded",
    "invalid_input",
    "tool_not_found",
    "execution_failed",
    "timed_out",
    "parse_failed",
];

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref SCANS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("scanguard_scans_total", "Total number of scan requests by outcome"),
        &["outcome"]
    ).expect("Failed to create scans total metric");

    pub static ref SCAN_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("scanguard_scan_duration_seconds", "Scan duration in seconds")
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]),
        &["outcome"]
    ).expect("Failed to create scan duration metric");

    pub static ref SCANS_ACTIVE: IntGauge = IntGauge::new(
        "scanguard_scans_active",
        "Number of scans currently in flight"
    ).expect("Failed to create active scans metric");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn init() -> prometheus::Result<()> {
    register(Box::new(SCANS_TOTAL.clone()))?;
    register(Box::new(SCAN_DURATION_SECONDS.clone()))?;
    register(Box::new(SCANS_ACTIVE.clone()))?;

    // Pre-create every outcome series so dashboards see zeros
    for outcome in OUTCOMES {
        SCANS_TOTAL.with_label_values(&[outcome]);
    }
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Record a finished scan
pub fn record_scan(outcome: &str, elapsed: Duration) {
    SCANS_TOTAL.with_label_values(&[outcome]).inc();
    SCAN_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

/// Counts a scan as in flight until dropped
#[derive(Debug)]
pub struct ActiveScan(());

impl ActiveScan {
    pub fn start() -> Self {
        SCANS_ACTIVE.inc();
        Self(())
    }
}

impl Drop for ActiveScan {
    fn drop(&mut self) {
        SCANS_ACTIVE.dec();
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
