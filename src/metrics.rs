// Prometheus metrics for the quota engine
//
// Exposed on the /metrics HTTP endpoint:
// - Consumption outcomes (counter by outcome and channel)
// - Commit conflicts and retries (counter)
// - Persistence failures (counter)
// - Consumption latency (histogram)
// - Premium tiers expired by the sweeper (counter)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Consumption metrics
    pub static ref CONSUMPTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("quota_consumptions_total", "Consumption attempts by outcome"),
        &["outcome", "channel"]
    ).expect("Failed to create consumptions metric");

    pub static ref CONSUMPTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("quota_consumption_duration_seconds", "End-to-end consumption latency")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5]),
    ).expect("Failed to create consumption duration metric");

    pub static ref COMMIT_CONFLICTS_TOTAL: IntCounter = IntCounter::new(
        "quota_commit_conflicts_total",
        "Commits rejected because the account changed underneath"
    ).expect("Failed to create commit conflicts metric");

    pub static ref COMMIT_RETRIES_TOTAL: IntCounter = IntCounter::new(
        "quota_commit_retries_total",
        "Consumption attempts retried after a conflict"
    ).expect("Failed to create commit retries metric");

    pub static ref PERSISTENCE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "quota_persistence_failures_total",
        "State snapshot or ledger writes that failed"
    ).expect("Failed to create persistence failures metric");

    // Tier metrics
    pub static ref TIERS_EXPIRED_TOTAL: IntCounter = IntCounter::new(
        "quota_tiers_expired_total",
        "Premium tiers downgraded after expiry"
    ).expect("Failed to create tiers expired metric");

    pub static ref SUBJECT_LOCKS_ACTIVE: IntGauge = IntGauge::new(
        "quota_subject_locks_active",
        "Per-subject serialization locks currently held in memory"
    ).expect("Failed to create subject locks metric");
}

fn register<C>(collector: &C) -> prometheus::Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    match REGISTRY.register(Box::new(collector.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Register every metric with the registry; repeated calls are no-ops
pub fn init() -> prometheus::Result<()> {
    register(&*CONSUMPTIONS_TOTAL)?;
    register(&*CONSUMPTION_DURATION_SECONDS)?;
    register(&*COMMIT_CONFLICTS_TOTAL)?;
    register(&*COMMIT_RETRIES_TOTAL)?;
    register(&*PERSISTENCE_FAILURES_TOTAL)?;
    register(&*TIERS_EXPIRED_TOTAL)?;
    register(&*SUBJECT_LOCKS_ACTIVE)?;
    Ok(())
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
