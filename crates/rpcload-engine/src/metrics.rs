//! Prometheus metrics for the load engine
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Gauge, Histogram, HistogramVec, IntCounter, IntCounterVec,
};

// ===== Call Metrics =====

/// Total RPC calls issued by workers and bursts, by outcome
pub static CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rpcload_calls_total",
        "Total number of RPC calls issued",
        &["outcome"]
    )
    .expect("Failed to register calls counter")
});

/// Latency of successful RPC calls
pub static CALL_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "rpcload_call_latency_seconds",
        "Latency of successful RPC calls in seconds",
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register call latency histogram")
});

/// Workers excluded from aggregation (crashed or past the grace period)
pub static ABANDONED_WORKERS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "rpcload_abandoned_workers_total",
        "Workers excluded from aggregation"
    )
    .expect("Failed to register abandoned workers counter")
});

// ===== Session Metrics =====

/// Wall-clock duration of each session stage
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "rpcload_stage_duration_seconds",
        "Session stage duration in seconds",
        &["stage"],
        vec![0.1, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    )
    .expect("Failed to register stage duration histogram")
});

// ===== Host Metrics =====

/// Last sampled host CPU utilization (0-100)
pub static HOST_CPU_PERCENT: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("rpcload_host_cpu_percent", "Last sampled host CPU utilization")
        .expect("Failed to register host CPU gauge")
});

/// Last sampled host memory utilization (0-100)
pub static HOST_MEMORY_PERCENT: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "rpcload_host_memory_percent",
        "Last sampled host memory utilization"
    )
    .expect("Failed to register host memory gauge")
});

/// Records one call outcome.
pub fn record_call(success: bool, latency_secs: f64) {
    if success {
        CALLS_TOTAL.with_label_values(&["success"]).inc();
        CALL_LATENCY.observe(latency_secs);
    } else {
        CALLS_TOTAL.with_label_values(&["failure"]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let _ = &*CALLS_TOTAL;
        let _ = &*CALL_LATENCY;
        let _ = &*ABANDONED_WORKERS;
        let _ = &*STAGE_DURATION;
        let _ = &*HOST_CPU_PERCENT;
        let _ = &*HOST_MEMORY_PERCENT;
    }

    #[test]
    fn test_record_call_increments_counter() {
        record_call(true, 0.01);
        record_call(false, 5.0);

        let metrics = prometheus::gather();
        let calls: Vec<_> = metrics
            .iter()
            .filter(|m| m.get_name() == "rpcload_calls_total")
            .collect();

        assert!(!calls.is_empty());
        assert!(CALLS_TOTAL.with_label_values(&["failure"]).get() >= 1);
    }
}
