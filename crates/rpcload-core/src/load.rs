//! Load test descriptors and results.

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};
use crate::resource::{ResourceSample, ResourceUsage};
use crate::stats::{StatisticsEngine, Summary};

/// Endpoint under test. Created once per session and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTarget {
    /// HTTP(S) URL of the JSON-RPC endpoint.
    pub url: String,
    /// Optional WebSocket URL of the same endpoint.
    pub websocket_url: Option<String>,
}

impl TestTarget {
    /// Creates a target without a WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `url` is blank.
    pub fn new(url: impl Into<String>) -> LoadResult<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(LoadError::configuration("target url must not be empty"));
        }
        Ok(Self {
            url,
            websocket_url: None,
        })
    }

    /// Attaches a WebSocket URL.
    #[must_use]
    pub fn with_websocket(mut self, websocket_url: impl Into<String>) -> Self {
        self.websocket_url = Some(websocket_url.into());
        self
    }
}

/// Parameters of one rate-targeted load test.
///
/// Deserialized values go through [`LoadTestSpec::with_workers`], so they
/// obey the same invariants as constructed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLoadTestSpec")]
pub struct LoadTestSpec {
    target_rps: u32,
    duration_secs: u64,
    worker_count: u32,
}

impl LoadTestSpec {
    /// Upper bound on workers per test.
    pub const MAX_WORKERS: u32 = 8;
    /// Requests per second a single worker is sized for when choosing a default pool.
    pub const RPS_PER_WORKER: u32 = 100;

    /// Creates a spec with the default pool size `min(8, ceil(rps / 100))`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `target_rps` or `duration_secs` is zero.
    pub fn new(target_rps: u32, duration_secs: u64) -> LoadResult<Self> {
        let workers = target_rps.div_ceil(Self::RPS_PER_WORKER);
        Self::with_workers(target_rps, duration_secs, workers)
    }

    /// Creates a spec with an explicit pool size.
    ///
    /// The pool is capped at [`Self::MAX_WORKERS`] and at `target_rps`, so
    /// every worker receives a non-zero rate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any argument is zero.
    pub fn with_workers(target_rps: u32, duration_secs: u64, worker_count: u32) -> LoadResult<Self> {
        if target_rps == 0 {
            return Err(LoadError::configuration("target_rps must be > 0"));
        }
        if duration_secs == 0 {
            return Err(LoadError::configuration("duration_secs must be > 0"));
        }
        if worker_count == 0 {
            return Err(LoadError::configuration("worker_count must be > 0"));
        }

        Ok(Self {
            target_rps,
            duration_secs,
            worker_count: worker_count.min(Self::MAX_WORKERS).min(target_rps),
        })
    }

    #[must_use]
    pub fn target_rps(&self) -> u32 {
        self.target_rps
    }

    #[must_use]
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    #[must_use]
    pub fn worker_count(&self) -> u32 {
        self.worker_count
    }

    /// Per-worker rates: an even split with the remainder on the first worker.
    ///
    /// The rates always sum to `target_rps`.
    #[must_use]
    pub fn worker_rates(&self) -> Vec<u32> {
        let base = self.target_rps / self.worker_count;
        let remainder = self.target_rps % self.worker_count;

        let mut rates = vec![base; self.worker_count as usize];
        rates[0] += remainder;
        rates
    }
}

#[derive(Deserialize)]
struct RawLoadTestSpec {
    target_rps: u32,
    duration_secs: u64,
    worker_count: u32,
}

impl TryFrom<RawLoadTestSpec> for LoadTestSpec {
    type Error = LoadError;

    fn try_from(raw: RawLoadTestSpec) -> LoadResult<Self> {
        Self::with_workers(raw.target_rps, raw.duration_secs, raw.worker_count)
    }
}

/// Outcome of a single RPC call issued by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Round-trip latency, or elapsed time until the failure was observed.
    pub latency_ms: f64,
    pub success: bool,
    /// Milliseconds between worker start and the call being sent.
    pub timestamp_ms: u64,
}

/// Aggregated result of one load test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestResult {
    pub target_rps: u32,
    /// `total_requests / duration_secs`.
    pub actual_rps: f64,
    pub duration_secs: u64,
    pub total_requests: u64,
    pub successful_requests: u64,
    /// `None` when no request was issued.
    pub error_rate_percent: Option<f64>,
    /// Latency over successful calls only.
    pub latency_stats: Summary,
    pub resource_usage: Option<ResourceUsage>,
    /// Workers excluded because they crashed or outlived the grace period.
    pub abandoned_workers: u32,
}

impl LoadTestResult {
    /// Aggregates merged worker outcomes into a result.
    #[must_use]
    pub fn from_outcomes(
        spec: &LoadTestSpec,
        outcomes: &[CallOutcome],
        samples: &[ResourceSample],
        abandoned_workers: u32,
    ) -> Self {
        let total_requests = outcomes.len() as u64;
        let latencies: Vec<f64> = outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.latency_ms)
            .collect();
        let successful_requests = latencies.len() as u64;

        let error_rate_percent = (total_requests > 0).then(|| {
            (1.0 - successful_requests as f64 / total_requests as f64) * 100.0
        });

        Self {
            target_rps: spec.target_rps(),
            actual_rps: total_requests as f64 / spec.duration_secs() as f64,
            duration_secs: spec.duration_secs(),
            total_requests,
            successful_requests,
            error_rate_percent,
            latency_stats: StatisticsEngine::summarize(&latencies),
            resource_usage: ResourceUsage::from_samples(samples),
            abandoned_workers,
        }
    }

    /// Successful requests per second over the nominal duration.
    #[must_use]
    pub fn successful_rps(&self) -> f64 {
        self.successful_requests as f64 / self.duration_secs as f64
    }

    #[must_use]
    pub fn failed_requests(&self) -> u64 {
        self.total_requests.saturating_sub(self.successful_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool, latency_ms: f64) -> CallOutcome {
        CallOutcome {
            latency_ms,
            success,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_target_rejects_blank_url() {
        assert!(TestTarget::new("  ").is_err());
        let target = TestTarget::new("http://localhost:8899")
            .unwrap()
            .with_websocket("ws://localhost:8900");
        assert_eq!(target.websocket_url.as_deref(), Some("ws://localhost:8900"));
    }

    #[test]
    fn test_spec_default_worker_count() {
        assert_eq!(LoadTestSpec::new(50, 1).unwrap().worker_count(), 1);
        assert_eq!(LoadTestSpec::new(250, 1).unwrap().worker_count(), 3);
        assert_eq!(LoadTestSpec::new(5000, 1).unwrap().worker_count(), 8);
    }

    #[test]
    fn test_spec_rejects_zero_values() {
        assert!(matches!(
            LoadTestSpec::new(0, 10),
            Err(LoadError::Configuration { .. })
        ));
        assert!(LoadTestSpec::new(10, 0).is_err());
        assert!(LoadTestSpec::with_workers(10, 10, 0).is_err());
    }

    #[test]
    fn test_spec_caps_workers() {
        assert_eq!(LoadTestSpec::with_workers(1000, 1, 32).unwrap().worker_count(), 8);
        assert_eq!(LoadTestSpec::with_workers(3, 1, 8).unwrap().worker_count(), 3);
    }

    #[test]
    fn test_worker_rates_remainder_on_first() {
        let spec = LoadTestSpec::with_workers(103, 1, 4).unwrap();
        let rates = spec.worker_rates();
        assert_eq!(rates, vec![28, 25, 25, 25]);
        assert_eq!(rates.iter().sum::<u32>(), 103);
    }

    #[test]
    fn test_deserialized_spec_is_validated() {
        let err = serde_json::from_str::<LoadTestSpec>(
            r#"{"target_rps":10,"duration_secs":1,"worker_count":0}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("worker_count must be > 0"));

        let spec: LoadTestSpec =
            serde_json::from_str(r#"{"target_rps":3,"duration_secs":1,"worker_count":32}"#)
                .unwrap();
        assert_eq!(spec.worker_count(), 3);
        assert_eq!(spec.worker_rates(), vec![1, 1, 1]);
    }

    #[test]
    fn test_inconsistent_result_counts_do_not_underflow() {
        let json = r#"{
            "target_rps": 10,
            "actual_rps": 1.0,
            "duration_secs": 1,
            "total_requests": 1,
            "successful_requests": 5,
            "error_rate_percent": null,
            "latency_stats": {"status": "no_data"},
            "resource_usage": null,
            "abandoned_workers": 0
        }"#;
        let result: LoadTestResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.failed_requests(), 0);
    }

    #[test]
    fn test_result_invariants() {
        let spec = LoadTestSpec::with_workers(10, 2, 1).unwrap();
        let mut outcomes: Vec<CallOutcome> = (0..15).map(|_| outcome(true, 10.0)).collect();
        outcomes.extend((0..5).map(|_| outcome(false, 5000.0)));

        let result = LoadTestResult::from_outcomes(&spec, &outcomes, &[], 0);

        assert_eq!(result.total_requests, 20);
        assert_eq!(result.successful_requests, 15);
        assert_eq!(result.failed_requests(), 5);
        assert_eq!(result.actual_rps, 10.0);
        assert_eq!(result.successful_rps(), 7.5);
        assert!((result.error_rate_percent.unwrap() - 25.0).abs() < 1e-9);
        // Failed calls do not pollute latency figures.
        assert_eq!(result.latency_stats.stats().unwrap().max, 10.0);
        assert!(result.resource_usage.is_none());
    }

    #[test]
    fn test_result_without_requests_is_no_data() {
        let spec = LoadTestSpec::new(10, 1).unwrap();
        let result = LoadTestResult::from_outcomes(&spec, &[], &[], 1);

        assert_eq!(result.total_requests, 0);
        assert_eq!(result.actual_rps, 0.0);
        assert_eq!(result.error_rate_percent, None);
        assert!(result.latency_stats.is_no_data());
        assert_eq!(result.abandoned_workers, 1);
    }
}
