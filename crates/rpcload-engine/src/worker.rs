//! Paced request generator.
//!
//! Call `i` is scheduled at `start + i * (1s / rate)`. The worker sleeps only
//! for the time left until that slot, so time spent inside calls does not
//! accumulate as drift. A worker that falls behind fires immediately until it
//! catches up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, timeout, Instant};

use rpcload_core::{CallOutcome, LoadError, RpcClient};

use crate::metrics;

/// Upper bound on outcome slots reserved before the first call.
const MAX_PREALLOCATED_OUTCOMES: u64 = 65_536;

/// One member of a load test's worker pool.
pub struct RequestWorker {
    client: Arc<dyn RpcClient>,
    method: Arc<str>,
    call_timeout: Duration,
    progress: Arc<AtomicU64>,
}

impl RequestWorker {
    pub fn new(client: Arc<dyn RpcClient>, method: Arc<str>, call_timeout: Duration) -> Self {
        Self {
            client,
            method,
            call_timeout,
            progress: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counter of calls completed so far, readable while the worker runs.
    pub fn progress(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.progress)
    }

    /// Issues `rate_per_second * duration_secs` calls at a fixed pace.
    ///
    /// Failed and timed-out calls are recorded, never dropped.
    pub async fn run(self, rate_per_second: u32, duration_secs: u64) -> Vec<CallOutcome> {
        if rate_per_second == 0 {
            return Vec::new();
        }

        let total_calls = u64::from(rate_per_second).saturating_mul(duration_secs);
        let interval_nanos = 1_000_000_000 / u64::from(rate_per_second);
        let mut outcomes = Vec::with_capacity(outcome_capacity(total_calls));

        let start = Instant::now();
        for call_index in 0..total_calls {
            sleep_until(start + Duration::from_nanos(interval_nanos * call_index)).await;

            let sent_at = Instant::now();
            let result = match timeout(self.call_timeout, self.client.call(&self.method)).await {
                Ok(Ok(latency)) => Ok(latency),
                Ok(Err(err)) => Err(LoadError::network(err.to_string())),
                Err(_) => Err(LoadError::network(format!(
                    "call timed out after {:?}",
                    self.call_timeout
                ))),
            };

            let outcome = match result {
                Ok(latency) => CallOutcome {
                    latency_ms: latency.as_secs_f64() * 1000.0,
                    success: true,
                    timestamp_ms: sent_at.duration_since(start).as_millis() as u64,
                },
                Err(err) => {
                    tracing::trace!(error = %err, call_index, "call failed");
                    CallOutcome {
                        latency_ms: sent_at.elapsed().as_secs_f64() * 1000.0,
                        success: false,
                        timestamp_ms: sent_at.duration_since(start).as_millis() as u64,
                    }
                }
            };

            metrics::record_call(outcome.success, outcome.latency_ms / 1000.0);
            outcomes.push(outcome);
            self.progress.fetch_add(1, Ordering::Relaxed);
        }

        outcomes
    }
}

fn outcome_capacity(total_calls: u64) -> usize {
    total_calls.min(MAX_PREALLOCATED_OUTCOMES) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRpcClient;

    fn worker(client: Arc<dyn RpcClient>, call_timeout: Duration) -> RequestWorker {
        RequestWorker::new(client, Arc::from("getHealth"), call_timeout)
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_issues_rate_times_duration_calls() {
        let client = Arc::new(MockRpcClient::new().with_latency(Duration::ZERO));
        let outcomes = worker(client.clone(), Duration::from_secs(5)).run(20, 3).await;

        assert_eq!(outcomes.len(), 60);
        assert_eq!(client.call_count(), 60);
        assert!(outcomes.iter().all(|o| o.success));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_pacing_without_drift() {
        let client = Arc::new(MockRpcClient::new().with_latency(Duration::from_millis(30)));
        let started = Instant::now();
        let outcomes = worker(client, Duration::from_secs(5)).run(10, 2).await;

        // Slots are 100ms apart regardless of the 30ms spent in each call.
        let timestamps: Vec<u64> = outcomes.iter().map(|o| o.timestamp_ms).collect();
        assert_eq!(timestamps[0], 0);
        assert_eq!(timestamps[1], 100);
        assert_eq!(timestamps[19], 1900);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));

        // Last slot at 1.9s plus one 30ms call.
        assert_eq!(started.elapsed(), Duration::from_millis(1930));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_records_timeouts_as_failures() {
        let client = Arc::new(MockRpcClient::new().hanging());
        let w = worker(client, Duration::from_millis(250));
        let progress = w.progress();
        let outcomes = w.run(2, 1).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.success));
        assert!(outcomes.iter().all(|o| (o.latency_ms - 250.0).abs() < 1.0));
        assert_eq!(progress.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_records_errors_with_latency() {
        let client = Arc::new(
            MockRpcClient::new()
                .with_latency(Duration::from_millis(15))
                .with_failure_rate(1.0, 1),
        );
        let outcomes = worker(client, Duration::from_secs(5)).run(5, 1).await;

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| !o.success && (o.latency_ms - 15.0).abs() < 1.0));
    }

    #[test]
    fn test_outcome_capacity_is_bounded() {
        assert_eq!(outcome_capacity(60), 60);
        assert_eq!(
            outcome_capacity(u64::from(u32::MAX) * 3600),
            MAX_PREALLOCATED_OUTCOMES as usize
        );
    }
}
