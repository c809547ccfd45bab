//! Load test coordinator for rate-targeted tests
//!
//! Splits the target rate across a worker pool, runs the pool alongside a
//! resource sampler, and joins every worker against an absolute deadline of
//! `duration + grace`. Workers still running at the deadline are aborted and
//! excluded from the result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use rpcload_core::{
    CallOutcome, EngineConfig, LoadError, LoadResult, LoadTestResult, LoadTestSpec,
    ResourceSample, RpcClient, Thresholds,
};

use crate::metrics;
use crate::sampler::ResourceSampler;
use crate::worker::RequestWorker;

struct SpawnedWorker {
    worker_id: usize,
    rate: u32,
    progress: Arc<AtomicU64>,
    handle: JoinHandle<Vec<CallOutcome>>,
}

/// Runs load tests against one endpoint.
pub struct LoadTestCoordinator {
    client: Arc<dyn RpcClient>,
    method: Arc<str>,
    call_timeout: Duration,
    thresholds: Thresholds,
    sampler: ResourceSampler,
}

impl LoadTestCoordinator {
    pub fn new(client: Arc<dyn RpcClient>, sampler: ResourceSampler, config: &EngineConfig) -> Self {
        Self {
            client,
            method: Arc::from(config.stages.rpc_method.as_str()),
            call_timeout: config.stages.call_timeout(),
            thresholds: config.thresholds,
            sampler,
        }
    }

    /// Runs one load test and returns its aggregated result.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Execution`] if no worker completed.
    pub async fn run_load_test(&self, spec: LoadTestSpec) -> LoadResult<LoadTestResult> {
        self.run_with_samples(spec).await.map(|(result, _)| result)
    }

    /// Runs one load test and also returns the raw resource samples.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Execution`] if no worker completed.
    #[tracing::instrument(skip(self), fields(target_rps = spec.target_rps(), duration_secs = spec.duration_secs()))]
    pub async fn run_with_samples(
        &self,
        spec: LoadTestSpec,
    ) -> LoadResult<(LoadTestResult, Vec<ResourceSample>)> {
        let rates = spec.worker_rates();
        let duration = Duration::from_secs(spec.duration_secs());
        info!(workers = rates.len(), ?rates, "starting load test");

        let mut sampler = self.sampler.start();
        let deadline = Instant::now() + duration + self.thresholds.grace_period();

        let workers: Vec<SpawnedWorker> = rates
            .into_iter()
            .enumerate()
            .map(|(worker_id, rate)| {
                let worker = RequestWorker::new(
                    Arc::clone(&self.client),
                    Arc::clone(&self.method),
                    self.call_timeout,
                );
                let progress = worker.progress();
                let handle = tokio::spawn(worker.run(rate, spec.duration_secs()));
                SpawnedWorker {
                    worker_id,
                    rate,
                    progress,
                    handle,
                }
            })
            .collect();

        let mut outcomes = Vec::new();
        let mut completed = 0u32;
        let mut abandoned = 0u32;

        for SpawnedWorker {
            worker_id,
            rate,
            progress,
            mut handle,
        } in workers
        {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(worker_outcomes)) => {
                    completed += 1;
                    outcomes.extend(worker_outcomes);
                }
                Ok(Err(e)) => {
                    abandoned += 1;
                    warn!(worker_id, error = %e, "worker crashed; results excluded");
                }
                Err(_) => {
                    handle.abort();
                    abandoned += 1;
                    warn!(
                        worker_id,
                        partial_calls = progress.load(Ordering::Relaxed),
                        expected_calls = u64::from(rate) * spec.duration_secs(),
                        "worker exceeded grace period; partial results discarded"
                    );
                }
            }
        }

        let samples = sampler.stop().await;
        metrics::ABANDONED_WORKERS.inc_by(u64::from(abandoned));

        if completed == 0 {
            return Err(LoadError::execution(
                "load_test",
                format!("all {abandoned} workers failed at {} rps", spec.target_rps()),
            ));
        }

        let result = LoadTestResult::from_outcomes(&spec, &outcomes, &samples, abandoned);
        info!(
            total_requests = result.total_requests,
            successful_requests = result.successful_requests,
            actual_rps = result.actual_rps,
            error_rate_percent = ?result.error_rate_percent,
            abandoned_workers = abandoned,
            "load test complete"
        );

        Ok((result, samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRpcClient;
    use crate::sampler::{ResourceProbe, ResourceReading};

    struct IdleProbe;

    impl ResourceProbe for IdleProbe {
        fn read(&mut self) -> ResourceReading {
            ResourceReading {
                cpu_percent: 10.0,
                memory_used_percent: 30.0,
                ..Default::default()
            }
        }
    }

    fn coordinator(client: Arc<dyn RpcClient>, config: &EngineConfig) -> LoadTestCoordinator {
        LoadTestCoordinator::new(
            client,
            ResourceSampler::new(IdleProbe, Duration::from_secs(1)),
            config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_uneven_rate_split_hits_target_exactly() {
        let client = Arc::new(MockRpcClient::new().with_latency(Duration::from_millis(1)));
        let coordinator = coordinator(client.clone(), &EngineConfig::default());

        let spec = LoadTestSpec::with_workers(103, 2, 4).unwrap();
        let result = coordinator.run_load_test(spec).await.unwrap();

        assert_eq!(result.total_requests, 206);
        assert_eq!(client.call_count(), 206);
        assert_eq!(result.actual_rps, 103.0);
        assert_eq!(result.abandoned_workers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_workers_are_abandoned() {
        let mut config = EngineConfig::default();
        config.stages.call_timeout_ms = 600_000;
        let coordinator = coordinator(Arc::new(MockRpcClient::new().hanging()), &config);

        let started = Instant::now();
        let spec = LoadTestSpec::with_workers(4, 1, 2).unwrap();
        let err = coordinator.run_load_test(spec).await.unwrap_err();

        assert!(matches!(err, LoadError::Execution { stage: "load_test", .. }));
        // Bounded by duration (1s) plus grace (5s), not by the call timeout.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_returned_with_result() {
        let coordinator = coordinator(Arc::new(MockRpcClient::new()), &EngineConfig::default());

        let spec = LoadTestSpec::new(20, 3).unwrap();
        let (result, samples) = coordinator.run_with_samples(spec).await.unwrap();

        assert!(!samples.is_empty());
        let usage = result.resource_usage.unwrap();
        assert_eq!(usage.peak.cpu_percent, 10.0);
        assert_eq!(usage.start.memory_used_percent, 30.0);
    }
}
