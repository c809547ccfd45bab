//! Six-stage test session
//!
//! `Idle -> Baseline -> ProgressiveLoad -> MaxConcurrencyProbe -> SustainedLoad
//! -> ResourceAnalysis -> Complete`
//!
//! Stages run once each, in order. A failing stage is recorded in the report
//! and the next stage still runs with whatever data exists. Only invalid
//! configuration aborts a session, and it does so before any request is sent.
//!
//! Sustained load runs at `sustained_fraction` of the discovered capacity in
//! requests per second: the best successful throughput of any progressive
//! level. The probed concurrency is used as the rate only when no level
//! delivered a successful request.

use std::sync::Arc;

use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use rpcload_core::{
    BaselineResult, EngineConfig, LoadError, LoadResult, LoadTestResult, LoadTestSpec,
    ProgressiveLevel, ResourceSample, RpcClient, SessionReport, SessionStage, StageOutcome,
    StatisticsEngine, TestTarget,
};

use crate::analyzer::BottleneckAnalyzer;
use crate::coordinator::LoadTestCoordinator;
use crate::metrics;
use crate::prober::ConcurrencyProber;
use crate::sampler::ResourceSampler;

/// Drives one test session against an endpoint.
pub struct SessionRunner {
    client: Arc<dyn RpcClient>,
    config: EngineConfig,
    coordinator: LoadTestCoordinator,
    prober: ConcurrencyProber,
    analyzer: BottleneckAnalyzer,
}

impl SessionRunner {
    /// Creates a runner sampling the real host.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Configuration`] if `config` is invalid.
    pub fn new(client: Arc<dyn RpcClient>, config: EngineConfig) -> LoadResult<Self> {
        let sampler = ResourceSampler::system(config.sampler.interval());
        Self::with_sampler(client, config, sampler)
    }

    /// Creates a runner with a custom resource sampler.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Configuration`] if `config` is invalid.
    pub fn with_sampler(
        client: Arc<dyn RpcClient>,
        config: EngineConfig,
        sampler: ResourceSampler,
    ) -> LoadResult<Self> {
        config.validate()?;

        Ok(Self {
            coordinator: LoadTestCoordinator::new(Arc::clone(&client), sampler, &config),
            prober: ConcurrencyProber::new(Arc::clone(&client), &config),
            analyzer: BottleneckAnalyzer::new(config.thresholds),
            client,
            config,
        })
    }

    /// Runs every stage and returns the completed report.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Configuration`] if the target has no URL. Stage
    /// failures never surface here; they are recorded in the report.
    #[tracing::instrument(skip(self, target), fields(url = %target.url))]
    pub async fn run(&self, target: TestTarget) -> LoadResult<SessionReport> {
        if target.url.trim().is_empty() {
            return Err(LoadError::configuration("target url must not be empty"));
        }

        let mut report = SessionReport::new(target);
        let mut samples: Vec<ResourceSample> = Vec::new();

        while report.stage != SessionStage::Complete {
            report.stage = report.stage.next();
            let stage = report.stage;
            let started = Instant::now();
            info!(%stage, "entering stage");

            match stage {
                SessionStage::Baseline => report.baseline = self.baseline().await,
                SessionStage::ProgressiveLoad => {
                    report.progressive = self.progressive_load(&mut samples).await;
                }
                SessionStage::MaxConcurrencyProbe => {
                    report.concurrency =
                        StageOutcome::Completed(self.prober.find_max_concurrency().await);
                }
                SessionStage::SustainedLoad => {
                    report.sustained = self.sustained_load(&report, &mut samples).await;
                }
                SessionStage::ResourceAnalysis => {
                    let bottlenecks = self.analyzer.analyze(&samples, report.load_results());
                    info!(
                        bottlenecks = bottlenecks.len(),
                        samples = samples.len(),
                        "analysis complete"
                    );
                    report.bottlenecks = StageOutcome::Completed(bottlenecks);
                    report.resource_samples_analyzed = samples.len();
                    report.recommendations = self.analyzer.recommend(&report);
                }
                SessionStage::Idle | SessionStage::Complete => {}
            }

            metrics::STAGE_DURATION
                .with_label_values(&[stage.as_str()])
                .observe(started.elapsed().as_secs_f64());
        }

        // Resource samples are not kept beyond the analysis.
        drop(samples);
        info!("session complete");
        Ok(report)
    }

    async fn baseline(&self) -> StageOutcome<BaselineResult> {
        let calls = self.config.stages.baseline_calls;
        if calls == 0 {
            return StageOutcome::skipped("baseline_calls is 0");
        }

        let method = self.config.stages.rpc_method.as_str();
        let call_timeout = self.config.stages.call_timeout();
        let mut latencies = Vec::with_capacity(calls as usize);

        for _ in 0..calls {
            match timeout(call_timeout, self.client.call(method)).await {
                Ok(Ok(latency)) => {
                    metrics::record_call(true, latency.as_secs_f64());
                    latencies.push(latency.as_secs_f64() * 1000.0);
                }
                Ok(Err(e)) => {
                    metrics::record_call(false, 0.0);
                    tracing::debug!(error = %e, "baseline call failed");
                }
                Err(_) => {
                    metrics::record_call(false, 0.0);
                    tracing::debug!(?call_timeout, "baseline call timed out");
                }
            }
        }

        StageOutcome::Completed(BaselineResult {
            calls,
            successful_calls: latencies.len() as u32,
            latency_stats: StatisticsEngine::summarize(&latencies),
        })
    }

    async fn progressive_load(&self, samples: &mut Vec<ResourceSample>) -> Vec<ProgressiveLevel> {
        let duration_secs = self.config.stages.progressive_duration_secs;
        let max_error = self.config.thresholds.max_error_rate_percent;
        let mut stop_reason: Option<String> = None;
        let mut levels = Vec::with_capacity(self.config.stages.progressive_rps_levels.len());

        for &target_rps in &self.config.stages.progressive_rps_levels {
            if let Some(reason) = &stop_reason {
                levels.push(ProgressiveLevel {
                    target_rps,
                    outcome: StageOutcome::skipped(reason.clone()),
                });
                continue;
            }

            let outcome = match LoadTestSpec::new(target_rps, duration_secs) {
                Err(e) => {
                    stop_reason = Some(format!("invalid load parameters at {target_rps} rps"));
                    StageOutcome::failed(e)
                }
                Ok(spec) => match self.coordinator.run_with_samples(spec).await {
                    Ok((result, window)) => {
                        samples.extend(window);
                        if let Some(rate) = result.error_rate_percent.filter(|&r| r > max_error) {
                            warn!(
                                target_rps,
                                error_rate_percent = rate,
                                "error rate too high; stopping escalation"
                            );
                            stop_reason = Some(format!(
                                "error rate {rate:.1}% at {target_rps} rps exceeded {max_error:.0}%"
                            ));
                        }
                        StageOutcome::Completed(result)
                    }
                    Err(e) => {
                        warn!(target_rps, error = %e, "load level failed; stopping escalation");
                        stop_reason = Some(format!("load test at {target_rps} rps failed"));
                        StageOutcome::failed(e)
                    }
                },
            };

            levels.push(ProgressiveLevel { target_rps, outcome });
        }

        levels
    }

    async fn sustained_load(
        &self,
        report: &SessionReport,
        samples: &mut Vec<ResourceSample>,
    ) -> StageOutcome<LoadTestResult> {
        let capacity = report
            .completed_levels()
            .map(|r| r.successful_rps())
            .fold(0.0, f64::max);
        let capacity = if capacity > 0.0 {
            capacity
        } else {
            report
                .concurrency
                .completed()
                .map_or(0.0, |probe| f64::from(probe.max_concurrency))
        };

        let target_rps = (capacity * self.config.stages.sustained_fraction).floor() as u32;
        if target_rps == 0 {
            return StageOutcome::skipped("no capacity measurement to derive a sustained rate from");
        }

        info!(target_rps, capacity, "running sustained load");
        let spec = match LoadTestSpec::new(target_rps, self.config.stages.sustained_duration_secs) {
            Ok(spec) => spec,
            Err(e) => return StageOutcome::failed(e),
        };

        match self.coordinator.run_with_samples(spec).await {
            Ok((result, window)) => {
                samples.extend(window);
                StageOutcome::Completed(result)
            }
            Err(e) => {
                warn!(error = %e, "sustained load failed");
                StageOutcome::failed(e)
            }
        }
    }
}
