//! Bottleneck detection and optimization recommendations.
//!
//! Every rule is evaluated independently and emits at most one finding per
//! `analyze` call; rules never suppress each other.

use rpcload_core::{
    Bottleneck, LoadTestResult, Recommendation, ResourceSample, ResourceType, SessionReport,
    Severity, StatisticsEngine, Thresholds,
};

/// Probed concurrency below this is reported as low headroom.
const LOW_CONCURRENCY: u32 = 100;
/// Baseline p99 above this (ms) is reported as slow unloaded latency.
const SLOW_BASELINE_P99_MS: f64 = 1000.0;

pub struct BottleneckAnalyzer {
    thresholds: Thresholds,
}

impl BottleneckAnalyzer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Applies threshold and trend rules to samples and load results.
    pub fn analyze<'a>(
        &self,
        samples: &[ResourceSample],
        results: impl IntoIterator<Item = &'a LoadTestResult>,
    ) -> Vec<Bottleneck> {
        let results: Vec<&LoadTestResult> = results.into_iter().collect();

        [
            self.cpu_saturation(samples),
            self.memory_saturation(samples),
            self.disk_saturation(samples),
            self.cpu_spikes(samples),
            self.memory_growth(samples),
            self.error_rate(&results),
            self.tail_latency(&results),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn cpu_saturation(&self, samples: &[ResourceSample]) -> Option<Bottleneck> {
        let peak = samples.iter().map(|s| s.cpu_percent).fold(f64::NAN, f64::max);
        (peak > self.thresholds.cpu_percent).then(|| {
            Bottleneck::new(
                ResourceType::Cpu,
                Severity::High,
                format!(
                    "CPU utilization peaked at {peak:.1}% (threshold {:.0}%)",
                    self.thresholds.cpu_percent
                ),
                "Scale out RPC nodes or move request handling off hot CPU paths; profile \
                 serialization and signature verification under load",
            )
        })
    }

    fn memory_saturation(&self, samples: &[ResourceSample]) -> Option<Bottleneck> {
        let peak = samples
            .iter()
            .map(|s| s.memory_used_percent)
            .fold(f64::NAN, f64::max);
        (peak > self.thresholds.memory_percent).then(|| {
            Bottleneck::new(
                ResourceType::Memory,
                Severity::High,
                format!(
                    "Memory usage peaked at {peak:.1}% (threshold {:.0}%)",
                    self.thresholds.memory_percent
                ),
                "Add memory or cap in-process caches and account indexes",
            )
        })
    }

    fn disk_saturation(&self, samples: &[ResourceSample]) -> Option<Bottleneck> {
        let peak = samples
            .iter()
            .map(ResourceSample::disk_total_iops)
            .fold(f64::NAN, f64::max);
        (peak > self.thresholds.disk_iops).then(|| {
            Bottleneck::new(
                ResourceType::DiskIo,
                Severity::Medium,
                format!(
                    "Disk I/O peaked at {peak:.0} IOPS (threshold {:.0})",
                    self.thresholds.disk_iops
                ),
                "Move ledger and account storage to faster NVMe devices or tune read caching",
            )
        })
    }

    fn cpu_spikes(&self, samples: &[ResourceSample]) -> Option<Bottleneck> {
        let cpu: Vec<f64> = samples.iter().map(|s| s.cpu_percent).collect();
        let avg = StatisticsEngine::mean(&cpu)?;
        if avg <= 0.0 {
            return None;
        }

        let limit = avg * self.thresholds.cpu_spike_factor;
        let spikes = cpu.iter().filter(|&&v| v > limit).count();
        let share = spikes as f64 / cpu.len() as f64 * 100.0;

        (share > self.thresholds.cpu_spike_share_percent).then(|| {
            Bottleneck::new(
                ResourceType::Cpu,
                Severity::Medium,
                format!(
                    "CPU spikes above {limit:.1}% in {share:.0}% of samples (window average {avg:.1}%)"
                ),
                "Look for bursty background work such as compaction or snapshotting that \
                 competes with request handling",
            )
        })
    }

    fn memory_growth(&self, samples: &[ResourceSample]) -> Option<Bottleneck> {
        let window = self.thresholds.memory_trend_window;
        if samples.len() < window * 2 {
            return None;
        }

        let memory: Vec<f64> = samples.iter().map(|s| s.memory_used_percent).collect();
        let leading = StatisticsEngine::mean(&memory[..window])?;
        let trailing = StatisticsEngine::mean(&memory[memory.len() - window..])?;
        if leading <= 0.0 {
            return None;
        }

        let growth = (trailing - leading) / leading * 100.0;
        (growth > self.thresholds.memory_growth_percent).then(|| {
            Bottleneck::new(
                ResourceType::Memory,
                Severity::Medium,
                format!(
                    "Memory grew {growth:.1}% over the window ({leading:.1}% -> {trailing:.1}%)"
                ),
                "Possible leak or unbounded cache growth; bound caches and check for \
                 subscription or connection leaks",
            )
        })
    }

    fn error_rate(&self, results: &[&LoadTestResult]) -> Option<Bottleneck> {
        let (rps, worst) = results
            .iter()
            .filter_map(|r| r.error_rate_percent.map(|rate| (r.target_rps, rate)))
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        (worst > self.thresholds.max_error_rate_percent).then(|| {
            Bottleneck::new(
                ResourceType::Network,
                Severity::Medium,
                format!("Error rate reached {worst:.1}% at {rps} rps"),
                "Check connection limits, rate limiting and load balancer capacity in front \
                 of the endpoint",
            )
        })
    }

    fn tail_latency(&self, results: &[&LoadTestResult]) -> Option<Bottleneck> {
        let (rps, p50, p99) = results
            .iter()
            .filter_map(|r| {
                let stats = r.latency_stats.stats()?;
                (stats.p50 > 0.0 && stats.p99 > stats.p50 * self.thresholds.tail_latency_ratio)
                    .then_some((r.target_rps, stats.p50, stats.p99))
            })
            .next()?;

        Some(Bottleneck::new(
            ResourceType::Network,
            Severity::Low,
            format!(
                "p99 latency {p99:.1}ms is more than {:.0}x p50 {p50:.1}ms at {rps} rps",
                self.thresholds.tail_latency_ratio
            ),
            "Investigate queueing: connection pool sizing, keep-alive and request timeouts",
        ))
    }

    /// Derives recommendations from a report whose analysis stage has run.
    ///
    /// Sustained degradation is reported when the sustained error rate exceeds
    /// the best progressive level's by more than half of
    /// `max_error_rate_percent`. Sorted from highest to lowest priority.
    pub fn recommend(&self, report: &SessionReport) -> Vec<Recommendation> {
        let mut recommendations: Vec<Recommendation> = report
            .bottlenecks
            .completed()
            .into_iter()
            .flatten()
            .map(|b| Recommendation {
                priority: b.severity,
                resource_type: Some(b.resource_type),
                message: b.recommendation.clone(),
            })
            .collect();

        let best_progressive_error = report
            .completed_levels()
            .filter_map(|r| r.error_rate_percent)
            .min_by(f64::total_cmp);
        let sustained_error = report.sustained.completed().and_then(|r| r.error_rate_percent);
        if let (Some(best), Some(sustained)) = (best_progressive_error, sustained_error) {
            if sustained > best + self.thresholds.max_error_rate_percent / 2.0 {
                recommendations.push(Recommendation {
                    priority: Severity::High,
                    resource_type: None,
                    message: format!(
                        "Error rate rose to {sustained:.1}% under sustained load (best short run \
                         {best:.1}%); the endpoint degrades over time"
                    ),
                });
            }
        }

        if let Some(probe) = report.concurrency.completed() {
            if probe.max_concurrency < LOW_CONCURRENCY {
                recommendations.push(Recommendation {
                    priority: Severity::Medium,
                    resource_type: Some(ResourceType::Network),
                    message: format!(
                        "Only {} concurrent requests succeeded reliably; raise connection and \
                         worker thread limits",
                        probe.max_concurrency
                    ),
                });
            }
        }

        if let Some(stats) = report
            .baseline
            .completed()
            .and_then(|b| b.latency_stats.stats())
        {
            if stats.p99 > SLOW_BASELINE_P99_MS {
                recommendations.push(Recommendation {
                    priority: Severity::Medium,
                    resource_type: None,
                    message: format!(
                        "Unloaded p99 latency is {:.0}ms; check network path and node sync state",
                        stats.p99
                    ),
                });
            }
        }

        recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
        recommendations
    }
}
