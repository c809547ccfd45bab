//! Maximum-concurrency discovery by doubling search.
//!
//! Each step fires `concurrency` simultaneous single calls. A step passes when
//! its success rate is strictly above the configured minimum; the search then
//! doubles (capped) and stops at the first failing step, the cap, or the
//! doubling limit. The reported level is the last passing one: the search
//! never refines between the last pass and the first fail, so the result can
//! understate capacity by up to 2x.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info};

use rpcload_core::{ConcurrencyProbeResult, EngineConfig, ProbeConfig, ProbeStep, RpcClient};

use crate::metrics;

pub struct ConcurrencyProber {
    client: Arc<dyn RpcClient>,
    method: Arc<str>,
    call_timeout: Duration,
    probe: ProbeConfig,
    min_success_rate_percent: f64,
}

impl ConcurrencyProber {
    pub fn new(client: Arc<dyn RpcClient>, config: &EngineConfig) -> Self {
        Self {
            client,
            method: Arc::from(config.stages.rpc_method.as_str()),
            call_timeout: config.stages.call_timeout(),
            probe: config.probe,
            min_success_rate_percent: config.thresholds.min_success_rate_percent,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_max_concurrency(&self) -> ConcurrencyProbeResult {
        let mut concurrency = self.probe.initial_concurrency.min(self.probe.max_concurrency);
        let mut max_passing = 0;
        let mut steps = Vec::new();

        for doublings in 0..=self.probe.max_doublings {
            let succeeded = self.burst(concurrency).await;
            let success_rate_percent = f64::from(succeeded) / f64::from(concurrency) * 100.0;
            let passed = success_rate_percent > self.min_success_rate_percent;

            debug!(concurrency, succeeded, success_rate_percent, passed, "burst complete");
            steps.push(ProbeStep {
                concurrency,
                succeeded,
                success_rate_percent,
                passed,
            });

            if !passed {
                break;
            }
            max_passing = concurrency;

            if concurrency >= self.probe.max_concurrency || doublings == self.probe.max_doublings {
                break;
            }
            concurrency = concurrency.saturating_mul(2).min(self.probe.max_concurrency);
        }

        info!(max_concurrency = max_passing, steps = steps.len(), "concurrency probe complete");
        ConcurrencyProbeResult::new(max_passing, steps)
    }

    /// Fires `concurrency` simultaneous calls and counts the successes.
    async fn burst(&self, concurrency: u32) -> u32 {
        let calls = (0..concurrency).map(|_| async {
            let success = matches!(
                timeout(self.call_timeout, self.client.call(&self.method)).await,
                Ok(Ok(_))
            );
            metrics::CALLS_TOTAL
                .with_label_values(&[if success { "success" } else { "failure" }])
                .inc();
            success
        });

        join_all(calls).await.into_iter().filter(|&ok| ok).count() as u32
    }
}
