//! E2E tests for the six-stage session
//!
//! 1. Healthy endpoint runs every stage to completion
//! 2. High error rate stops progressive escalation
//! 3. Sustained rate falls back to the probed concurrency
//! 4. No measurable capacity skips sustained load
//! 5. Invalid configuration and targets are rejected up front

use std::sync::Arc;
use std::time::Duration;

use rpcload_core::{
    EngineConfig, LoadError, ResourceType, SessionStage, Severity, StageOutcome, TestTarget,
};
use rpcload_engine::{MockRpcClient, ResourceProbe, ResourceReading, ResourceSampler, SessionRunner};

struct QuietProbe;

impl ResourceProbe for QuietProbe {
    fn read(&mut self) -> ResourceReading {
        ResourceReading {
            cpu_percent: 10.0,
            memory_used_percent: 35.0,
            ..Default::default()
        }
    }
}

fn small_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.stages.baseline_calls = 5;
    config.stages.progressive_rps_levels = vec![10, 20];
    config.stages.progressive_duration_secs = 2;
    config.stages.sustained_duration_secs = 2;
    config.stages.sustained_fraction = 0.5;
    config.stages.call_timeout_ms = 100;
    config.probe.initial_concurrency = 5;
    config.probe.max_concurrency = 20;
    config.sampler.interval_ms = 500;
    config
}

fn runner(client: MockRpcClient, config: EngineConfig) -> SessionRunner {
    let sampler = ResourceSampler::new(QuietProbe, config.sampler.interval());
    SessionRunner::with_sampler(Arc::new(client), config, sampler).unwrap()
}

fn target() -> TestTarget {
    TestTarget::new("http://127.0.0.1:8899").unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_healthy_endpoint_completes_all_stages() {
    let report = runner(MockRpcClient::new(), small_config())
        .run(target())
        .await
        .unwrap();

    assert_eq!(report.stage, SessionStage::Complete);

    let baseline = report.baseline.completed().unwrap();
    assert_eq!(baseline.calls, 5);
    assert_eq!(baseline.successful_calls, 5);

    assert_eq!(report.progressive.len(), 2);
    assert!(report.progressive.iter().all(|l| l.outcome.is_completed()));

    let probe = report.concurrency.completed().unwrap();
    assert_eq!(probe.max_concurrency, 20);

    // Best level delivered 20 rps; half of it is sustained.
    let sustained = report.sustained.completed().unwrap();
    assert_eq!(sustained.target_rps, 10);
    assert_eq!(sustained.error_rate_percent, Some(0.0));

    assert_eq!(report.bottlenecks.completed().map(Vec::len), Some(0));
    assert!(report.resource_samples_analyzed > 0);

    // Probe capped at 20 concurrent calls reads as low headroom.
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.priority == Severity::Medium && r.resource_type == Some(ResourceType::Network)));
}

#[tokio::test(start_paused = true)]
async fn test_high_error_rate_stops_escalation() {
    let report = runner(MockRpcClient::new().with_failure_rate(0.5, 3), small_config())
        .run(target())
        .await
        .unwrap();

    assert_eq!(report.stage, SessionStage::Complete);

    let first = report.progressive[0].outcome.completed().unwrap();
    assert!(first.error_rate_percent.unwrap() > 10.0);
    assert!(matches!(
        report.progressive[1].outcome,
        StageOutcome::Skipped { .. }
    ));

    let bottlenecks = report.bottlenecks.completed().unwrap();
    assert!(bottlenecks
        .iter()
        .any(|b| b.resource_type == ResourceType::Network && b.severity == Severity::Medium));
}

#[tokio::test(start_paused = true)]
async fn test_sustained_rate_falls_back_to_probed_concurrency() {
    let mut config = small_config();
    config.stages.progressive_rps_levels = Vec::new();

    let report = runner(MockRpcClient::new(), config)
        .run(target())
        .await
        .unwrap();

    assert!(report.progressive.is_empty());
    assert_eq!(report.concurrency.completed().unwrap().max_concurrency, 20);
    // Half of the 20 probed concurrent calls.
    assert_eq!(report.sustained.completed().unwrap().target_rps, 10);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_endpoint_skips_sustained_load() {
    let report = runner(MockRpcClient::new().hanging(), small_config())
        .run(target())
        .await
        .unwrap();

    assert_eq!(report.stage, SessionStage::Complete);
    assert_eq!(report.baseline.completed().unwrap().successful_calls, 0);
    assert_eq!(report.concurrency.completed().unwrap().max_concurrency, 0);
    assert!(matches!(report.sustained, StageOutcome::Skipped { .. }));
    assert!(report.bottlenecks.is_completed());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = small_config();
    config.stages.progressive_rps_levels = vec![20, 10];
    let sampler = ResourceSampler::new(QuietProbe, Duration::from_millis(500));

    let err = SessionRunner::with_sampler(Arc::new(MockRpcClient::new()), config, sampler)
        .err()
        .unwrap();
    assert!(matches!(err, LoadError::Configuration { .. }));
}

#[tokio::test]
async fn test_blank_target_rejected_before_any_call() {
    let client = Arc::new(MockRpcClient::new());
    let sampler = ResourceSampler::new(QuietProbe, Duration::from_millis(500));
    let runner = SessionRunner::with_sampler(client.clone(), small_config(), sampler).unwrap();

    let blank = TestTarget {
        url: "   ".to_string(),
        websocket_url: None,
    };
    let err = runner.run(blank).await.unwrap_err();

    assert!(matches!(err, LoadError::Configuration { .. }));
    assert_eq!(client.call_count(), 0);
}
