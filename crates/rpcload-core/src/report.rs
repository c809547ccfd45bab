//! Session-level aggregate handed to report generators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::finding::{Bottleneck, ConcurrencyProbeResult, Recommendation};
use crate::load::{LoadTestResult, TestTarget};
use crate::stats::Summary;

/// Stages of a session, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Idle,
    Baseline,
    ProgressiveLoad,
    MaxConcurrencyProbe,
    SustainedLoad,
    ResourceAnalysis,
    Complete,
}

impl SessionStage {
    /// The stage that follows `self`; `Complete` is terminal.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::Baseline,
            Self::Baseline => Self::ProgressiveLoad,
            Self::ProgressiveLoad => Self::MaxConcurrencyProbe,
            Self::MaxConcurrencyProbe => Self::SustainedLoad,
            Self::SustainedLoad => Self::ResourceAnalysis,
            Self::ResourceAnalysis | Self::Complete => Self::Complete,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Baseline => "baseline",
            Self::ProgressiveLoad => "progressive_load",
            Self::MaxConcurrencyProbe => "max_concurrency_probe",
            Self::SustainedLoad => "sustained_load",
            Self::ResourceAnalysis => "resource_analysis",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a stage or a single load level.
///
/// Keeps "not tested" (`NotRun`, `Skipped`) apart from "tested and failed"
/// (`Failed`) and from a completed test whose data may itself be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    NotRun,
    Skipped { reason: String },
    Failed { error: String },
    Completed(T),
}

impl<T> StageOutcome<T> {
    #[must_use]
    pub fn completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn failed(error: impl ToString) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }
}

impl<T> Default for StageOutcome<T> {
    fn default() -> Self {
        Self::NotRun
    }
}

/// Unloaded latency measured with sequential single calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineResult {
    pub calls: u32,
    pub successful_calls: u32,
    /// Latency over successful calls only.
    pub latency_stats: Summary,
}

/// One rung of the progressive load ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveLevel {
    pub target_rps: u32,
    pub outcome: StageOutcome<LoadTestResult>,
}

/// Everything a session measured, in stage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub target: TestTarget,
    /// Last stage reached; `Complete` once the session has finished.
    pub stage: SessionStage,
    pub baseline: StageOutcome<BaselineResult>,
    pub progressive: Vec<ProgressiveLevel>,
    pub concurrency: StageOutcome<ConcurrencyProbeResult>,
    pub sustained: StageOutcome<LoadTestResult>,
    pub bottlenecks: StageOutcome<Vec<Bottleneck>>,
    pub recommendations: Vec<Recommendation>,
    /// Number of resource samples the analysis ran over.
    pub resource_samples_analyzed: usize,
}

impl SessionReport {
    /// Creates an empty report for `target` in the `Idle` stage.
    #[must_use]
    pub fn new(target: TestTarget) -> Self {
        Self {
            target,
            stage: SessionStage::Idle,
            baseline: StageOutcome::NotRun,
            progressive: Vec::new(),
            concurrency: StageOutcome::NotRun,
            sustained: StageOutcome::NotRun,
            bottlenecks: StageOutcome::NotRun,
            recommendations: Vec::new(),
            resource_samples_analyzed: 0,
        }
    }

    /// Completed progressive load results, in ascending RPS order.
    pub fn completed_levels(&self) -> impl Iterator<Item = &LoadTestResult> {
        self.progressive.iter().filter_map(|level| level.outcome.completed())
    }

    /// Every completed load test result: progressive levels, then sustained.
    #[must_use]
    pub fn load_results(&self) -> Vec<&LoadTestResult> {
        self.completed_levels()
            .chain(self.sustained.completed())
            .collect()
    }
}
