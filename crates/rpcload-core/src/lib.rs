//! Core domain types for the rpcload stress-testing engine.

pub mod config;
pub mod error;
pub mod finding;
pub mod load;
pub mod report;
pub mod resource;
pub mod stats;
pub mod traits;

pub use config::{EngineConfig, ProbeConfig, SamplerConfig, StageConfig, Thresholds};
pub use error::{LoadError, LoadResult};
pub use finding::{
    Bottleneck, ConcurrencyProbeResult, ProbeStep, Recommendation, ResourceType, Severity,
};
pub use load::{CallOutcome, LoadTestResult, LoadTestSpec, TestTarget};
pub use report::{BaselineResult, ProgressiveLevel, SessionReport, SessionStage, StageOutcome};
pub use resource::{ResourceSample, ResourceUsage};
pub use stats::{StatisticsEngine, Summary, SummaryStats};
pub use traits::{RpcClient, RpcError, WebSocketConnection};
