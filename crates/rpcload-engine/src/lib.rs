//! Async execution engine for rpcload.
//!
//! Runs rate-targeted load tests, concurrency probes and the full six-stage
//! session against a JSON-RPC endpoint, sampling host resources alongside.

pub mod analyzer;
pub mod coordinator;
pub mod http_client;
pub mod metrics;
pub mod mock;
pub mod prober;
pub mod sampler;
pub mod session;
pub mod telemetry;
pub mod worker;

pub use analyzer::BottleneckAnalyzer;
pub use coordinator::LoadTestCoordinator;
pub use http_client::JsonRpcHttpClient;
pub use mock::MockRpcClient;
pub use prober::ConcurrencyProber;
pub use sampler::{ResourceProbe, ResourceReading, ResourceSampler, SamplerHandle, SystemProbe};
pub use session::SessionRunner;
pub use worker::RequestWorker;
