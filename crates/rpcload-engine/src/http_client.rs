//! JSON-RPC over HTTP client adapter.
//!
//! Posts a JSON-RPC 2.0 request per call. A call succeeds when the response
//! has a 2xx status and its body carries no `error` member.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use rpcload_core::{LoadError, LoadResult, RpcClient, RpcError, TestTarget};

/// Pooled HTTP client for one JSON-RPC endpoint; safe to share across workers.
pub struct JsonRpcHttpClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcHttpClient {
    /// Builds a client for `target` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(target: &TestTarget, request_timeout: Duration) -> LoadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LoadError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: target.url.clone(),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl RpcClient for JsonRpcHttpClient {
    async fn call(&self, method: &str) -> Result<Duration, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": [],
        });

        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(start.elapsed())
                } else {
                    RpcError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Remote(format!("HTTP {status}")));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Transport(format!("invalid JSON-RPC reply: {e}")))?;
        let latency = start.elapsed();

        match reply.get("error") {
            Some(error) if !error.is_null() => Err(RpcError::Remote(error.to_string())),
            _ => Ok(latency),
        }
    }
}
