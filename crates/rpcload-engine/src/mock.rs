use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rpcload_core::{RpcClient, RpcError};

/// Mock RPC client for testing.
///
/// Simulates a fixed latency, seeded random failures, a saturation point
/// above which concurrent calls fail, or an endpoint that never answers.
/// Calls draw from one shared seeded RNG, so the number of failures over a
/// fixed number of calls is reproducible regardless of task interleaving.
pub struct MockRpcClient {
    latency: Duration,
    failure_rate: f64,
    capacity: Option<usize>,
    hang: bool,
    rng: Mutex<StdRng>,
    in_flight: AtomicUsize,
    calls: AtomicU64,
}

impl MockRpcClient {
    /// Default simulated latency (10ms).
    pub const DEFAULT_LATENCY_MS: u64 = 10;
    /// Default RNG seed.
    pub const DEFAULT_SEED: u64 = 0x5EED;

    /// Creates an always-successful client with the default latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(Self::DEFAULT_LATENCY_MS),
            failure_rate: 0.0,
            capacity: None,
            hang: false,
            rng: Mutex::new(StdRng::seed_from_u64(Self::DEFAULT_SEED)),
            in_flight: AtomicUsize::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Sets the simulated latency.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails each call with probability `rate`, drawn from an RNG seeded with `seed`.
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64, seed: u64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Fails every call that arrives while `capacity` calls are already in flight.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Makes every call wait forever.
    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for MockRpcClient {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RpcClient for MockRpcClient {
    async fn call(&self, method: &str) -> Result<Duration, RpcError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);

        if self.hang {
            std::future::pending::<()>().await;
        }

        let roll_failed = self.failure_rate > 0.0 && self.rng.lock().gen_bool(self.failure_rate);
        let saturated = self.capacity.is_some_and(|capacity| in_flight > capacity);

        tokio::time::sleep(self.latency).await;

        if saturated {
            return Err(RpcError::Remote(format!("{method}: server overloaded")));
        }
        if roll_failed {
            return Err(RpcError::Remote(format!("{method}: injected failure")));
        }
        Ok(self.latency)
    }
}
