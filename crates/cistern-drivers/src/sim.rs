//! In-process simulated driver
//!
//! Connections are plain in-memory objects. Connect latency and a random
//! connect failure rate can be configured, and every connection opened so
//! far can be killed at once to simulate a backend restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cistern_core::{CisternError, Connection, ConnectionConfig, DatabaseDriver, Result};
use rand::Rng;

/// URL scheme accepted by the simulated driver
pub const SIM_SCHEME: &str = "sim://";

/// Simulated database driver
pub struct SimulatedDriver {
    connect_latency: Duration,
    failure_rate: f64,
    /// Bumped by `kill_all`; connections from an older generation are dead.
    generation: Arc<AtomicU64>,
    opened: AtomicUsize,
    failed: AtomicUsize,
}

impl SimulatedDriver {
    /// Create a driver that connects instantly and never fails
    pub fn new() -> Self {
        Self {
            connect_latency: Duration::ZERO,
            failure_rate: 0.0,
            generation: Arc::new(AtomicU64::new(0)),
            opened: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Delay every connect by `latency`
    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Fail the given fraction of connects, clamped to `0.0..=1.0`
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Number of connections opened successfully
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of connect attempts that failed
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Make every connection opened so far report itself dead
    pub fn kill_all(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(generation, "simulated backend restarted");
    }

    fn roll_failure(&self) -> bool {
        self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate)
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SimulatedDriver {
    fn name(&self) -> &'static str {
        "sim"
    }

    #[tracing::instrument(skip(self, config), fields(url = %config.url))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        if !config.url.starts_with(SIM_SCHEME) {
            return Err(CisternError::Configuration(format!(
                "Simulated driver requires a '{}' url, got '{}'",
                SIM_SCHEME, config.url
            )));
        }

        if !self.connect_latency.is_zero() {
            tokio::time::sleep(self.connect_latency).await;
        }

        if self.roll_failure() {
            self.failed.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("simulated connect failure");
            return Err(CisternError::Connection(
                "Simulated backend refused the connection".into(),
            ));
        }

        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        let generation = self.generation.load(Ordering::SeqCst);
        tracing::debug!(id, generation, "simulated connection opened");
        Ok(Arc::new(SimConnection::new(
            id,
            generation,
            Arc::clone(&self.generation),
        )))
    }
}

/// A connection produced by [`SimulatedDriver`]
pub struct SimConnection {
    id: usize,
    generation: u64,
    backend_generation: Arc<AtomicU64>,
    killed: AtomicBool,
    closed: AtomicBool,
}

impl SimConnection {
    fn new(id: usize, generation: u64, backend_generation: Arc<AtomicU64>) -> Self {
        Self {
            id,
            generation,
            backend_generation,
            killed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Sequence number assigned by the driver
    pub fn id(&self) -> usize {
        self.id
    }

    /// Break this connection; liveness checks fail from now on
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for SimConnection {
    fn driver_name(&self) -> &str {
        "sim"
    }

    async fn is_valid(&self, _timeout: Duration) -> bool {
        !self.is_closed()
            && !self.killed.load(Ordering::SeqCst)
            && self.backend_generation.load(Ordering::SeqCst) == self.generation
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
