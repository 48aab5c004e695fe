//! Pool contract and the steps shared by both engines

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cistern_core::{CisternError, Result};

use super::config::{PoolConfig, PoolStrategy};
use super::factory::ConnectionFactory;
use super::handle::PooledConnection;
use super::lock_free::LockFreePool;
use super::monitor::MonitorPool;
use super::stats::PoolStats;

/// A bounded pool of database connections
///
/// `acquire` favours reuse, then growth, then a bounded wait:
/// 1. Pop an idle connection, replacing it if it fails its liveness check
/// 2. If under `max_active`, open a new connection
/// 3. Otherwise wait up to the wait timeout for a `release` to hand one over
///
/// `release` hands the connection straight to the first caller still
/// waiting; only when nobody is waiting does it go back to the idle set.
#[async_trait]
pub trait ConnectionPool: Send + Sync + 'static {
    /// Get a connection from the pool
    ///
    /// Returns `CisternError::Timeout` if the wait ran out, or the driver's
    /// error if a connection could not be opened.
    async fn acquire(&self) -> Result<PooledConnection>;

    /// Return a connection to the pool
    ///
    /// Connections that are not currently lent out by this pool are dropped.
    fn release(&self, conn: PooledConnection);

    /// Get current pool statistics
    fn snapshot(&self) -> PoolStats;

    /// Close all idle connections, returning how many were closed
    async fn close_idle(&self) -> usize;

    /// Get the pool configuration
    fn config(&self) -> &PoolConfig;

    /// Get the engine implementing this pool
    fn strategy(&self) -> PoolStrategy {
        self.config().strategy()
    }
}

/// Create the pool engine selected by `config.strategy()`
pub async fn open_pool<F: ConnectionFactory>(
    config: PoolConfig,
    factory: F,
) -> Result<Arc<dyn ConnectionPool>> {
    let pool: Arc<dyn ConnectionPool> = match config.strategy() {
        PoolStrategy::Monitor => Arc::new(MonitorPool::new(config, factory).await?),
        PoolStrategy::LockFree => Arc::new(LockFreePool::new(config, factory).await?),
    };
    Ok(pool)
}

/// Open `initial_size` connections for a new pool
///
/// A connection that fails its warm-up liveness check is still kept. Failing
/// to open one fails the whole construction.
pub(super) async fn warm_up(
    factory: &dyn ConnectionFactory,
    config: &PoolConfig,
) -> Result<Vec<PooledConnection>> {
    let mut connections = Vec::with_capacity(config.initial_size());
    for _ in 0..config.initial_size() {
        let conn = open_connection(factory).await?;
        if !factory.validate(&*conn, config.validation_timeout()).await {
            tracing::warn!(connection_id = %conn.id(), "warm-up liveness check failed, keeping connection");
        }
        connections.push(conn);
    }
    tracing::info!(count = connections.len(), "pool warmed up");
    Ok(connections)
}

pub(super) async fn open_connection(factory: &dyn ConnectionFactory) -> Result<PooledConnection> {
    let conn = factory.create().await.map_err(|e| {
        tracing::error!(error = %e, "failed to open connection");
        e
    })?;
    let conn = PooledConnection::new(conn);
    tracing::debug!(connection_id = %conn.id(), "opened connection");
    Ok(conn)
}

/// Make sure `conn` is alive, reopening it in place if not
///
/// The replacement is not checked again. If it cannot be opened the slot is
/// lost and the caller must give back its capacity.
pub(super) async fn revalidate(
    factory: &dyn ConnectionFactory,
    mut conn: PooledConnection,
    timeout: Duration,
) -> Result<PooledConnection> {
    if factory.validate(&*conn, timeout).await {
        return Ok(conn);
    }

    tracing::warn!(connection_id = %conn.id(), "connection failed liveness check, reopening");
    let fresh = factory.create().await.map_err(|e| {
        tracing::error!(connection_id = %conn.id(), error = %e, "failed to reopen dead connection");
        e
    })?;
    // Not closed explicitly; the driver cleans up on drop.
    drop(conn.replace(fresh));
    Ok(conn)
}

/// Capacity held by an `acquire` that is still opening or checking a connection
///
/// Dropping an armed guard runs `give_back`. This covers both an error return
/// and the `acquire` future being dropped at an await point.
pub(super) struct SlotGuard<F: FnOnce()> {
    give_back: Option<F>,
}

impl<F: FnOnce()> SlotGuard<F> {
    pub(super) fn new(give_back: F) -> Self {
        Self {
            give_back: Some(give_back),
        }
    }

    /// The connection reached the caller; keep the capacity
    pub(super) fn disarm(mut self) {
        self.give_back = None;
    }
}

impl<F: FnOnce()> Drop for SlotGuard<F> {
    fn drop(&mut self) {
        if let Some(give_back) = self.give_back.take() {
            give_back();
        }
    }
}

pub(super) fn wait_timeout_error(config: &PoolConfig) -> CisternError {
    CisternError::Timeout(format!(
        "Timed out waiting for connection (timeout: {:?})",
        config.wait_timeout()
    ))
}
