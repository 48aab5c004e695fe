//! Lock-free engine: concurrent queues and an atomic capacity counter

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering, fence};

use async_trait::async_trait;
use cistern_core::Result;
use crossbeam_queue::SegQueue;
use dashmap::DashSet;

use super::config::PoolConfig;
use super::factory::ConnectionFactory;
use super::handle::{ConnectionId, PooledConnection};
use super::pool::{
    ConnectionPool, SlotGuard, open_connection, revalidate, wait_timeout_error, warm_up,
};
use super::stats::PoolStats;
use super::waiter::{self, HandoffSender, WaitTicket};

/// A connection pool built from independent concurrent structures
///
/// Idle, active and waiting are each safe for concurrent use on their own.
/// `logical_size` is the only admission arbiter and is reserved with a
/// compare-and-swap loop, so it never exceeds `max_active`. Fields may
/// disagree with each other for a moment while an operation is in flight.
pub struct LockFreePool {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    logical_size: AtomicUsize,
    idle: SegQueue<PooledConnection>,
    active: DashSet<ConnectionId>,
    waiting: SegQueue<HandoffSender>,
    in_transit: AtomicUsize,
}

impl LockFreePool {
    /// Create a pool and open `config.initial_size()` connections
    #[tracing::instrument(skip_all, fields(strategy = "lock_free", initial_size = config.initial_size()))]
    pub async fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;
        let factory: Arc<dyn ConnectionFactory> = Arc::new(factory);
        let warmed = warm_up(&*factory, &config).await?;

        let idle = SegQueue::new();
        let logical_size = AtomicUsize::new(warmed.len());
        for conn in warmed {
            idle.push(conn);
        }

        Ok(Self {
            config,
            factory,
            logical_size,
            idle,
            active: DashSet::new(),
            waiting: SegQueue::new(),
            in_transit: AtomicUsize::new(0),
        })
    }

    /// Reserve one unit of capacity if the pool is below its ceiling
    fn try_reserve(&self) -> bool {
        let max = self.config.max_active();
        self.logical_size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    fn shrink(&self) {
        let before = self.logical_size.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(logical_size = before - 1, "slot discarded");
    }

    /// Check out a connection taken from idle
    async fn check_out(&self, conn: PooledConnection) -> Result<PooledConnection> {
        let slot = SlotGuard::new(|| self.shrink());
        let conn = revalidate(&*self.factory, conn, self.config.validation_timeout()).await?;
        self.active.insert(conn.id());
        slot.disarm();
        Ok(conn)
    }

    /// Move idle connections to waiters that queued up while we pushed to idle
    fn rebalance(&self) {
        while !self.waiting.is_empty() {
            let Some(conn) = self.idle.pop() else {
                return;
            };
            let id = conn.id();
            self.active.insert(id);
            if let Err(conn) = waiter::hand_off(|| self.waiting.pop(), conn, &self.in_transit) {
                self.active.remove(&id);
                self.idle.push(conn);
                // A waiter may have registered after the queue ran dry and
                // missed the connection while we held it.
                fence(Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl ConnectionPool for LockFreePool {
    #[tracing::instrument(skip(self), fields(strategy = "lock_free"))]
    async fn acquire(&self) -> Result<PooledConnection> {
        if let Some(conn) = self.idle.pop() {
            return self.check_out(conn).await;
        }

        if self.try_reserve() {
            let slot = SlotGuard::new(|| self.shrink());
            let conn = open_connection(&*self.factory).await?;
            self.active.insert(conn.id());
            slot.disarm();
            return Ok(conn);
        }

        let (tx, rx) = waiter::channel();
        self.waiting.push(tx);
        let ticket = WaitTicket::new(rx, &self.in_transit, self);

        // Pairs with the fence in `release`: either we see its idle push or it
        // sees our registration.
        fence(Ordering::SeqCst);
        if let Some(conn) = self.idle.pop() {
            if let Some(extra) = ticket.depart() {
                self.release(extra);
            }
            return self.check_out(conn).await;
        }

        tracing::debug!("pool exhausted, waiting for a released connection");
        let conn = ticket
            .wait(self.config.wait_timeout())
            .await
            .ok_or_else(|| wait_timeout_error(&self.config))?;

        let id = conn.id();
        let slot = SlotGuard::new(|| {
            self.active.remove(&id);
            self.shrink();
        });
        let conn = revalidate(&*self.factory, conn, self.config.validation_timeout()).await?;
        slot.disarm();
        Ok(conn)
    }

    fn release(&self, conn: PooledConnection) {
        let id = conn.id();
        if !self.active.contains(&id) {
            tracing::warn!(connection_id = %id, "released connection is not lent out by this pool, dropping it");
            return;
        }

        if let Err(conn) = waiter::hand_off(|| self.waiting.pop(), conn, &self.in_transit) {
            self.active.remove(&id);
            self.idle.push(conn);
            tracing::trace!(connection_id = %id, "connection returned to idle");

            fence(Ordering::SeqCst);
            self.rebalance();
        }
    }

    /// Waiters that already left are counted until a release skips them.
    fn snapshot(&self) -> PoolStats {
        PoolStats::new(
            self.logical_size.load(Ordering::SeqCst),
            self.idle.len(),
            self.active.len(),
            self.in_transit.load(Ordering::SeqCst),
            self.waiting.len(),
        )
    }

    async fn close_idle(&self) -> usize {
        let mut count = 0;
        while let Some(conn) = self.idle.pop() {
            self.logical_size.fetch_sub(1, Ordering::SeqCst);
            if let Err(e) = conn.close().await {
                tracing::warn!(connection_id = %conn.id(), error = %e, "failed to close idle connection");
            }
            count += 1;
        }
        tracing::info!(count, "closed idle connections");
        count
    }

    fn config(&self) -> &PoolConfig {
        &self.config
    }
}
