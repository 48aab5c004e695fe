//! Monitor engine: one lock around all pool state

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cistern_core::Result;
use parking_lot::Mutex;

use super::config::PoolConfig;
use super::factory::ConnectionFactory;
use super::handle::{ConnectionId, PooledConnection};
use super::pool::{
    ConnectionPool, SlotGuard, open_connection, revalidate, wait_timeout_error, warm_up,
};
use super::stats::PoolStats;
use super::waiter::{self, HandoffReceiver, HandoffSender, WaitTicket};

/// Everything the lock protects
struct MonitorState {
    idle: VecDeque<PooledConnection>,
    active: HashSet<ConnectionId>,
    logical_size: usize,
    waiting: VecDeque<HandoffSender>,
}

/// What `acquire` decided while holding the lock
enum Admission {
    Reuse(PooledConnection),
    Grow,
    Wait(HandoffReceiver),
}

/// A connection pool whose state is guarded by a single lock
///
/// Every decision (reuse, grow, wait) and every membership change happens
/// under the lock, so the pool invariants hold at every observation. Driver
/// calls (open, liveness check) and the wait itself happen with the lock
/// released.
pub struct MonitorPool {
    /// Pool configuration
    config: PoolConfig,
    /// Connection factory
    factory: Arc<dyn ConnectionFactory>,
    /// Idle, active, waiting and logical size
    state: Mutex<MonitorState>,
    /// Handoffs sent but not yet picked up
    in_transit: AtomicUsize,
}

impl MonitorPool {
    /// Create a pool and open `config.initial_size()` connections
    #[tracing::instrument(skip_all, fields(strategy = "monitor", initial_size = config.initial_size()))]
    pub async fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;
        let factory: Arc<dyn ConnectionFactory> = Arc::new(factory);
        let idle = warm_up(&*factory, &config).await?;

        Ok(Self {
            state: Mutex::new(MonitorState {
                logical_size: idle.len(),
                idle: idle.into(),
                active: HashSet::new(),
                waiting: VecDeque::new(),
            }),
            config,
            factory,
            in_transit: AtomicUsize::new(0),
        })
    }

    fn admit(&self) -> Admission {
        let mut state = self.state.lock();
        if let Some(conn) = state.idle.pop_front() {
            Admission::Reuse(conn)
        } else if state.logical_size < self.config.max_active() {
            state.logical_size += 1;
            Admission::Grow
        } else {
            state.waiting.retain(|tx| !tx.is_closed());
            let (tx, rx) = waiter::channel();
            state.waiting.push_back(tx);
            Admission::Wait(rx)
        }
    }

    fn check_out(&self, conn: PooledConnection) -> PooledConnection {
        self.state.lock().active.insert(conn.id());
        conn
    }

    /// Give up a slot whose connection could not be (re)opened
    fn forget(&self, id: Option<ConnectionId>) {
        let mut state = self.state.lock();
        if let Some(id) = id {
            state.active.remove(&id);
        }
        state.logical_size = state.logical_size.saturating_sub(1);
        tracing::debug!(logical_size = state.logical_size, "slot discarded");
    }

    /// Senders still queued, including those of callers that already left
    #[cfg(test)]
    pub(super) fn queued_waiters(&self) -> usize {
        self.state.lock().waiting.len()
    }
}

#[async_trait]
impl ConnectionPool for MonitorPool {
    #[tracing::instrument(skip(self), fields(strategy = "monitor"))]
    async fn acquire(&self) -> Result<PooledConnection> {
        let timeout = self.config.validation_timeout();
        match self.admit() {
            Admission::Reuse(conn) => {
                let slot = SlotGuard::new(|| self.forget(None));
                let conn = revalidate(&*self.factory, conn, timeout).await?;
                slot.disarm();
                Ok(self.check_out(conn))
            }
            Admission::Grow => {
                let slot = SlotGuard::new(|| self.forget(None));
                let conn = open_connection(&*self.factory).await?;
                slot.disarm();
                Ok(self.check_out(conn))
            }
            Admission::Wait(rx) => {
                tracing::debug!("pool exhausted, waiting for a released connection");
                let ticket = WaitTicket::new(rx, &self.in_transit, self);
                let conn = ticket
                    .wait(self.config.wait_timeout())
                    .await
                    .ok_or_else(|| wait_timeout_error(&self.config))?;

                // A handed-off connection never left the active set.
                let id = conn.id();
                let slot = SlotGuard::new(|| self.forget(Some(id)));
                let conn = revalidate(&*self.factory, conn, timeout).await?;
                slot.disarm();
                Ok(conn)
            }
        }
    }

    fn release(&self, conn: PooledConnection) {
        let id = conn.id();
        let mut state = self.state.lock();
        if !state.active.contains(&id) {
            drop(state);
            tracing::warn!(connection_id = %id, "released connection is not lent out by this pool, dropping it");
            return;
        }

        let state = &mut *state;
        if let Err(conn) = waiter::hand_off(|| state.waiting.pop_front(), conn, &self.in_transit) {
            state.active.remove(&id);
            state.idle.push_back(conn);
            tracing::trace!(connection_id = %id, idle = state.idle.len(), "connection returned to idle");
        }
    }

    fn snapshot(&self) -> PoolStats {
        let state = self.state.lock();
        let waiting = state.waiting.iter().filter(|tx| !tx.is_closed()).count();
        PoolStats::new(
            state.logical_size,
            state.idle.len(),
            state.active.len(),
            self.in_transit.load(Ordering::SeqCst),
            waiting,
        )
    }

    async fn close_idle(&self) -> usize {
        let connections: Vec<_> = {
            let mut state = self.state.lock();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.logical_size -= drained.len();
            drained
        };

        let count = connections.len();
        for conn in connections {
            if let Err(e) = conn.close().await {
                tracing::warn!(connection_id = %conn.id(), error = %e, "failed to close idle connection");
            }
        }
        tracing::info!(count, "closed idle connections");
        count
    }

    fn config(&self) -> &PoolConfig {
        &self.config
    }
}
