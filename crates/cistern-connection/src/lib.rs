//! Cistern Connection - Connection pooling and pool registry
//!
//! This crate owns the pool engine. A pool lends out connections from a
//! bounded, elastic set: it reuses idle connections first, opens new ones up
//! to a ceiling, and otherwise parks the caller for a bounded time until a
//! released connection is handed to it directly.
//!
//! Two interchangeable engines implement the same [`ConnectionPool`] contract:
//! [`MonitorPool`] guards all state with one lock, [`LockFreePool`] uses
//! independent concurrent queues and an atomic capacity counter.

pub mod health;
pub mod pool;
mod registry;

pub use health::{LivenessError, LivenessResult, check_liveness, is_alive};
pub use pool::{
    ConnectionFactory, ConnectionId, ConnectionPool, DriverConnectionFactory, LockFreePool,
    MonitorPool, PoolConfig, PoolStats, PoolStrategy, PooledConnection, open_pool,
};
pub use registry::{PoolKey, PoolRegistry, get_pool};
