//! Connection pooling for database connections
//!
//! This module provides the pool engine: configuration, the connection
//! handle lent to callers, statistics, and the two engine strategies.
//!
//! # Example
//!
//! ```ignore
//! use cistern_connection::pool::{PoolConfig, PoolStrategy, open_pool};
//!
//! let config = PoolConfig::new(10, 100)
//!     .with_wait_timeout_ms(3000)
//!     .with_strategy(PoolStrategy::LockFree);
//!
//! let pool = open_pool(config, connection_factory).await?;
//! let conn = pool.acquire().await?;
//! // Use connection...
//! pool.release(conn);
//! ```

mod config;
mod factory;
mod handle;
mod lock_free;
mod monitor;
#[allow(clippy::module_inception)]
mod pool;
mod stats;
mod waiter;

#[cfg(test)]
mod tests;

pub use config::{PoolConfig, PoolStrategy};
pub use factory::{ConnectionFactory, DriverConnectionFactory};
pub use handle::{ConnectionId, PooledConnection};
pub use lock_free::LockFreePool;
pub use monitor::MonitorPool;
pub use pool::{ConnectionPool, open_pool};
pub use stats::PoolStats;
