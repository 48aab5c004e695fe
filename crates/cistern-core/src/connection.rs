//! Connection trait

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A live database connection as seen by the pool
///
/// The pool never runs statements itself. It only needs to know whether a
/// connection is still usable and how to close it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Check whether the connection is still alive
    ///
    /// Implementations should give up after `timeout` and report `false`.
    async fn is_valid(&self, timeout: Duration) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
