//! Bounded liveness check

use std::time::{Duration, Instant};

use cistern_core::Connection;
use thiserror::Error;

/// Result of a liveness check: the round-trip time when alive
pub type LivenessResult = Result<Duration, LivenessError>;

/// Why a connection was judged dead
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LivenessError {
    /// The connection is closed
    #[error("Connection is closed")]
    ConnectionClosed,
    /// The driver reported the connection as unusable
    #[error("Connection failed validation")]
    Rejected,
    /// The driver did not answer in time
    #[error("Liveness check timed out")]
    Timeout,
}

/// Check whether a connection is alive, giving up after `timeout`.
///
/// The driver is also told the timeout; the outer bound guards against
/// drivers that ignore it.
pub async fn check_liveness(conn: &dyn Connection, timeout: Duration) -> LivenessResult {
    if conn.is_closed() {
        return Err(LivenessError::ConnectionClosed);
    }

    let start = Instant::now();
    match tokio::time::timeout(timeout, conn.is_valid(timeout)).await {
        Ok(true) => Ok(start.elapsed()),
        Ok(false) => Err(LivenessError::Rejected),
        Err(_) => Err(LivenessError::Timeout),
    }
}

/// Boolean form of [`check_liveness`], logging failures.
pub async fn is_alive(conn: &dyn Connection, timeout: Duration) -> bool {
    match check_liveness(conn, timeout).await {
        Ok(latency) => {
            tracing::trace!(driver = conn.driver_name(), latency = ?latency, "liveness check passed");
            true
        }
        Err(e) => {
            tracing::debug!(driver = conn.driver_name(), error = %e, "liveness check failed");
            false
        }
    }
}
