//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Statistics about a connection pool's current state
///
/// The counts are read independently; under concurrent use they may be
/// momentarily inconsistent with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections the pool owns or is in the middle of opening
    logical_size: usize,
    /// Number of idle connections available in the pool
    idle: usize,
    /// Number of connections currently lent out
    active: usize,
    /// Connections handed to a waiter but not yet picked up
    in_transit: usize,
    /// Number of callers waiting for a connection
    waiting: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub fn new(
        logical_size: usize,
        idle: usize,
        active: usize,
        in_transit: usize,
        waiting: usize,
    ) -> Self {
        Self {
            logical_size,
            idle,
            active,
            in_transit,
            waiting,
        }
    }

    /// Get the logical size of the pool
    pub fn logical_size(&self) -> usize {
        self.logical_size
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of active (lent out) connections
    pub fn active(&self) -> usize {
        self.active
    }

    /// Get the number of handoffs not yet picked up
    pub fn in_transit(&self) -> usize {
        self.in_transit
    }

    /// Get the number of waiting callers
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Calculate pool utilization as a fraction (0.0 to 1.0)
    ///
    /// Returns 0.0 if the pool owns no connections.
    pub fn utilization(&self) -> f64 {
        if self.logical_size == 0 {
            0.0
        } else {
            self.active as f64 / self.logical_size as f64
        }
    }

    /// Check if every owned connection is lent out
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.logical_size > 0
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }
}
