//! Connection handle lent out by the pool

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cistern_core::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a pool slot
///
/// Stays the same when a dead connection is replaced in place, so the
/// pool's bookkeeping follows the slot rather than the driver object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A connection borrowed from the pool
///
/// Hand it back with `ConnectionPool::release`. It is deliberately not
/// `Clone`: a handle is held by exactly one caller at a time.
pub struct PooledConnection {
    id: ConnectionId,
    connection: Arc<dyn Connection>,
    opened_at: Instant,
}

impl PooledConnection {
    pub(crate) fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            id: ConnectionId::new(),
            connection,
            opened_at: Instant::now(),
        }
    }

    /// Swap in a freshly opened connection, keeping the slot identity
    ///
    /// Returns the stale connection.
    pub(crate) fn replace(&mut self, connection: Arc<dyn Connection>) -> Arc<dyn Connection> {
        self.opened_at = Instant::now();
        std::mem::replace(&mut self.connection, connection)
    }

    /// Get the slot identity
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Time since the current driver connection was opened
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("driver", &self.connection.driver_name())
            .field("age", &self.age())
            .finish()
    }
}
