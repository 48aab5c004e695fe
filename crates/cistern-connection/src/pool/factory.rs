//! Connection factories

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cistern_core::{Connection, ConnectionConfig, DatabaseDriver, Result};

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation runs a bounded liveness check.
    async fn validate(&self, conn: &dyn Connection, timeout: Duration) -> bool {
        crate::health::is_alive(conn, timeout).await
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection, timeout: Duration) -> bool {
        (**self).validate(conn, timeout).await
    }
}

/// Factory that opens connections through a registered driver
pub struct DriverConnectionFactory {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
}

impl DriverConnectionFactory {
    /// Create a factory for the given driver and connection settings
    pub fn new(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        Self { driver, config }
    }

    /// Get the connection settings used for every connect
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for DriverConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.driver.connect(&self.config).await
    }
}
