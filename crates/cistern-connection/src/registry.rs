//! Keyed pool registry
//!
//! Hands out one pool per `(driver, url)` pair. The pool is built on first
//! request; concurrent first requests for the same pair share a single
//! construction, while requests for other pairs proceed independently.

use std::fmt;
use std::sync::{Arc, OnceLock};

use cistern_core::{CisternError, ConnectionConfig, Result};
use cistern_drivers::DriverRegistry;
use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::pool::{ConnectionPool, DriverConnectionFactory, PoolConfig, open_pool};


/// Identity of a backend: the driver plus its connection URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    driver: String,
    url: String,
}

impl PoolKey {
    pub fn new(driver: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
        }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.driver, self.url)
    }
}

/// Slot for a pool that may still be under construction
type PoolCell = Arc<OnceCell<Arc<dyn ConnectionPool>>>;

/// Lazily populated map from backend identity to pool
pub struct PoolRegistry {
    /// Drivers used to open connections for new pools
    drivers: DriverRegistry,
    /// Settings every new pool starts from
    template: PoolConfig,
    pools: DashMap<PoolKey, PoolCell>,
}

impl PoolRegistry {
    /// Create a registry with the default pool settings
    pub fn new(drivers: DriverRegistry) -> Self {
        Self::with_config(drivers, PoolConfig::default())
    }

    /// Create a registry whose pools start from `template`
    pub fn with_config(drivers: DriverRegistry, template: PoolConfig) -> Self {
        Self {
            drivers,
            template,
            pools: DashMap::new(),
        }
    }

    /// Process-wide registry with the built-in drivers
    pub fn global() -> &'static PoolRegistry {
        static GLOBAL: OnceLock<PoolRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            tracing::debug!("initializing global pool registry");
            PoolRegistry::new(DriverRegistry::with_defaults())
        })
    }

    /// Get the driver registry
    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Get the settings new pools start from
    pub fn template(&self) -> &PoolConfig {
        &self.template
    }

    /// Get the pool for `(driver, url)`, creating it on first request
    ///
    /// `initial_size` replaces the template's initial size, and only matters
    /// for the call that ends up creating the pool. If creation fails the
    /// error goes to the callers sharing that attempt and the next call tries
    /// again.
    #[tracing::instrument(skip(self, user, password), fields(driver = %driver, url = %url))]
    pub async fn get_pool(
        &self,
        driver: &str,
        url: &str,
        user: &str,
        password: &str,
        initial_size: usize,
    ) -> Result<Arc<dyn ConnectionPool>> {
        let key = PoolKey::new(driver, url);
        if let Some(pool) = self.lookup(&key) {
            return Ok(pool);
        }

        // The map guard is dropped here, before anything is awaited
        let cell = Arc::clone(&self.pools.entry(key.clone()).or_default());
        let pool = cell
            .get_or_try_init(|| self.construct(&key, user, password, initial_size))
            .await?;
        Ok(Arc::clone(pool))
    }

    /// Get an existing pool without creating one
    pub fn get(&self, driver: &str, url: &str) -> Option<Arc<dyn ConnectionPool>> {
        self.lookup(&PoolKey::new(driver, url))
    }

    /// Forget the pool for `(driver, url)`
    ///
    /// Callers still holding the pool keep using it; the next `get_pool`
    /// builds a new one.
    pub fn remove(&self, driver: &str, url: &str) -> Option<Arc<dyn ConnectionPool>> {
        let (key, cell) = self.pools.remove(&PoolKey::new(driver, url))?;
        let pool = cell.get().cloned();
        if pool.is_some() {
            tracing::info!(pool = %key, "removed pool from registry");
        }
        pool
    }

    /// Number of pools that have been created
    pub fn len(&self) -> usize {
        self.pools.iter().filter(|entry| entry.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all created pools
    pub fn keys(&self) -> Vec<PoolKey> {
        self.pools
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn lookup(&self, key: &PoolKey) -> Option<Arc<dyn ConnectionPool>> {
        self.pools.get(key).and_then(|cell| cell.get().cloned())
    }

    async fn construct(
        &self,
        key: &PoolKey,
        user: &str,
        password: &str,
        initial_size: usize,
    ) -> Result<Arc<dyn ConnectionPool>> {
        let driver = self
            .drivers
            .get(key.driver())
            .ok_or_else(|| CisternError::Driver(format!("Unknown driver: {}", key.driver())))?;

        let config = self.template.clone().with_initial_size(initial_size);
        config.validate()?;

        tracing::info!(pool = %key, strategy = %config.strategy(), initial_size, "creating pool");
        let connection = ConnectionConfig::new(key.driver(), key.url()).with_credentials(user, password);
        open_pool(config, DriverConnectionFactory::new(driver, connection))
            .await
            .map_err(|e| {
                tracing::error!(pool = %key, error = %e, "failed to create pool");
                e
            })
    }
}

/// Get a pool from the process-wide registry
///
/// See [`PoolRegistry::get_pool`].
pub async fn get_pool(
    driver: &str,
    url: &str,
    user: &str,
    password: &str,
    initial_size: usize,
) -> Result<Arc<dyn ConnectionPool>> {
    PoolRegistry::global()
        .get_pool(driver, url, user, password, initial_size)
        .await
}
