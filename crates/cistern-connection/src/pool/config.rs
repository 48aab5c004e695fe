//! Pool configuration types

use std::fmt;
use std::path::Path;
use std::time::Duration;

use cistern_core::{CisternError, Result};
use serde::{Deserialize, Serialize};

/// Which engine implements the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStrategy {
    /// One lock guards idle, active, waiting and the logical size
    Monitor,
    /// Independent concurrent queues plus an atomic capacity counter
    #[default]
    LockFree,
}

impl fmt::Display for PoolStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolStrategy::Monitor => write!(f, "monitor"),
            PoolStrategy::LockFree => write!(f, "lock_free"),
        }
    }
}

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, and which engine is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of connections opened eagerly when the pool is created
    initial_size: usize,
    /// Ceiling on the number of connections the pool may own
    max_active: usize,
    /// Timeout in milliseconds for a single liveness check
    validation_timeout_ms: u64,
    /// Timeout in milliseconds a caller waits for a released connection
    wait_timeout_ms: u64,
    /// Engine implementing the pool
    strategy: PoolStrategy,
}

impl PoolConfig {
    /// Create a new pool configuration with the given initial and maximum sizes
    ///
    /// # Panics
    ///
    /// Panics if `initial_size > max_active` or if `max_active` is 0.
    pub fn new(initial_size: usize, max_active: usize) -> Self {
        assert!(
            max_active > 0,
            "max_active must be greater than 0, got {}",
            max_active
        );
        assert!(
            initial_size <= max_active,
            "initial_size ({}) cannot exceed max_active ({})",
            initial_size,
            max_active
        );

        Self {
            initial_size,
            max_active,
            validation_timeout_ms: 2_000, // 2 seconds default
            wait_timeout_ms: 3_000,       // 3 seconds default
            strategy: PoolStrategy::default(),
        }
    }

    /// Load a configuration from a TOML document
    ///
    /// Missing keys take their default values.
    ///
    /// ```
    /// use cistern_connection::pool::{PoolConfig, PoolStrategy};
    ///
    /// let config = PoolConfig::from_toml_str("max_active = 20\nstrategy = \"monitor\"").unwrap();
    /// assert_eq!(config.max_active(), 20);
    /// assert_eq!(config.strategy(), PoolStrategy::Monitor);
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CisternError::Configuration(format!("Invalid pool config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading pool config");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check the sizing constraints without panicking
    pub fn validate(&self) -> Result<()> {
        if self.max_active == 0 {
            return Err(CisternError::Configuration(
                "max_active must be greater than 0".into(),
            ));
        }
        if self.initial_size > self.max_active {
            return Err(CisternError::Configuration(format!(
                "initial_size ({}) cannot exceed max_active ({})",
                self.initial_size, self.max_active
            )));
        }
        Ok(())
    }

    /// Set the number of connections opened at creation
    ///
    /// Not checked against `max_active`; call [`PoolConfig::validate`].
    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    /// Set the ceiling on owned connections
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Set the liveness check timeout in milliseconds
    pub fn with_validation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.validation_timeout_ms = timeout_ms;
        self
    }

    /// Set the wait timeout in milliseconds
    pub fn with_wait_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait_timeout_ms = timeout_ms;
        self
    }

    /// Set the engine strategy
    pub fn with_strategy(mut self, strategy: PoolStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Get the initial pool size
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    /// Get the maximum number of owned connections
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Get the liveness check timeout as a Duration
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    /// Get the wait timeout as a Duration
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Get the engine strategy
    pub fn strategy(&self) -> PoolStrategy {
        self.strategy
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - initial_size: 10
    /// - max_active: 100
    /// - validation_timeout: 2 seconds
    /// - wait_timeout: 3 seconds
    /// - strategy: lock_free
    fn default() -> Self {
        Self::new(10, 100)
    }
}
