//! Driver registry for managing available database drivers

use std::collections::HashMap;
use std::sync::Arc;

use cistern_core::DatabaseDriver;
use parking_lot::RwLock;

/// Registry of available database drivers
///
/// Registration takes `&self` so a shared registry can pick up drivers after
/// it has been handed out.
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn DatabaseDriver>>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        let registry = Self::new();

        #[cfg(feature = "sim")]
        registry.register(Arc::new(crate::sim::SimulatedDriver::new()));

        registry
    }

    /// Register a driver under its id, replacing any previous one
    pub fn register(&self, driver: Arc<dyn DatabaseDriver>) {
        let id = driver.id().to_string();
        tracing::info!(driver = %id, "registering database driver");
        if self.drivers.write().insert(id.clone(), driver).is_some() {
            tracing::debug!(driver = %id, "replaced previously registered driver");
        }
    }

    /// Get a driver by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.read().get(id).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %id, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver ids, sorted
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.drivers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Check if a driver is registered
    pub fn has(&self, id: &str) -> bool {
        self.drivers.read().contains_key(id)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
