//! Database driver trait definition

use crate::{Connection, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Core driver trait that all database drivers must implement
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "postgres", "mysql", "sqlite")
    fn id(&self) -> &'static str {
        self.name()
    }

    /// Human-readable name (e.g., "PostgreSQL", "MySQL", "SQLite")
    fn name(&self) -> &'static str;

    /// Driver version
    fn version(&self) -> &'static str {
        "0.1.0"
    }

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Test connection without keeping it open
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = self.connect(config).await?;
        conn.close().await
    }
}

/// Connection configuration
///
/// The pool hands this to a driver every time it needs a fresh connection.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "postgres", "mysql", "sqlite")
    pub driver: String,
    /// Driver-specific connection URL
    pub url: String,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Additional connection parameters
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration without credentials
    pub fn new(driver: &str, url: &str) -> Self {
        Self {
            driver: driver.to_string(),
            url: url.to_string(),
            username: None,
            password: None,
            params: HashMap::new(),
        }
    }

    /// Set username and password
    ///
    /// Empty strings are treated as "not provided".
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = (!username.is_empty()).then(|| username.to_string());
        self.password = (!password.is_empty()).then(|| password.to_string());
        self
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        // First check params
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        // Check known fields
        match key {
            "url" => Some(self.url.clone()),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("params", &self.params)
            .finish()
    }
}
