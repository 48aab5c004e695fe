//! Error types for Cistern

use thiserror::Error;

/// Core error type for Cistern operations
#[derive(Error, Debug)]
pub enum CisternError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CisternError {
    /// Whether this error came from a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CisternError::Timeout(_))
    }
}

/// Result type alias for Cistern operations
pub type Result<T> = std::result::Result<T, CisternError>;
