//! Cistern Drivers - Driver registry and built-in drivers
//!
//! Drivers are looked up by identifier when a pool is first requested for a
//! backend. The `sim` driver is an in-process stand-in used by tests and the
//! load harness.

mod registry;
#[cfg(feature = "sim")]
pub mod sim;

pub use registry::DriverRegistry;
#[cfg(feature = "sim")]
pub use sim::{SimConnection, SimulatedDriver};

/// Re-export commonly used types from cistern-core
pub use cistern_core::{CisternError, Connection, ConnectionConfig, DatabaseDriver, Result};
