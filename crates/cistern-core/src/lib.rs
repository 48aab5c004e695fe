//! Cistern Core - Contracts shared by drivers and the connection pool
//!
//! This crate defines the narrow interface the pool needs from a database
//! driver and nothing more:
//!
//! - `DatabaseDriver` - Opens connections from a `ConnectionConfig`
//! - `Connection` - A live handle that can be checked for liveness and closed
//! - `CisternError` - The error taxonomy used across the workspace

mod connection;
mod driver;
mod error;

pub use connection::*;
pub use driver::*;
pub use error::*;
