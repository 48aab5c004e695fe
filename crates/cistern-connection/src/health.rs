//! Liveness checking for pooled connections
//!
//! The pool checks a connection before lending it out again. A check is
//! bounded by a timeout; a connection that does not answer in time is
//! treated as dead.
//!
//! # Example
//!
//! ```ignore
//! use cistern_connection::health::check_liveness;
//!
//! let latency = check_liveness(&*connection, Duration::from_secs(2)).await?;
//! println!("Connection answered in {:?}", latency);
//! ```

mod liveness;


pub use liveness::{LivenessError, LivenessResult, check_liveness, is_alive};
