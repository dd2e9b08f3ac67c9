//! Shared utilities for seatlink
//!
//! This crate provides:
//! - Client identifiers
//! - Default paths for the socket and configuration file
//! - Per-client request rate limiting

mod ids;
mod paths;
mod rate_limit;

pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
