//! Tollgate - caching forward proxy with host blacklisting.
//!
//! This crate provides the pieces the `tollgate` binary is assembled from:
//!
//! - Command-line arguments ([`cli::Args`])
//! - Logging bootstrap with daily log files ([`logging::init_logging`])
//! - Config store and initial blacklist loading ([`bootstrap`])

pub mod bootstrap;
pub mod cli;
pub mod logging;

pub use cli::Args;
