//! fanbench-common - Shared types and utilities
//!
//! This crate provides the types shared by every fanbench process role
//! (master, slave, worker child), without any transport dependencies to
//! keep it lightweight.
//!
//! ## Modules
//!
//! - [`assign`]: Work-assignment wire types (roster entries, assign params)
//! - [`config`]: User-facing benchmark configuration
//! - [`defaults`]: Default configuration values
//! - [`result`]: Finished-trial record and its end state
//! - [`stats`]: Statistics primitives (sum/average/median/min/max)
//! - [`validation`]: Master/slave identity check material

pub mod assign;
pub mod config;
pub mod defaults;
pub mod result;
pub mod stats;
pub mod validation;

// Re-export commonly used types
pub use assign::{AssignParam, RosterEntry};
pub use config::BenchmarkConfig;
pub use result::{BenchmarkTestResult, EndState};
pub use validation::ValidationInfo;

/// Get the current timestamp in milliseconds since UNIX epoch.
///
/// Returns 0 if system time is before the epoch (should never happen in practice).
#[inline]
pub fn timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
