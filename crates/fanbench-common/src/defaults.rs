//! Default configuration values shared between master and slave roles
//!
//! These constants keep the two sides of a run agreeing on ports and cadences.

/// Default TCP port a slave listens on for its master
pub const DEFAULT_PORT: u16 = 8080;

/// Cadence of the periodic result drain on the master, in milliseconds
pub const AGGREGATE_INTERVAL_MS: u64 = 1000;

/// Default number of worker processes: one per available CPU
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
