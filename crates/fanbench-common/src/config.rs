//! User-facing benchmark configuration
//!
//! The configuration travels inside the final report, so its serialized
//! field names are part of the stable report schema.

use serde::{Deserialize, Serialize};

/// Configuration of one benchmark run, supplied by the user alongside the
/// task function.
///
/// Validation is done via `garde::Validate` before any process is spawned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, garde::Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BenchmarkConfig {
    /// Human-readable benchmark title
    #[garde(length(min = 1))]
    pub title: String,

    /// Free-form description shown in the run header
    #[garde(skip)]
    pub description: String,

    /// Seconds between live progress reports
    #[garde(range(min = 1))]
    pub measurement_interval_seconds: u64,

    /// Total run duration in seconds
    #[garde(range(min = 1))]
    pub duration_seconds: u64,

    /// Requested concurrency, partitioned across all execution units
    #[garde(range(min = 1))]
    pub concurrent_request_count: u32,
}
