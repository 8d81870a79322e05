//! Streaming result aggregation and the final run report
//!
//! The master feeds drained results into an [`Aggregator`] as they arrive;
//! the same aggregation pass then serves both the live progress windows and
//! the end-of-run totals. Group breakdowns preserve first-seen order.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use fanbench_common::stats::{average, maximum, median, minimum, round2};
use fanbench_common::{BenchmarkConfig, BenchmarkTestResult};
use indexmap::IndexMap;
use serde::Serialize;

/// Accumulates finished-trial results in arrival order
#[derive(Default)]
pub struct Aggregator {
    results: Vec<BenchmarkTestResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_results(&mut self, results: Vec<BenchmarkTestResult>) {
        self.results.extend(results);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> Vec<BenchmarkTestResult> {
        self.results
    }

    /// Summarize a window of the accumulated results
    ///
    /// The window starts at `offset` (default 0) and spans `limit` results
    /// (default: everything after `offset`); both are clamped to what has
    /// actually arrived. `duration_ms` is the wall-clock span the window
    /// covers and only feeds the throughput figure.
    pub fn aggregate(&self, duration_ms: u64, offset: Option<usize>, limit: Option<usize>) -> Stats {
        let len = self.results.len();
        let start = offset.unwrap_or(0).min(len);
        let end = limit.map(|l| (start + l).min(len)).unwrap_or(len);
        let window = &self.results[start..end];

        let mut groups: IndexMap<String, Vec<BenchmarkTestResult>> = IndexMap::new();
        for result in window {
            groups
                .entry(result.group.clone())
                .or_default()
                .push(result.clone());
        }

        Stats {
            total: summarize(window, duration_ms),
            groups: groups
                .into_iter()
                .map(|(group, results)| GroupResult {
                    group,
                    summary: summarize(&results, duration_ms),
                })
                .collect(),
        }
    }
}

/// Aggregated view of one result window
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Stats {
    pub total: ResultSummary,
    pub groups: Vec<GroupResult>,
}

/// Summary of the trials sharing one group label
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupResult {
    pub group: String,
    #[serde(flatten)]
    pub summary: ResultSummary,
}

/// Latency, throughput, and outcome figures for a set of trials
///
/// Latency figures are `None` (serialized as JSON null) when the set is
/// empty. Throughput over a zero-length span is non-finite, which also
/// serializes as null.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub requests: usize,
    pub duration_ms: u64,
    pub avg_ms: Option<f64>,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub median_ms: Option<f64>,
    pub rps: f64,
    pub success_count: usize,
    pub error_count: usize,
    pub success_rate: f64,
    pub error_rate: f64,
    pub errors: Vec<String>,
}

fn summarize(results: &[BenchmarkTestResult], duration_ms: u64) -> ResultSummary {
    let requests = results.len();
    let durations: Vec<f64> = results.iter().map(|r| r.duration as f64).collect();
    let success_count = results.iter().filter(|r| r.is_success()).count();
    let error_count = requests - success_count;
    let (success_rate, error_rate) = if requests == 0 {
        (0.0, 0.0)
    } else {
        (
            round2(success_count as f64 / requests as f64 * 100.0),
            round2(error_count as f64 / requests as f64 * 100.0),
        )
    };

    ResultSummary {
        requests,
        duration_ms,
        avg_ms: average(&durations).map(round2),
        min_ms: minimum(&durations).map(round2),
        max_ms: maximum(&durations).map(round2),
        median_ms: median(&durations).map(round2),
        rps: round2(requests as f64 / (duration_ms as f64 / 1000.0)),
        success_count,
        error_count,
        success_rate,
        error_rate,
        errors: results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.error_result.clone())
            .collect(),
    }
}

/// Complete record of one finished run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub config: BenchmarkConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub assigned_worker_count: usize,
    pub test_results: Vec<BenchmarkTestResult>,
    pub stats: Stats,
}

impl Report {
    pub fn new(
        config: BenchmarkConfig,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        assigned_worker_count: usize,
        aggregator: Aggregator,
    ) -> Self {
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let stats = aggregator.aggregate(duration_ms, None, None);
        Self {
            config,
            started_at,
            finished_at,
            assigned_worker_count,
            test_results: aggregator.into_results(),
            stats,
        }
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }
}
