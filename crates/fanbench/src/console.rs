//! Console rendering for the master: run header, live progress, final tables
//!
//! Progress lines stream to stdout as fixed-width columns so interval windows
//! line up under one header. The final report renders as tables, one row per
//! group plus a global row, followed by an error digest.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use fanbench_common::BenchmarkConfig;

use crate::report::{GroupResult, Report, ResultSummary};

const VIEW_WIDTH: usize = 82;
/// Errors shown in the final digest before the rest is elided
const ERROR_DISPLAY_MAX: usize = 5;

pub struct ConsoleView {
    progress_header_shown: bool,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self {
            progress_header_shown: false,
        }
    }

    /// Banner printed once before the run starts
    pub fn show_header(&self, config: &BenchmarkConfig) {
        println!("{}", "=".repeat(VIEW_WIDTH));
        println!("{:^width$}", format!("[ {} ]", config.title), width = VIEW_WIDTH);
        if !config.description.is_empty() {
            println!("{}", config.description);
        }
        println!();
        println!("duration: {} sec", config.duration_seconds);
        println!(
            "measurement interval: {} sec",
            config.measurement_interval_seconds
        );
        println!("{}", "=".repeat(VIEW_WIDTH));
    }

    /// One line per measurement window; the column header goes out with the
    /// first window only
    pub fn show_progress(&mut self, elapsed_secs: u64, summary: &ResultSummary) {
        if !self.progress_header_shown {
            self.progress_header_shown = true;
            println!(
                "{:<10}{:<10}{:<10}{:<10}{:<10}{:<10}{:<10}{}",
                "elapsed", "requests", "rps", "average", "min", "max", "median", "error"
            );
        }
        println!(
            "{:<10}{:<10}{:<10}{:<10}{:<10}{:<10}{:<10}{}",
            format!("{elapsed_secs}sec"),
            summary.requests,
            num_cell(Some(summary.rps), ""),
            num_cell(summary.avg_ms, "ms"),
            num_cell(summary.min_ms, "ms"),
            num_cell(summary.max_ms, "ms"),
            num_cell(summary.median_ms, "ms"),
            format!("{}({}%)", summary.error_count, summary.error_rate),
        );
    }

    /// Final tables and error digest
    pub fn show_results(&self, report: &Report) {
        println!();
        println!("{}", "=".repeat(VIEW_WIDTH));
        println!(
            "{:^width$}",
            format!("[ {} Result ]", report.config.title),
            width = VIEW_WIDTH
        );
        println!();

        if !report.stats.groups.is_empty() {
            println!("Group Result");
            println!("{}", group_table(&report.stats.groups));
            println!();
        }

        println!("Global Result");
        println!("started: {}", report.started_at);
        println!("finished: {}", report.finished_at);
        println!("duration: {} ms", report.stats.total.duration_ms);
        println!("workers: {}", report.assigned_worker_count);
        println!("{}", global_table(&report.stats.total));
        println!();

        print!("{}", render_errors(&report.stats.total.errors));
        println!("{}", "=".repeat(VIEW_WIDTH));
    }
}

impl Default for ConsoleView {
    fn default() -> Self {
        Self::new()
    }
}

fn summary_cells(summary: &ResultSummary) -> Vec<String> {
    vec![
        summary.requests.to_string(),
        num_cell(Some(summary.rps), ""),
        num_cell(summary.avg_ms, "ms"),
        num_cell(summary.min_ms, "ms"),
        num_cell(summary.max_ms, "ms"),
        num_cell(summary.median_ms, "ms"),
        format!("{}({}%)", summary.success_count, summary.success_rate),
        format!("{}({}%)", summary.error_count, summary.error_rate),
    ]
}

fn group_table(groups: &[GroupResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "group", "requests", "rps", "average", "min", "max", "median", "success", "error",
        ]);
    for group in groups {
        let mut cells = vec![group.group.clone()];
        cells.extend(summary_cells(&group.summary));
        table.add_row(cells);
    }
    table
}

fn global_table(total: &ResultSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "requests", "rps", "average", "min", "max", "median", "success", "error",
        ]);
    table.add_row(summary_cells(total));
    table
}

/// Format an optional figure; absent or non-finite values render as "-"
fn num_cell(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v}{unit}"),
        _ => "-".to_owned(),
    }
}

fn render_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        return "No errors are found.\n".to_owned();
    }
    let mut out = format!("{} errors are found.\n", errors.len());
    for error in errors.iter().take(ERROR_DISPLAY_MAX) {
        out.push_str(&format!("- {error}\n"));
    }
    if errors.len() > ERROR_DISPLAY_MAX {
        out.push_str(&format!("... and {} more\n", errors.len() - ERROR_DISPLAY_MAX));
    }
    out
}
