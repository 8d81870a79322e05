//! Master role: drive one complete benchmark run
//!
//! The master spawns its local workers, connects and validates every slave,
//! partitions the concurrency, then runs a single event loop until each
//! assigned unit has reported completion. The loop multiplexes four streams:
//! the run-duration timer, the periodic result drain, the progress report
//! cadence, and the completion events themselves.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use chrono::Utc;
use fanbench_common::defaults::AGGREGATE_INTERVAL_MS;
use fanbench_common::{BenchmarkConfig, ValidationInfo};
use futures::future;
use tokio::time::{interval_at, sleep};
use tracing::{error, info};

use crate::APP_VERSION;
use crate::benchmark::BenchmarkDefine;
use crate::console::ConsoleView;
use crate::manager::WorkerManager;
use crate::process_manager::ProcessManager;
use crate::report::{Aggregator, Report};
use crate::slave::Slave;

pub struct MasterRunner {
    define: BenchmarkDefine,
    worker_count: usize,
    slave_addrs: Vec<String>,
    output: Option<PathBuf>,
}

impl MasterRunner {
    pub fn new(
        define: BenchmarkDefine,
        worker_count: usize,
        slave_addrs: Vec<String>,
        output: Option<PathBuf>,
    ) -> Self {
        Self {
            define,
            worker_count,
            slave_addrs,
            output,
        }
    }

    pub async fn run(self) -> anyhow::Result<Report> {
        let mut view = ConsoleView::new();
        view.show_header(&self.define.config);

        let process_manager = ProcessManager::spawn_workers(self.worker_count)?;
        let slaves =
            future::try_join_all(self.slave_addrs.iter().map(|addr| Slave::open(addr))).await?;

        if !slaves.is_empty() {
            let local = ValidationInfo::for_current_exe(APP_VERSION)
                .context("failed to fingerprint this executable")?;
            validate_slaves(&local, &slaves).await?;
        }

        let manager = WorkerManager::new(process_manager.workers().to_vec(), slaves);
        let report = drive_run(&self.define.config, &manager, &mut view).await?;

        if let Some(path) = &self.output {
            report.write_json(path)?;
            info!(path = %path.display(), "Results written");
        }
        manager.stop_slaves().await;
        Ok(report)
    }
}

/// Every slave must run the same build as the master; a mismatch aborts the
/// run before any work is assigned
async fn validate_slaves(local: &ValidationInfo, slaves: &[Slave]) -> anyhow::Result<()> {
    for slave in slaves {
        let info = slave
            .validation_info()
            .await
            .with_context(|| format!("failed to read validation info from slave {}", slave.addr()))?;
        if !local.matches(&info) {
            bail!(
                "slave {} is running a different build; deploy the same executable to every machine",
                slave.addr()
            );
        }
    }
    Ok(())
}

/// Assign, start, and supervise the run until every assigned unit reports
async fn drive_run(
    config: &BenchmarkConfig,
    manager: &WorkerManager,
    view: &mut ConsoleView,
) -> anyhow::Result<Report> {
    let assigned = manager.assign(config.concurrent_request_count).await?;
    info!(assigned, "workers assigned");

    let started_at = Utc::now();
    let run_start = Instant::now();

    // Created before start so a short duration cannot be missed while the
    // start fan-out is in flight
    let run_duration = sleep(Duration::from_secs(config.duration_seconds));
    tokio::pin!(run_duration);

    let mut completions = manager.start().await?;

    let drain_period = Duration::from_millis(AGGREGATE_INTERVAL_MS);
    let mut drain_interval = interval_at(tokio::time::Instant::now() + drain_period, drain_period);
    let report_period = Duration::from_secs(config.measurement_interval_seconds);
    let mut report_interval =
        interval_at(tokio::time::Instant::now() + report_period, report_period);

    let mut aggregator = Aggregator::new();
    let mut before_offset = 0usize;
    let mut last_report = run_start;
    let mut completed = 0usize;
    let mut finish_sent = false;
    let mut drain_active = true;

    loop {
        tokio::select! {
            _ = &mut run_duration, if !finish_sent => {
                finish_sent = true;
                manager.finish().await.context("failed to send finish")?;
            }
            _ = drain_interval.tick(), if drain_active => {
                match manager.fetch_test_results().await {
                    Ok(results) => aggregator.add_results(results),
                    Err(e) => {
                        error!(error = %e, "result drain failed; live figures will lag until completion");
                        drain_active = false;
                    }
                }
            }
            _ = report_interval.tick() => {
                // Measured elapsed time, not the nominal interval, so the
                // throughput figure tolerates scheduler drift
                let now = Instant::now();
                let elapsed_secs = now.duration_since(run_start).as_secs_f64().round() as u64;
                let window_ms = now.duration_since(last_report).as_millis() as u64;
                last_report = now;
                let window = aggregator.aggregate(window_ms, Some(before_offset), None);
                view.show_progress(elapsed_secs, &window.total);
                before_offset += window.total.requests;
            }
            event = completions.recv() => match event {
                Some(Ok(results)) => {
                    aggregator.add_results(results);
                    completed += 1;
                    if completed == assigned {
                        break;
                    }
                }
                Some(Err(e)) => {
                    return Err(e).context("a worker failed during the run");
                }
                None => {
                    bail!("completion stream ended after {completed} of {assigned} workers");
                }
            }
        }
    }

    let finished_at = Utc::now();
    let report = Report::new(
        config.clone(),
        started_at,
        finished_at,
        assigned,
        aggregator,
    );
    view.show_results(&report);
    Ok(report)
}
