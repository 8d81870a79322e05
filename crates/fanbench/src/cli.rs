//! Command-line entry point compiled into the user's benchmark binary
//!
//! The same executable serves all three roles: `start` runs the master,
//! `slave` waits for a master, and worker children are diverted by an
//! environment flag before any argument parsing, because they are spawned
//! without arguments.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fanbench_common::defaults::{DEFAULT_PORT, default_worker_count};
use garde::Validate;

use crate::benchmark::BenchmarkDefine;
use crate::master_runner::MasterRunner;
use crate::slave_runner::SlaveRunner;
use crate::worker_process::{WORKER_ENV, run_worker};

#[derive(Parser, Debug)]
#[command(about = "Distributed load benchmark runner")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the benchmark with this machine as the master
    Start {
        /// Number of local worker processes (default: one per CPU)
        #[arg(long)]
        workers: Option<usize>,

        /// Comma-separated slave addresses (host or host:port)
        #[arg(long)]
        slaves: Option<String>,

        /// Write the full JSON report to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Wait for a master connection and run workers on its behalf
    Slave {
        /// Number of local worker processes (default: one per CPU)
        #[arg(long)]
        workers: Option<usize>,

        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

/// Entry point for a benchmark binary; call from `main` with the definition
/// the binary was built around.
pub fn main(define: BenchmarkDefine) {
    if let Err(e) = run(define) {
        print_error(&e);
        std::process::exit(1);
    }
}

fn run(define: BenchmarkDefine) -> anyhow::Result<()> {
    // Stdout belongs to progress output (and to the RPC channel in worker
    // children), so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    if std::env::var_os(WORKER_ENV).is_some() {
        runtime.block_on(run_worker(define));
        return Ok(());
    }

    let args = Args::parse();
    define
        .config
        .validate()
        .context("invalid benchmark configuration")?;

    match args.command {
        Command::Start {
            workers,
            slaves,
            output,
        } => {
            let worker_count = workers.unwrap_or_else(default_worker_count);
            let slave_addrs = parse_slave_list(slaves.as_deref());
            let runner = MasterRunner::new(define, worker_count, slave_addrs, output);
            runtime.block_on(runner.run())?;
        }
        Command::Slave { workers, port } => {
            let worker_count = workers.unwrap_or_else(default_worker_count);
            runtime.block_on(SlaveRunner::new(port, worker_count).run())?;
        }
    }

    Ok(())
}

/// Parse the comma-separated slave list
fn parse_slave_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    // Print main error message
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    // Print error chain (causes)
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    // Only print backtrace hint if not already showing
    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}
