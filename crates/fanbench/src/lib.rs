//! fanbench - distributed load benchmark runner
//!
//! Define one benchmark (a configuration plus an async task), compile it
//! into a binary, and run that same binary in any role: master, slave, or
//! worker child. The master partitions the requested concurrency across
//! every process, streams finished-trial results back while the run is
//! still going, and renders live figures plus a final report.
//!
//! The task function runs once per execution unit and owns its own fan-out:
//! it starts one request loop per slot of [`Benchmark::request_num`] and
//! keeps them going while the unit reports itself active.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fanbench::{Benchmark, BenchmarkConfig, BenchmarkDefine};
//! use futures::future;
//!
//! fn main() {
//!     let config = BenchmarkConfig {
//!         title: "http get".into(),
//!         description: String::new(),
//!         measurement_interval_seconds: 10,
//!         duration_seconds: 60,
//!         concurrent_request_count: 100,
//!     };
//!     let define = BenchmarkDefine::new(config, |benchmark: Arc<Benchmark>| async move {
//!         let units = (0..benchmark.request_num()).map(|_| {
//!             let benchmark = Arc::clone(&benchmark);
//!             async move {
//!                 while benchmark.running() {
//!                     let trial = benchmark.test("get /");
//!                     trial.success();
//!                 }
//!             }
//!         });
//!         future::join_all(units).await;
//!         Ok(())
//!     });
//!     fanbench::cli::main(define);
//! }
//! ```

pub mod benchmark;
pub mod cli;
pub mod console;
pub mod error;
pub mod manager;
pub mod master_runner;
pub mod process_manager;
pub mod report;
pub mod slave;
pub mod slave_runner;
pub mod worker;
pub mod worker_process;

pub use benchmark::{Benchmark, BenchmarkDefine, BenchmarkTest};
pub use fanbench_common::{BenchmarkConfig, BenchmarkTestResult, EndState};
pub use report::{Report, Stats};

/// Version exchanged when the master validates its slaves
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
