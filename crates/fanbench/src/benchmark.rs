//! Benchmark run unit driven by the user task
//!
//! A [`Benchmark`] is the object a user task interacts with: it begins trials,
//! polls whether the run is still active, and buffers finished trial results
//! until a drain collects them. One lives in each worker process, constructed
//! from that worker's assignment.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fanbench_common::{BenchmarkConfig, BenchmarkTestResult, RosterEntry, timestamp_millis};
use futures::future::BoxFuture;

/// The user's workload, boxed so it can be cloned into every worker process
pub type TaskFn = Arc<dyn Fn(Arc<Benchmark>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A complete benchmark definition: configuration plus the task to run
///
/// Built once in the user's `main` and handed to [`crate::cli::main`]; the
/// same value is compiled into master, slave, and worker alike.
#[derive(Clone)]
pub struct BenchmarkDefine {
    pub config: BenchmarkConfig,
    task: TaskFn,
}

impl BenchmarkDefine {
    pub fn new<F, Fut>(config: BenchmarkConfig, task: F) -> Self
    where
        F: Fn(Arc<Benchmark>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            config,
            task: Arc::new(move |benchmark| Box::pin(task(benchmark))),
        }
    }

    pub(crate) fn task(&self) -> TaskFn {
        Arc::clone(&self.task)
    }
}

/// State of one execution unit's run, shared with the user task
pub struct Benchmark {
    request_num: u32,
    worker_id: u32,
    workers: Vec<RosterEntry>,
    active: AtomicBool,
    finished_results: Mutex<Vec<BenchmarkTestResult>>,
}

impl Benchmark {
    pub fn new(request_num: u32, worker_id: u32, workers: Vec<RosterEntry>) -> Arc<Self> {
        Arc::new(Self {
            request_num,
            worker_id,
            workers,
            active: AtomicBool::new(true),
            finished_results: Mutex::new(Vec::new()),
        })
    }

    /// Concurrency share assigned to this unit; the task is invoked once
    /// and fans out over this many request loops itself
    pub fn request_num(&self) -> u32 {
        self.request_num
    }

    /// This unit's id within the run
    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    /// The full roster distributed to every unit of the run
    pub fn workers(&self) -> &[RosterEntry] {
        &self.workers
    }

    /// Whether the run is still active
    ///
    /// Task loops must poll this at their own cadence; the runtime never
    /// interrupts an in-flight trial.
    pub fn running(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Ask the task loop to wind down; idempotent
    pub fn request_finish(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Begin one trial in `group`
    pub fn test(self: &Arc<Self>, group: impl Into<String>) -> BenchmarkTest {
        BenchmarkTest {
            benchmark: Arc::clone(self),
            group: group.into(),
            begin_time: timestamp_millis(),
        }
    }

    /// Take and clear the buffer of finished trial results
    pub fn fetch_finished_tests(&self) -> Vec<BenchmarkTestResult> {
        std::mem::take(&mut *self.finished_results.lock().unwrap())
    }

    fn record(&self, result: BenchmarkTestResult) {
        self.finished_results.lock().unwrap().push(result);
    }
}

/// One in-flight trial
///
/// Terminating consumes the trial, so it can end at most once. A trial that
/// is dropped without calling [`success`](Self::success) or
/// [`error`](Self::error) never produces a result.
pub struct BenchmarkTest {
    benchmark: Arc<Benchmark>,
    group: String,
    begin_time: i64,
}

impl BenchmarkTest {
    /// Group label this trial was begun under
    pub fn group(&self) -> &str {
        &self.group
    }

    /// End the trial successfully
    pub fn success(self) {
        let Self {
            benchmark,
            group,
            begin_time,
        } = self;
        benchmark.record(BenchmarkTestResult::success(group, begin_time, timestamp_millis()));
    }

    /// End the trial as failed; `reason` is recorded with the result
    pub fn error(self, reason: impl Into<String>) {
        let Self {
            benchmark,
            group,
            begin_time,
        } = self;
        benchmark.record(BenchmarkTestResult::error(
            group,
            begin_time,
            timestamp_millis(),
            reason,
        ));
    }
}
