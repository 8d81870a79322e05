//! RPC service run inside each worker child process
//!
//! The parent drives a worker over five methods. `assign` seeds the
//! benchmark state, `start` invokes the user task, `finish` requests
//! wind-down, `fetchFinishedResults` drains buffered results, and
//! `handleFinished` yields the run's single completion event together with
//! the results that were still buffered when the task settled.

use std::sync::{Arc, Mutex};

use fanbench_common::{AssignParam, BenchmarkTestResult};
use fanbench_rpc::{MessageSocket, RpcServer, decode_params};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::benchmark::{Benchmark, BenchmarkDefine};
use crate::error::ProcessError;

/// Set in a child's environment to divert it into worker mode
pub const WORKER_ENV: &str = "FANBENCH_WORKER";

type Outcome = Result<Vec<BenchmarkTestResult>, String>;

/// How the run's completion event has been consumed so far
///
/// The event fires exactly once and may be claimed exactly once, whether
/// the claim arrives before or after the task settles.
enum Completion {
    /// Task not settled, nobody waiting
    Pending,
    /// Task not settled, a `handleFinished` call is parked
    Waiting(oneshot::Sender<Outcome>),
    /// Task settled; `Some` until the stored outcome is claimed
    Finished(Option<Outcome>),
}

/// One worker process's benchmark state, served to the parent over RPC
pub struct WorkerProcess {
    define: BenchmarkDefine,
    benchmark: Mutex<Option<Arc<Benchmark>>>,
    completion: Mutex<Completion>,
}

impl WorkerProcess {
    pub fn new(define: BenchmarkDefine) -> Arc<Self> {
        Arc::new(Self {
            define,
            benchmark: Mutex::new(None),
            completion: Mutex::new(Completion::Pending),
        })
    }

    /// Build the RPC server exposing this process's methods
    pub fn server(self: &Arc<Self>) -> RpcServer {
        let mut server = RpcServer::new();

        let process = Arc::clone(self);
        server.method("assign", move |params| {
            let process = Arc::clone(&process);
            async move {
                let param: AssignParam = decode_params(params)?;
                process.assign(param);
                Ok(Value::Null)
            }
        });

        let process = Arc::clone(self);
        server.method("start", move |_params| {
            let process = Arc::clone(&process);
            async move {
                process.start()?;
                Ok(Value::Null)
            }
        });

        let process = Arc::clone(self);
        server.method("finish", move |_params| {
            let process = Arc::clone(&process);
            async move {
                process.finish()?;
                Ok(Value::Null)
            }
        });

        let process = Arc::clone(self);
        server.method("fetchFinishedResults", move |_params| {
            let process = Arc::clone(&process);
            async move { encode_results(process.fetch_finished_results()?) }
        });

        let process = Arc::clone(self);
        server.method("handleFinished", move |_params| {
            let process = Arc::clone(&process);
            async move { encode_results(process.handle_finished().await?) }
        });

        server
    }

    fn assign(&self, param: AssignParam) {
        debug!(worker_id = param.worker_id, request_num = param.request_num, "assigned");
        let benchmark = Benchmark::new(param.request_num, param.worker_id, param.workers);
        *self.benchmark.lock().unwrap() = Some(benchmark);
    }

    /// Invoke the user's task function once, handing it the shared benchmark
    /// state. Fanning out over the assigned share happens inside the task
    /// itself; the spawned driver settles the completion slot when the
    /// task's asynchronous body returns.
    fn start(self: &Arc<Self>) -> Result<(), ProcessError> {
        let benchmark = self
            .benchmark
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProcessError::StartBeforeAssign)?;
        let task = self.define.task();
        let process = Arc::clone(self);

        tokio::spawn(async move {
            let outcome = match task(Arc::clone(&benchmark)).await {
                Ok(()) => Ok(benchmark.fetch_finished_tests()),
                Err(error) => Err(format!("{error:#}")),
            };
            process.settle(outcome);
        });
        Ok(())
    }

    fn finish(&self) -> Result<(), ProcessError> {
        let benchmark = self
            .benchmark
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProcessError::FinishBeforeAssign)?;
        benchmark.request_finish();
        Ok(())
    }

    fn fetch_finished_results(&self) -> Result<Vec<BenchmarkTestResult>, ProcessError> {
        let benchmark = self
            .benchmark
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProcessError::FetchBeforeAssign)?;
        Ok(benchmark.fetch_finished_tests())
    }

    /// Claim the completion event, parking until the task settles if it has
    /// not yet. At most one claim per run succeeds.
    async fn handle_finished(&self) -> Result<Vec<BenchmarkTestResult>, ProcessError> {
        if self.benchmark.lock().unwrap().is_none() {
            return Err(ProcessError::FinishBeforeAssign);
        }

        let rx = {
            let mut completion = self.completion.lock().unwrap();
            match std::mem::replace(&mut *completion, Completion::Finished(None)) {
                Completion::Pending => {
                    let (tx, rx) = oneshot::channel();
                    *completion = Completion::Waiting(tx);
                    rx
                }
                Completion::Waiting(tx) => {
                    *completion = Completion::Waiting(tx);
                    return Err(ProcessError::AlreadyHandled);
                }
                Completion::Finished(Some(outcome)) => return outcome.map_err(ProcessError::Task),
                Completion::Finished(None) => return Err(ProcessError::AlreadyHandled),
            }
        };

        let outcome = rx.await.map_err(|_| ProcessError::AlreadyHandled)?;
        outcome.map_err(ProcessError::Task)
    }

    /// Record the task's outcome: hand it to a parked waiter if one exists,
    /// otherwise store it for the claim that has not arrived yet.
    fn settle(&self, outcome: Outcome) {
        let mut completion = self.completion.lock().unwrap();
        match std::mem::replace(&mut *completion, Completion::Finished(None)) {
            Completion::Waiting(tx) => {
                let _ = tx.send(outcome);
            }
            Completion::Pending => *completion = Completion::Finished(Some(outcome)),
            Completion::Finished(stored) => *completion = Completion::Finished(stored),
        }
    }
}

fn encode_results(results: Vec<BenchmarkTestResult>) -> Result<Value, fanbench_rpc::RpcError> {
    serde_json::to_value(results).map_err(|e| fanbench_rpc::RpcError::internal_error(e.to_string()))
}

/// Entry point of a process spawned in worker mode; serves the parent over
/// this process's stdin/stdout until the parent closes the pipes.
pub async fn run_worker(define: BenchmarkDefine) {
    let process = WorkerProcess::new(define);
    process.server().serve(MessageSocket::stdio()).await;
}
