//! Slave role: host a worker pool and serve exactly one master
//!
//! A slave spawns its workers, accepts a single TCP connection, and from
//! then on relays the master's pool-level calls to its local workers. The
//! connection is the run's lifetime: the slave exits on `stop` or when the
//! master goes away.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use fanbench_common::{AssignParam, BenchmarkTestResult, ValidationInfo};
use fanbench_rpc::{MessageSocket, RpcError, RpcServer, decode_params};
use futures::future;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::APP_VERSION;
use crate::error::WorkerError;
use crate::process_manager::ProcessManager;
use crate::worker::Worker;

/// Slave role configuration; the task itself lives in the worker children,
/// which re-enter `main` from the same executable
pub struct SlaveRunner {
    port: u16,
    worker_count: usize,
}

impl SlaveRunner {
    pub fn new(port: u16, worker_count: usize) -> Self {
        Self { port, worker_count }
    }

    /// Serve one master connection to completion
    pub async fn run(self) -> anyhow::Result<()> {
        let process_manager = ProcessManager::spawn_workers(self.worker_count)?;
        let validation = ValidationInfo::for_current_exe(APP_VERSION)
            .context("failed to fingerprint this executable")?;

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .with_context(|| format!("failed to bind slave port {}", self.port))?;
        info!(port = self.port, "waiting for master connection...");
        let (stream, peer) = listener
            .accept()
            .await
            .context("failed to accept master connection")?;
        info!(peer = %peer, "master connection established");
        // Single-master protocol: no further connections are accepted
        drop(listener);

        let pool = SlavePool::new(process_manager.workers().to_vec(), validation);
        let token = CancellationToken::new();
        let server = pool.server(&token);

        tokio::select! {
            _ = server.serve(MessageSocket::from_tcp(stream)) => info!("master connection closed"),
            _ = token.cancelled() => info!("finished"),
        }
        Ok(())
    }
}

/// A slave's pool of local workers, served to one master over RPC
///
/// [`SlaveRunner`] wraps this in the standalone slave binary; it is public
/// so a pool can also be embedded and served over any accepted connection.
pub struct SlavePool {
    workers: Vec<Worker>,
    assigned: Mutex<Vec<Worker>>,
    validation: ValidationInfo,
}

impl SlavePool {
    pub fn new(workers: Vec<Worker>, validation: ValidationInfo) -> Arc<Self> {
        Arc::new(Self {
            workers,
            assigned: Mutex::new(Vec::new()),
            validation,
        })
    }

    /// Build the RPC server exposing this pool's methods; `stop` cancels
    /// `token` once the reply is on the wire
    pub fn server(self: &Arc<Self>, token: &CancellationToken) -> RpcServer {
        let mut server = RpcServer::new();

        let pool = Arc::clone(self);
        server.method("getValidationInfo", move |_params| {
            let pool = Arc::clone(&pool);
            async move { encode(pool.validation.clone()) }
        });

        let pool = Arc::clone(self);
        server.method("getWorkerNum", move |_params| {
            let pool = Arc::clone(&pool);
            async move { Ok(json!(pool.workers.len())) }
        });

        let pool = Arc::clone(self);
        server.method("assignWorkers", move |params| {
            let pool = Arc::clone(&pool);
            async move {
                let params: Vec<AssignParam> = decode_params(params)?;
                pool.assign_workers(params).await
            }
        });

        let pool = Arc::clone(self);
        server.method("start", move |_params| {
            let pool = Arc::clone(&pool);
            async move { pool.start().await }
        });

        let pool = Arc::clone(self);
        server.method("finish", move |_params| {
            let pool = Arc::clone(&pool);
            async move { pool.finish().await }
        });

        let pool = Arc::clone(self);
        server.method("fetchTestResults", move |_params| {
            let pool = Arc::clone(&pool);
            async move { pool.fetch_test_results().await }
        });

        let pool = Arc::clone(self);
        server.method("handleFinished", move |params| {
            let pool = Arc::clone(&pool);
            async move {
                let worker_id: u32 = decode_params(params)?;
                pool.handle_finished(worker_id).await
            }
        });

        let stop_token = token.clone();
        server.method("stop", move |_params| {
            let stop_token = stop_token.clone();
            async move {
                // Reply first; cancellation follows once the reply is on the wire
                tokio::spawn(async move {
                    sleep(Duration::from_millis(50)).await;
                    stop_token.cancel();
                });
                Ok(Value::Null)
            }
        });

        server
    }

    async fn assign_workers(&self, params: Vec<AssignParam>) -> Result<Value, RpcError> {
        let count = params.len();
        let assigned: Vec<Worker> = self.workers.iter().take(count).cloned().collect();
        let assignments = assigned
            .iter()
            .zip(params)
            .map(|(worker, param)| worker.assign(param));
        future::try_join_all(assignments).await.map_err(to_rpc_error)?;

        info!("{} workers are assigned.", count);
        *self.assigned.lock().unwrap() = assigned;
        Ok(Value::Null)
    }

    async fn start(&self) -> Result<Value, RpcError> {
        let assigned = self.assigned.lock().unwrap().clone();
        future::try_join_all(assigned.iter().map(Worker::start))
            .await
            .map_err(to_rpc_error)?;
        info!("running");
        Ok(Value::Null)
    }

    async fn finish(&self) -> Result<Value, RpcError> {
        let assigned = self.assigned.lock().unwrap().clone();
        future::try_join_all(assigned.iter().map(Worker::finish))
            .await
            .map_err(to_rpc_error)?;
        Ok(Value::Null)
    }

    async fn fetch_test_results(&self) -> Result<Value, RpcError> {
        let assigned = self.assigned.lock().unwrap().clone();
        let results = future::try_join_all(assigned.iter().map(Worker::fetch_test_results))
            .await
            .map_err(to_rpc_error)?;
        let all: Vec<BenchmarkTestResult> = results.into_iter().flatten().collect();
        encode(all)
    }

    async fn handle_finished(&self, worker_id: u32) -> Result<Value, RpcError> {
        let worker = self
            .assigned
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.worker_id() == Some(worker_id))
            .cloned();
        let Some(worker) = worker else {
            return Err(RpcError::server_error(format!(
                "worker {worker_id} is not found"
            )));
        };
        let results = worker.handle_finished().await.map_err(to_rpc_error)?;
        encode(results)
    }
}

/// Relay a worker failure to the master, keeping the original code and
/// message when the failure itself was an RPC error from the worker process
fn to_rpc_error(error: WorkerError) -> RpcError {
    match error {
        WorkerError::Rpc(fanbench_rpc::ClientError::Rpc(rpc)) => rpc,
        other => RpcError::server_error(other.to_string()),
    }
}

fn encode<T: serde::Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}
