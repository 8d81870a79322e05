//! Master-side handle for one local worker process
//!
//! Thin RPC wrapper; assignment state lives here so a lifecycle call on a
//! never-assigned worker fails locally instead of confusing the child.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use fanbench_common::{AssignParam, BenchmarkTestResult};
use fanbench_rpc::{ClientError, MessageSocket, RpcClient};

use crate::error::WorkerError;

/// Unassigned sentinel; real worker ids start at 1
const UNASSIGNED: u32 = 0;

/// Handle to one local worker process
///
/// Clones share the connection and the assignment state.
#[derive(Clone)]
pub struct Worker {
    client: RpcClient,
    worker_id: Arc<AtomicU32>,
}

impl Worker {
    pub fn new(socket: MessageSocket) -> Self {
        Self {
            client: RpcClient::new(socket),
            worker_id: Arc::new(AtomicU32::new(UNASSIGNED)),
        }
    }

    /// Id assigned to this worker, `None` before assignment
    pub fn worker_id(&self) -> Option<u32> {
        match self.worker_id.load(Ordering::Relaxed) {
            UNASSIGNED => None,
            id => Some(id),
        }
    }

    fn assigned_id(&self) -> Result<u32, WorkerError> {
        self.worker_id().ok_or(WorkerError::NotAssigned)
    }

    /// Send the worker its assignment and remember the id on success
    pub async fn assign(&self, param: AssignParam) -> Result<(), WorkerError> {
        let params = serde_json::to_value(&param).map_err(ClientError::from)?;
        self.client.call("assign", Some(params)).await?;
        self.worker_id.store(param.worker_id, Ordering::Relaxed);
        Ok(())
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        self.assigned_id()?;
        self.client.call("start", None).await?;
        Ok(())
    }

    pub async fn finish(&self) -> Result<(), WorkerError> {
        self.assigned_id()?;
        self.client.call("finish", None).await?;
        Ok(())
    }

    /// Drain results buffered since the previous drain
    pub async fn fetch_test_results(&self) -> Result<Vec<BenchmarkTestResult>, WorkerError> {
        self.assigned_id()?;
        Ok(self.client.request("fetchFinishedResults", None).await?)
    }

    /// Wait for the worker's task to settle; yields its closing results
    pub async fn handle_finished(&self) -> Result<Vec<BenchmarkTestResult>, WorkerError> {
        self.assigned_id()?;
        Ok(self.client.request("handleFinished", None).await?)
    }
}
