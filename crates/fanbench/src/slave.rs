//! Master-side handle for one remote slave machine
//!
//! A slave hosts its own pool of worker processes; the master addresses the
//! pool as a whole (`assignWorkers`, `start`, `finish`, `fetchTestResults`)
//! and individual members only for completion waits (`handleFinished`).

use std::sync::{Arc, Mutex};

use fanbench_common::defaults::DEFAULT_PORT;
use fanbench_common::{AssignParam, BenchmarkTestResult, ValidationInfo};
use fanbench_rpc::{ClientError, MessageSocket, RpcClient};
use serde_json::json;
use tokio::net::TcpStream;

use crate::error::SlaveError;

/// Handle to one connected slave
///
/// Clones share the connection and the record of assigned worker ids.
#[derive(Debug, Clone)]
pub struct Slave {
    addr: String,
    client: RpcClient,
    worker_num: usize,
    assigned_worker_ids: Arc<Mutex<Vec<u32>>>,
}

impl Slave {
    /// Connect to `addr` and read the slave's worker-pool size
    ///
    /// An address without a port gets the default slave port appended.
    pub async fn open(addr: &str) -> Result<Self, SlaveError> {
        let addr = normalize_addr(addr);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| SlaveError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let client = RpcClient::new(MessageSocket::from_tcp(stream));
        let worker_num: usize = client.request("getWorkerNum", None).await?;

        Ok(Self {
            addr,
            client,
            worker_num,
            assigned_worker_ids: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Address this handle is connected to, including the port
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Size of the slave's worker pool
    pub fn worker_num(&self) -> usize {
        self.worker_num
    }

    /// Worker ids covered by the last `assign_workers` call
    pub fn assigned_worker_ids(&self) -> Vec<u32> {
        self.assigned_worker_ids.lock().unwrap().clone()
    }

    /// Build fingerprint of the slave's executable
    pub async fn validation_info(&self) -> Result<ValidationInfo, SlaveError> {
        Ok(self.client.request("getValidationInfo", None).await?)
    }

    /// Hand the slave its members' assignments; an empty list is valid and
    /// leaves the slave idle for the run
    pub async fn assign_workers(&self, params: Vec<AssignParam>) -> Result<(), SlaveError> {
        let ids: Vec<u32> = params.iter().map(|p| p.worker_id).collect();
        let payload = serde_json::to_value(&params).map_err(ClientError::from)?;
        self.client.call("assignWorkers", Some(payload)).await?;
        *self.assigned_worker_ids.lock().unwrap() = ids;
        Ok(())
    }

    pub async fn start(&self) -> Result<(), SlaveError> {
        self.client.call("start", None).await?;
        Ok(())
    }

    pub async fn finish(&self) -> Result<(), SlaveError> {
        self.client.call("finish", None).await?;
        Ok(())
    }

    /// Ask the slave process to exit once the reply is on the wire
    pub async fn stop(&self) -> Result<(), SlaveError> {
        self.client.call("stop", None).await?;
        Ok(())
    }

    /// Drain results buffered across the slave's whole pool
    pub async fn fetch_test_results(&self) -> Result<Vec<BenchmarkTestResult>, SlaveError> {
        Ok(self.client.request("fetchTestResults", None).await?)
    }

    /// Wait for one member's task to settle; yields its closing results
    pub async fn handle_finished(&self, worker_id: u32) -> Result<Vec<BenchmarkTestResult>, SlaveError> {
        Ok(self
            .client
            .request("handleFinished", Some(json!(worker_id)))
            .await?)
    }
}

fn normalize_addr(addr: &str) -> String {
    if addr.contains(':') {
        addr.to_owned()
    } else {
        format!("{addr}:{DEFAULT_PORT}")
    }
}
