//! Orchestration errors
//!
//! Typed errors for the worker/slave handles and the assignment step. RPC
//! transport failures are wrapped rather than restated so their detail
//! survives up the chain.

use fanbench_rpc::{ClientError, RpcError};
use thiserror::Error;

/// Errors raised by a local worker handle
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A lifecycle call reached a worker that was never assigned work
    #[error("worker is not assigned")]
    NotAssigned,

    /// The underlying RPC call failed
    #[error(transparent)]
    Rpc(#[from] ClientError),
}

/// Errors raised by a slave handle
#[derive(Debug, Error)]
pub enum SlaveError {
    /// TCP connect to the slave failed
    #[error("failed to connect to slave {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The underlying RPC call failed
    #[error(transparent)]
    Rpc(#[from] ClientError),
}

/// Errors raised by the worker manager
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Assignment was requested with zero addressable workers
    #[error("worker is missing")]
    WorkerMissing,
}

/// Errors raised inside a worker process serving its parent's RPCs
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("A worker process tried to start a benchmark, but the benchmark is not initialized.")]
    StartBeforeAssign,

    #[error("A worker process tried to fetch results, but the benchmark is not initialized.")]
    FetchBeforeAssign,

    #[error("A worker process tried to finish a benchmark, but the benchmark is not initialized.")]
    FinishBeforeAssign,

    #[error("A worker process tried to handle a benchmark finished event, but it is already handled.")]
    AlreadyHandled,

    /// The user task returned an error; carries its rendered chain
    #[error("{0}")]
    Task(String),
}

impl From<ProcessError> for RpcError {
    fn from(error: ProcessError) -> Self {
        RpcError::server_error(error.to_string())
    }
}
