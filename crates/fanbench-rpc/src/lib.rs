//! fanbench-rpc - JSON-RPC 2.0 plumbing for fanbench
//!
//! This crate carries the request/response protocol spoken between the
//! master process, slave machines, and worker child processes. The same
//! client and server drive every transport: an in-memory pair, a TCP
//! connection, or a child's stdin/stdout pipes.
//!
//! ## Modules
//!
//! - [`protocol`]: envelope types and reserved error codes
//! - [`socket`]: line-delimited duplex transports
//! - [`client`]: request/response client with pending-call tracking
//! - [`server`]: method registry with fire-and-continue dispatch

pub mod client;
pub mod protocol;
pub mod server;
pub mod socket;

// Re-export commonly used types
pub use client::{ClientError, RpcClient};
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use server::{RpcServer, decode_params};
pub use socket::{MessageSender, MessageSocket, SocketError};
