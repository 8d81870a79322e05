//! Request/response client with pending-call tracking
//!
//! One client owns one connection. Every outbound request gets a fresh id
//! (strictly increasing from 1); the receive loop matches responses back to
//! their callers by id. A malformed response or a response for an id nobody
//! is waiting on is a protocol violation that poisons the whole client:
//! every pending and future call fails with the same reason.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::protocol::{JSONRPC_VERSION, RpcError, RpcRequest, RpcResponse};
use crate::socket::{MessageSender, MessageSocket, SocketError};

/// Failures surfaced to a caller of [`RpcClient::call`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The peer answered with a JSON-RPC error response
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The connection dropped before a response arrived
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    /// The receive loop hit a protocol violation and failed every call
    #[error("rpc client failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Socket(#[from] SocketError),
}

#[derive(Debug, Default)]
struct PendingMap {
    waiting: HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>,
    failure: Option<String>,
}

impl PendingMap {
    /// Record a terminal failure and wake every waiter by dropping its sender
    fn fail_all(&mut self, reason: String) {
        self.failure = Some(reason);
        self.waiting.clear();
    }
}

/// Client half of one RPC connection; cheap to clone
#[derive(Debug, Clone)]
pub struct RpcClient {
    sender: MessageSender,
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<PendingMap>>,
}

impl RpcClient {
    /// Take over a socket and start its receive loop
    pub fn new(socket: MessageSocket) -> Self {
        let sender = socket.sender();
        let pending = Arc::new(Mutex::new(PendingMap::default()));
        tokio::spawn(Self::recv_loop(socket, Arc::clone(&pending)));
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
            pending,
        }
    }

    /// Call `method` and wait for its response payload
    ///
    /// An absent `result` field in a success response is read as JSON null.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_string(&RpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(reason) = &pending.failure {
                return Err(ClientError::Failed(reason.clone()));
            }
            pending.waiting.insert(id, tx);
        }

        if let Err(e) = self.sender.send(payload) {
            self.pending.lock().unwrap().waiting.remove(&id);
            return Err(e.into());
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(ClientError::Rpc(error)),
            Err(_) => match self.pending.lock().unwrap().failure.clone() {
                Some(reason) => Err(ClientError::Failed(reason)),
                None => Err(ClientError::ConnectionClosed),
            },
        }
    }

    /// Call `method` and deserialize its result
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let result = self.call(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn recv_loop(mut socket: MessageSocket, pending: Arc<Mutex<PendingMap>>) {
        while let Some(payload) = socket.recv().await {
            let response: RpcResponse = match serde_json::from_str(&payload) {
                Ok(response) => response,
                Err(e) => {
                    pending
                        .lock()
                        .unwrap()
                        .fail_all(format!("malformed response: {e}"));
                    return;
                }
            };
            if response.jsonrpc != JSONRPC_VERSION {
                pending
                    .lock()
                    .unwrap()
                    .fail_all(format!("unsupported protocol version {:?}", response.jsonrpc));
                return;
            }
            let Some(id) = response.id else {
                pending
                    .lock()
                    .unwrap()
                    .fail_all("response without an id".to_owned());
                return;
            };
            let waiter = pending.lock().unwrap().waiting.remove(&id);
            let Some(tx) = waiter else {
                pending
                    .lock()
                    .unwrap()
                    .fail_all(format!("response for unknown id {id}"));
                return;
            };
            let outcome = match response.error {
                Some(error) => Err(error),
                None => Ok(response.result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
        }
        // Orderly close: wake waiters without recording a failure so they
        // see ConnectionClosed rather than a poisoned client.
        pending.lock().unwrap().waiting.clear();
    }
}
