//! Method registry dispatching handlers without blocking the read loop
//!
//! Handlers run in their own tasks so a slow method never delays receipt of
//! the next request. Replies go out through the socket's cloneable sender in
//! whatever order handlers finish; the client matches them back by id.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use crate::protocol::{JSONRPC_VERSION, RpcError, RpcRequest, RpcResponse};
use crate::socket::{MessageSender, MessageSocket};

type Handler = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Server half of one RPC connection
#[derive(Default)]
pub struct RpcServer {
    methods: HashMap<String, Handler>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asynchronous handler for `name`
    ///
    /// The handler receives the request's raw `params` and is responsible
    /// for its own decoding; decode failures should surface as
    /// [`RpcError::invalid_params`].
    pub fn method<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |params| Box::pin(handler(params))));
    }

    /// Serve the connection until the peer closes it
    pub async fn serve(self, mut socket: MessageSocket) {
        let sender = socket.sender();
        while let Some(payload) = socket.recv().await {
            self.dispatch(&payload, &sender);
        }
    }

    fn dispatch(&self, payload: &str, sender: &MessageSender) {
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(_) => {
                respond(sender, RpcResponse::error(None, RpcError::parse_error()));
                return;
            }
        };
        let request = match serde_json::from_value::<RpcRequest>(value) {
            Ok(request) if request.jsonrpc == JSONRPC_VERSION => request,
            _ => {
                respond(sender, RpcResponse::error(None, RpcError::invalid_request()));
                return;
            }
        };
        let Some(handler) = self.methods.get(&request.method) else {
            respond(
                sender,
                RpcResponse::error(Some(request.id), RpcError::method_not_found(&request.method)),
            );
            return;
        };

        debug!(method = %request.method, id = request.id, "dispatching rpc request");
        let handler = Arc::clone(handler);
        let sender = sender.clone();
        tokio::spawn(async move {
            let response = match handler(request.params).await {
                Ok(result) => RpcResponse::success(request.id, result),
                Err(rpc_error) => RpcResponse::error(Some(request.id), rpc_error),
            };
            respond(&sender, response);
        });
    }
}

fn respond(sender: &MessageSender, response: RpcResponse) {
    match serde_json::to_string(&response) {
        Ok(payload) => {
            if sender.send(payload).is_err() {
                debug!("peer went away before the response was sent");
            }
        }
        Err(e) => error!(error = %e, "failed to serialize rpc response"),
    }
}

/// Decode a handler's `params` into `T`; absent params decode as JSON null
pub fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| RpcError::invalid_params(format!("Invalid params: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn serve_echo() -> MessageSocket {
        let mut server = RpcServer::new();
        server.method("echo", |params| async move {
            Ok(params.unwrap_or(Value::Null))
        });
        server.method("explode", |_params| async move {
            Err::<Value, _>(RpcError::server_error("kaboom"))
        });
        server.method("slow", |_params| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("slow done"))
        });
        let (socket, peer) = MessageSocket::pair();
        tokio::spawn(server.serve(socket));
        peer
    }

    async fn response_of(peer: &mut MessageSocket) -> RpcResponse {
        let payload = timeout(Duration::from_secs(1), peer.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_handler_result_travels_back() {
        let mut peer = serve_echo();
        let request = RpcRequest::new(1, "echo", Some(json!({"k": "v"})));
        peer.send(serde_json::to_string(&request).unwrap()).unwrap();

        let response = response_of(&mut peer).await;
        assert_eq!(response.id, Some(1));
        assert_eq!(response.result, Some(json!({"k": "v"})));
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_unparsable_payload_yields_parse_error_with_null_id() {
        let mut peer = serve_echo();
        peer.send("this is not json").unwrap();

        let response = response_of(&mut peer).await;
        assert_eq!(response.id, None);
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_missing_fields_yield_invalid_request_with_null_id() {
        let mut peer = serve_echo();
        peer.send(r#"{"jsonrpc":"2.0","id":4}"#).unwrap();

        let response = response_of(&mut peer).await;
        assert_eq!(response.id, None);
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_version_yields_invalid_request() {
        let mut peer = serve_echo();
        peer.send(r#"{"jsonrpc":"1.0","id":4,"method":"echo"}"#).unwrap();

        let response = response_of(&mut peer).await;
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_method_carries_request_id() {
        let mut peer = serve_echo();
        let request = RpcRequest::new(9, "nonsense", None);
        peer.send(serde_json::to_string(&request).unwrap()).unwrap();

        let response = response_of(&mut peer).await;
        assert_eq!(response.id, Some(9));
        let error = response.error.unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert!(error.message.contains("nonsense"));
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_server_error() {
        let mut peer = serve_echo();
        let request = RpcRequest::new(2, "explode", None);
        peer.send(serde_json::to_string(&request).unwrap()).unwrap();

        let response = response_of(&mut peer).await;
        assert_eq!(response.id, Some(2));
        let error = response.error.unwrap();
        assert_eq!(error.code, SERVER_ERROR);
        assert_eq!(error.message, "kaboom");
    }

    #[test]
    fn test_decode_params() {
        #[derive(Debug, serde::Deserialize)]
        struct P {
            n: u32,
        }

        let p: P = decode_params(Some(json!({"n": 4}))).unwrap();
        assert_eq!(p.n, 4);

        let err = decode_params::<P>(Some(json!("wrong shape"))).unwrap_err();
        assert_eq!(err.code, crate::protocol::INVALID_PARAMS);

        decode_params::<Option<P>>(None).unwrap();
    }

    #[tokio::test]
    async fn test_slow_handler_does_not_block_later_requests() {
        let mut peer = serve_echo();
        peer.send(serde_json::to_string(&RpcRequest::new(1, "slow", None)).unwrap())
            .unwrap();
        peer.send(serde_json::to_string(&RpcRequest::new(2, "echo", Some(json!(1)))).unwrap())
            .unwrap();

        let first = response_of(&mut peer).await;
        assert_eq!(first.id, Some(2));
        let second = response_of(&mut peer).await;
        assert_eq!(second.id, Some(1));
        assert_eq!(second.result, Some(json!("slow done")));
    }
}
