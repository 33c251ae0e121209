//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics::{RPC_ERRORS_TOTAL, RPC_REQUESTS_TOTAL, RPC_REQUEST_DURATION_SECONDS};
use crate::rpc::context::RpcContext;
use crate::rpc::errors::{self, RpcError};
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Calls slower than this are logged.
const SLOW_CALL: Duration = Duration::from_secs(5);

/// Implemented by every RPC method.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Run the method.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Maps method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for `method`.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Decode a raw request body and dispatch it.
    pub async fn dispatch_raw(&self, body: &[u8], ctx: &RpcContext) -> RpcResponse {
        match serde_json::from_slice::<RpcRequest>(body) {
            Ok(request) => self.dispatch(request, ctx).await,
            Err(err) => {
                debug!(error = %err, "rejecting malformed rpc request");
                counter!(RPC_ERRORS_TOTAL, "method" => "", "error_type" => errors::INVALID_REQUEST)
                    .increment(1);
                RpcResponse::error("", errors::INVALID_REQUEST, format!("invalid request: {err}"))
            }
        }
    }

    /// Dispatch a request to its handler.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        let method = request.method.clone();
        counter!(RPC_REQUESTS_TOTAL, "method" => method.clone()).increment(1);

        let Some(handler) = self.handlers.get(&method) else {
            let err = RpcError::MethodNotFound { method: method.clone() };
            counter!(RPC_ERRORS_TOTAL, "method" => method, "error_type" => err.code()).increment(1);
            return RpcResponse::failure(request.id, err.to_error_body());
        };

        let start = Instant::now();
        let response = match handler.handle(request.params, ctx).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(err) => {
                counter!(RPC_ERRORS_TOTAL, "method" => method.clone(), "error_type" => err.code())
                    .increment(1);
                debug!(method, code = err.code(), error = %err, "rpc call failed");
                RpcResponse::failure(request.id, err.to_error_body())
            }
        };

        let elapsed = start.elapsed();
        histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.clone())
            .record(elapsed.as_secs_f64());
        if elapsed >= SLOW_CALL {
            warn!(method, duration_secs = elapsed.as_secs_f64(), "slow rpc call");
        }
        response
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `method` is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
