//! RPC error codes and the handler error type.

use drawbridge_core::{BridgeError, CommandError};
use serde_json::json;
use thiserror::Error;

use crate::rpc::types::RpcErrorBody;

/// Params failed validation.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected server-side failure.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// No handler for the method.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Request body is not an RPC request.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
/// The editor did not reply in time.
pub const TIMEOUT: &str = "TIMEOUT";
/// The editor replied with an error.
pub const REMOTE_ERROR: &str = "REMOTE_ERROR";
/// The request was cancelled before a reply arrived.
pub const CANCELLED: &str = "CANCELLED";

/// Error returned by a method handler.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Params are missing or malformed.
    #[error("{message}")]
    InvalidParams {
        /// What is wrong.
        message: String,
    },

    /// Method name is not registered.
    #[error("method '{method}' not found")]
    MethodNotFound {
        /// Requested method.
        method: String,
    },

    /// The correlated request failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Unexpected failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl RpcError {
    /// Machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::Bridge(err) => err.code(),
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Wire body. Remote errors carry the editor payload verbatim as details.
    pub fn to_error_body(&self) -> RpcErrorBody {
        let details = match self {
            Self::Bridge(BridgeError::RemoteExecution { payload, .. }) => Some(payload.clone()),
            Self::Bridge(BridgeError::Timeout { id, timeout, .. }) => Some(json!({
                "correlationId": id,
                "timeoutMs": u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })),
            Self::Bridge(BridgeError::Cancelled { id, .. }) => Some(json!({ "correlationId": id })),
            _ => None,
        };
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details,
        }
    }
}

impl From<CommandError> for RpcError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::UnknownCommand(method) => Self::MethodNotFound { method },
            CommandError::InvalidArguments { .. } => Self::InvalidParams {
                message: err.to_string(),
            },
        }
    }
}
