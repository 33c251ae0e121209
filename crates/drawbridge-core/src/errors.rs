//! Error hierarchy for the bridge.
//!
//! - [`BridgeError`]: what a command handler sees when a request fails
//! - [`WireError`]: an inbound reply that could not be parsed (never reaches a caller)
//! - [`TransportSendError`]: a single transport refused a message
//! - [`CommandError`]: command arguments rejected at the handler boundary

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::ids::CorrelationId;

/// Failure of a correlated request.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// No matching reply arrived before the deadline.
    #[error("no reply to '{command}' ({id}) within {}ms", .timeout.as_millis())]
    Timeout {
        /// Correlation id of the abandoned request.
        id: CorrelationId,
        /// Command name.
        command: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The editor replied with an error payload.
    #[error("editor rejected '{command}' ({id}): {payload}")]
    RemoteExecution {
        /// Correlation id of the request.
        id: CorrelationId,
        /// Command name.
        command: String,
        /// Error payload exactly as the editor sent it.
        payload: Value,
    },

    /// The pending entry was removed before any reply arrived.
    #[error("request '{command}' ({id}) was cancelled")]
    Cancelled {
        /// Correlation id of the request.
        id: CorrelationId,
        /// Command name.
        command: String,
    },
}

impl BridgeError {
    /// Machine-readable error code used on the RPC surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "TIMEOUT",
            Self::RemoteExecution { .. } => "REMOTE_ERROR",
            Self::Cancelled { .. } => "CANCELLED",
        }
    }

    /// Correlation id the error belongs to.
    pub fn id(&self) -> &CorrelationId {
        match self {
            Self::Timeout { id, .. } | Self::RemoteExecution { id, .. } | Self::Cancelled { id, .. } => id,
        }
    }
}

/// An inbound message that is not a usable reply.
#[derive(Debug, Error)]
pub enum WireError {
    /// Body is not JSON at all.
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// Body is JSON but not an object.
    #[error("reply is not a JSON object")]
    NotAnObject,
    /// No usable `id` field.
    #[error("reply has no string 'id' field")]
    MissingId,
    /// Neither `payload` nor `error` present.
    #[error("reply {id} carries neither 'payload' nor 'error'")]
    MissingOutcome {
        /// The id that was found.
        id: String,
    },
    /// Both `payload` and `error` present.
    #[error("reply {id} carries both 'payload' and 'error'")]
    AmbiguousOutcome {
        /// The id that was found.
        id: String,
    },
}

/// A message could not be queued on one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportSendError {
    /// The transport's outbound queue is full (slow consumer).
    #[error("transport queue is full")]
    Full,
    /// The transport's receiver is gone.
    #[error("transport is closed")]
    Closed,
}

/// Command arguments rejected before anything is broadcast.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Name does not belong to the catalogue.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    /// Arguments failed to deserialize or violate a constraint.
    #[error("invalid arguments for '{command}': {message}")]
    InvalidArguments {
        /// Command name.
        command: String,
        /// What is wrong.
        message: String,
    },
}
