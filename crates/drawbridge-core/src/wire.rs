//! Wire shapes exchanged with editor-side transports.
//!
//! Outbound: `{"id": "...", "name": "...", "payload": ...}`.
//! Inbound: `{"id": "...", "payload": ...}` or `{"id": "...", "error": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::WireError;
use crate::ids::CorrelationId;

/// A command broadcast verbatim to every connected transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundCommand {
    /// Correlation id the reply must echo.
    pub id: CorrelationId,
    /// Command name (e.g. `add-rectangle`).
    pub name: String,
    /// Command arguments.
    pub payload: Value,
}

impl OutboundCommand {
    /// Serialize to the JSON text sent on every transport.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// How the editor answered.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyOutcome {
    /// `payload` field.
    Success(Value),
    /// `error` field.
    Error(Value),
}

/// A reply produced by some transport.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundReply {
    /// Correlation id echoed from the command.
    pub id: CorrelationId,
    /// Success or error payload.
    pub outcome: ReplyOutcome,
}

impl InboundReply {
    /// Successful reply.
    pub fn success(id: impl Into<CorrelationId>, payload: Value) -> Self {
        Self {
            id: id.into(),
            outcome: ReplyOutcome::Success(payload),
        }
    }

    /// Error reply.
    pub fn error(id: impl Into<CorrelationId>, error: Value) -> Self {
        Self {
            id: id.into(),
            outcome: ReplyOutcome::Error(error),
        }
    }

    /// Encode back to the inbound wire shape (used by test clients).
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        let _ = obj.insert("id".into(), Value::String(self.id.to_string()));
        match &self.outcome {
            ReplyOutcome::Success(v) => {
                let _ = obj.insert("payload".into(), v.clone());
            }
            ReplyOutcome::Error(v) => {
                let _ = obj.insert("error".into(), v.clone());
            }
        }
        Value::Object(obj)
    }
}

/// Parse raw bytes from a transport into a reply.
///
/// Only the presence of a non-empty string `id` and exactly one of
/// `payload` / `error` is checked; payload contents are opaque.
pub fn parse_reply(raw: &[u8]) -> Result<InboundReply, WireError> {
    let value: Value = serde_json::from_slice(raw)?;
    reply_from_value(value)
}

/// Same as [`parse_reply`] for an already-decoded JSON value.
pub fn reply_from_value(value: Value) -> Result<InboundReply, WireError> {
    let Value::Object(mut obj) = value else {
        return Err(WireError::NotAnObject);
    };

    let id = match obj.remove("id") {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => return Err(WireError::MissingId),
    };

    let outcome = match (obj.remove("payload"), obj.remove("error")) {
        (Some(payload), None) => ReplyOutcome::Success(payload),
        (None, Some(error)) => ReplyOutcome::Error(error),
        (None, None) => return Err(WireError::MissingOutcome { id }),
        (Some(_), Some(_)) => return Err(WireError::AmbiguousOutcome { id }),
    };

    Ok(InboundReply {
        id: CorrelationId::from_string(id),
        outcome,
    })
}
