//! # drawbridge-core
//!
//! Foundation types shared by every drawbridge crate.
//!
//! - **Branded IDs**: `CorrelationId`, `TransportId` as newtypes for type safety
//! - **Errors**: `BridgeError`, `WireError`, `TransportSendError` via `thiserror`
//! - **Wire codec**: `OutboundCommand` / `InboundReply` and the reply parser
//! - **Commands**: typed editor command catalogue validated at the handler boundary
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod commands;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod wire;

pub use commands::EditorCommand;
pub use errors::{BridgeError, CommandError, TransportSendError, WireError};
pub use ids::{CorrelationId, TransportId};
pub use wire::{InboundReply, OutboundCommand, ReplyOutcome};
