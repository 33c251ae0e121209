//! # drawbridge-bus
//!
//! Request/reply correlation over a broadcast-only channel to an editor.
//!
//! - [`CorrelationBus`]: tags each command with a fresh id, tracks it in a
//!   pending table and resolves the caller on the first matching reply,
//!   on timeout, or on cancellation
//! - [`TransportRegistry`]: connected transports and fan-out to all of them
//! - [`Forwarder`]: broadcasts outbound commands, parses inbound replies
//! - [`Bridge`]: wires the above together with typed channels

#![deny(unsafe_code)]

pub mod bridge;
pub mod bus;
pub mod forwarder;
pub mod id_source;
pub mod pending;
pub mod registry;
pub mod telemetry;
pub mod transport;

pub use bridge::{Bridge, BusConfig};
pub use bus::{BusStats, CorrelationBus, PendingCall};
pub use forwarder::{Forwarder, Ingress, IngressMessage, ReplyListener};
pub use id_source::{IdSource, SequentialIdSource, UuidIdSource};
pub use registry::{BroadcastReport, TransportInfo, TransportRegistry};
pub use transport::{TransportHandle, TransportKind};
