//! # drawbridge-server
//!
//! HTTP surface of the bridge.
//!
//! - `GET /ws`: WebSocket transport for editor pages
//! - `GET /events` + `POST /reply`: SSE transport with out-of-band replies
//! - `POST /rpc`: editor commands for agent tools
//! - `GET /health`, `GET /metrics`: operational endpoints

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod ingress;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod sse;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, BridgeServer};
pub use shutdown::ShutdownCoordinator;
