//! Shared state handed to every method handler.

use std::sync::Arc;
use std::time::Instant;

use drawbridge_bus::Bridge;

/// Dependencies available to handlers.
#[derive(Clone)]
pub struct RpcContext {
    /// The running bridge.
    pub bridge: Arc<Bridge>,
    /// When the server started.
    pub start_time: Instant,
}

impl RpcContext {
    /// Build a context around a bridge.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            start_time: Instant::now(),
        }
    }
}
