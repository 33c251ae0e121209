//! `/health` endpoint body.

use std::time::Instant;

use drawbridge_bus::BusStats;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Connected editor transports.
    pub transports: usize,
    /// Requests waiting for a reply.
    pub pending_requests: usize,
    /// Bus counters.
    pub bus: BusStats,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, transports: usize, bus: BusStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        transports,
        pending_requests: bus.pending,
        bus,
    }
}
