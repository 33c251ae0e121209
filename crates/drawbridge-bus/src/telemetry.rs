//! Metric names recorded by the bus and the transports.

/// Requests dispatched (counter, labels: command).
pub const REQUESTS_TOTAL: &str = "bridge_requests_total";
/// Request resolutions seen by callers (counter, labels: outcome).
pub const REQUEST_OUTCOMES_TOTAL: &str = "bridge_request_outcomes_total";
/// Time from dispatch to resolution (histogram).
pub const REQUEST_DURATION_SECONDS: &str = "bridge_request_duration_seconds";
/// Replies whose id matched nothing pending (counter).
pub const UNMATCHED_REPLIES_TOTAL: &str = "bridge_unmatched_replies_total";
/// Inbound messages dropped as malformed (counter).
pub const MALFORMED_REPLIES_TOTAL: &str = "bridge_malformed_replies_total";
/// Transports evicted after a failed send (counter).
pub const TRANSPORT_EVICTIONS_TOTAL: &str = "bridge_transport_evictions_total";
/// Registered transports (gauge).
pub const TRANSPORTS_ACTIVE: &str = "bridge_transports_active";

/// Every metric name above.
pub const ALL: &[&str] = &[
    REQUESTS_TOTAL,
    REQUEST_OUTCOMES_TOTAL,
    REQUEST_DURATION_SECONDS,
    UNMATCHED_REPLIES_TOTAL,
    MALFORMED_REPLIES_TOTAL,
    TRANSPORT_EVICTIONS_TOTAL,
    TRANSPORTS_ACTIVE,
];
