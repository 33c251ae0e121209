//! Prometheus recorder and metric descriptions.

use drawbridge_bus::telemetry;
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// RPC calls received (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// RPC calls that failed (counter, labels: method, error_type).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// RPC call duration (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";

/// Install the global Prometheus recorder.
///
/// Call once at startup before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_all();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Register help text for every metric the bridge records.
pub fn describe_all() {
    describe_counter!(telemetry::REQUESTS_TOTAL, "Commands dispatched to the editor");
    describe_counter!(telemetry::REQUEST_OUTCOMES_TOTAL, "Command resolutions by outcome");
    describe_histogram!(
        telemetry::REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time from dispatch to resolution"
    );
    describe_counter!(telemetry::UNMATCHED_REPLIES_TOTAL, "Replies matching no pending request");
    describe_counter!(telemetry::MALFORMED_REPLIES_TOTAL, "Inbound messages dropped as malformed");
    describe_counter!(telemetry::TRANSPORT_EVICTIONS_TOTAL, "Transports evicted after a failed send");
    describe_gauge!(telemetry::TRANSPORTS_ACTIVE, "Connected editor transports");
    describe_counter!(RPC_REQUESTS_TOTAL, "RPC calls received");
    describe_counter!(RPC_ERRORS_TOTAL, "RPC calls that failed");
    describe_histogram!(RPC_REQUEST_DURATION_SECONDS, Unit::Seconds, "RPC call duration");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn rpc_metric_names_are_snake_case() {
        for name in [
            RPC_REQUESTS_TOTAL,
            RPC_ERRORS_TOTAL,
            RPC_REQUEST_DURATION_SECONDS,
        ] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn describe_without_recorder_is_noop() {
        describe_all();
    }
}
