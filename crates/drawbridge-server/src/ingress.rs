//! `POST /reply`: replies from transports that cannot answer in-band.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use drawbridge_core::TransportId;

use crate::server::AppState;

/// Header naming the transport a posted reply came from.
pub const TRANSPORT_ID_HEADER: &str = "x-transport-id";

/// Accept a raw reply body. Parsing happens off the request path, so any body
/// within the size limit is accepted.
pub async fn reply_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let transport = headers
        .get(TRANSPORT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(TransportId::from);
    state.bridge.on_transport_message(transport, body);
    StatusCode::ACCEPTED
}
