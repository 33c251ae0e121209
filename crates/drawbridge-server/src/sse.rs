//! Server-sent-events transport.
//!
//! `GET /events` registers a transport and streams each command as a
//! `command` event. The first event, `connected`, carries the transport id the
//! client should send back in `X-Transport-Id` when posting replies to
//! `/reply`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use drawbridge_bus::{Bridge, TransportKind};
use drawbridge_core::TransportId;
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::server::AppState;

/// Event name of the greeting.
pub const CONNECTED_EVENT: &str = "connected";
/// Event name of a broadcast command.
pub const COMMAND_EVENT: &str = "command";

/// Deregisters the transport when the response stream is dropped.
struct Registration {
    bridge: Arc<Bridge>,
    id: TransportId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.bridge.on_transport_disconnected(&self.id) {
            debug!(transport_id = %self.id, "event stream closed");
        }
    }
}

/// `GET /events`
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (handle, rx) = state.bridge.on_transport_connected(TransportKind::EventStream);
    let id = handle.id().clone();
    drop(handle);

    let greeting = Event::default()
        .event(CONNECTED_EVENT)
        .data(json!({ "transportId": id }).to_string());

    let registration = Registration {
        bridge: Arc::clone(&state.bridge),
        id,
    };
    let commands = ReceiverStream::new(rx).map(move |command| {
        let _ = &registration;
        Event::default().event(COMMAND_EVENT).data(&*command)
    });

    let shutdown = state.shutdown.clone();
    let events = stream::once(async move { greeting })
        .chain(commands)
        .map(Ok)
        .take_until(async move { shutdown.cancelled().await });

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.heartbeat_interval))
}
