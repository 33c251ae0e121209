//! WebSocket transport for editor pages and extensions.
//!
//! Each connection registers a transport, then runs a writer (queued commands
//! plus heartbeat pings) and a reader (replies into the bridge) until either
//! side stops. Eviction by the registry drops the queue sender, which ends the
//! writer.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use drawbridge_bus::{Bridge, TransportKind};
use drawbridge_core::TransportId;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::server::AppState;

/// Close code sent when the server shuts down (1001 "going away").
const CLOSE_GOING_AWAY: u16 = 1001;

/// `GET /ws`
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let heartbeat = state.heartbeat_interval;
    let cancel = state.shutdown.clone();
    let bridge = Arc::clone(&state.bridge);
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_connection(socket, bridge, heartbeat, cancel))
}

/// Drive one upgraded socket until it closes.
pub async fn run_connection(
    socket: WebSocket,
    bridge: Arc<Bridge>,
    heartbeat: Duration,
    cancel: CancellationToken,
) {
    let (handle, rx) = bridge.on_transport_connected(TransportKind::WebSocket);
    let id = handle.id().clone();
    drop(handle);

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, rx, heartbeat, cancel, id.clone()));
    let mut reader = tokio::spawn(read_loop(stream, Arc::clone(&bridge), id.clone()));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    let _ = bridge.on_transport_disconnected(&id);
    debug!(transport_id = %id, "websocket connection finished");
}

async fn write_loop(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    heartbeat: Duration,
    cancel: CancellationToken,
    id: TransportId,
) {
    let mut ping = tokio::time::interval(heartbeat);
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(text) = msg else {
                    debug!(transport_id = %id, "outbound queue closed");
                    break;
                };
                if sink.send(Message::Text(String::from(&*text).into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                trace!(transport_id = %id, "sent ping");
            }
            () = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}

async fn read_loop(
    mut stream: futures::stream::SplitStream<WebSocket>,
    bridge: Arc<Bridge>,
    id: TransportId,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                bridge.on_transport_message(Some(id.clone()), Bytes::from(text.as_str().to_owned()));
            }
            Ok(Message::Binary(data)) => bridge.on_transport_message(Some(id.clone()), data),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(err) => {
                warn!(transport_id = %id, error = %err, "websocket read failed");
                break;
            }
        }
    }
}
