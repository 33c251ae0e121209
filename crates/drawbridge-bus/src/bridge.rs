//! The assembled bridge: registry, bus, forwarder and their channels.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use drawbridge_core::{InboundReply, OutboundCommand, TransportId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::CorrelationBus;
use crate::forwarder::{Forwarder, Ingress, IngressMessage, ReplyListener};
use crate::id_source::{IdSource, UuidIdSource};
use crate::registry::{BroadcastReport, TransportRegistry};
use crate::transport::{TransportHandle, TransportKind};

/// Bridge tuning.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Deadline per request.
    pub request_timeout: Duration,
    /// Interval of the expired-entry sweeper.
    pub sweep_interval: Duration,
    /// Outbound queue length per transport.
    pub send_queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            sweep_interval: Duration::from_secs(5),
            send_queue_capacity: 256,
        }
    }
}

struct Channels {
    outbound_rx: mpsc::UnboundedReceiver<OutboundCommand>,
    ingress_rx: mpsc::UnboundedReceiver<IngressMessage>,
    reply_tx: mpsc::UnboundedSender<InboundReply>,
    reply_rx: mpsc::UnboundedReceiver<InboundReply>,
}

/// Entry point for transports and command handlers.
pub struct Bridge {
    registry: Arc<TransportRegistry>,
    bus: CorrelationBus,
    ingress: Ingress,
    sweep_interval: Duration,
    channels: Mutex<Option<Channels>>,
}

impl Bridge {
    /// Bridge minting UUID v7 correlation ids.
    pub fn new(config: &BusConfig) -> Self {
        Self::with_id_source(config, Arc::new(UuidIdSource))
    }

    /// Bridge with a custom id source.
    pub fn with_id_source(config: &BusConfig, ids: Arc<dyn IdSource>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        Self {
            registry: Arc::new(TransportRegistry::new(config.send_queue_capacity)),
            bus: CorrelationBus::new(ids, outbound_tx, config.request_timeout),
            ingress: Ingress::new(ingress_tx),
            sweep_interval: config.sweep_interval,
            channels: Mutex::new(Some(Channels {
                outbound_rx,
                ingress_rx,
                reply_tx,
                reply_rx,
            })),
        }
    }

    /// Start the forwarder, reply listener and sweeper.
    ///
    /// Only the first call starts anything.
    pub fn spawn(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let Some(channels) = self.channels.lock().take() else {
            warn!("bridge tasks already running");
            return Vec::new();
        };

        let forwarder = Forwarder::new(
            Arc::clone(&self.registry),
            channels.outbound_rx,
            channels.ingress_rx,
            channels.reply_tx,
        );
        let listener = ReplyListener::new(self.bus.clone(), channels.reply_rx);
        let sweeper = sweep_loop(self.bus.clone(), self.sweep_interval, cancel.clone());

        info!(sweep_interval_ms = self.sweep_interval.as_millis(), "bridge started");
        vec![
            tokio::spawn(forwarder.run(cancel.clone())),
            tokio::spawn(listener.run(cancel.clone())),
            tokio::spawn(sweeper),
        ]
    }

    /// Register a new transport. The caller drains the returned queue.
    pub fn on_transport_connected(
        &self,
        kind: TransportKind,
    ) -> (Arc<TransportHandle>, mpsc::Receiver<Arc<str>>) {
        self.registry.connect(kind)
    }

    /// Deregister a transport. Unknown ids are ignored.
    pub fn on_transport_disconnected(&self, id: &TransportId) -> bool {
        self.registry.remove(id)
    }

    /// Feed a raw message received from a transport.
    pub fn on_transport_message(&self, transport: Option<TransportId>, raw: impl Into<Bytes>) {
        if !self.ingress.submit(transport, raw) {
            debug!("forwarder stopped, inbound message dropped");
        }
    }

    /// Send raw text to every transport.
    pub fn broadcast(&self, raw: &str) -> BroadcastReport {
        self.registry.broadcast(Arc::from(raw))
    }

    /// Correlation bus for command handlers.
    pub fn bus(&self) -> &CorrelationBus {
        &self.bus
    }

    /// Transport registry.
    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    /// Ingress handle for transports that run outside the bridge.
    pub fn ingress(&self) -> Ingress {
        self.ingress.clone()
    }
}

async fn sweep_loop(bus: CorrelationBus, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let swept = bus.sweep_expired();
                if swept > 0 {
                    debug!(swept, "expired requests swept");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use drawbridge_core::BridgeError;
    use serde_json::{Value, json};

    use super::*;
    use crate::id_source::SequentialIdSource;

    fn config(timeout: Duration) -> BusConfig {
        BusConfig {
            request_timeout: timeout,
            sweep_interval: Duration::from_millis(50),
            send_queue_capacity: 8,
        }
    }

    /// Reads every command from `rx` and answers through the bridge.
    fn editor(
        bridge: Arc<Bridge>,
        transport: TransportId,
        mut rx: mpsc::Receiver<Arc<str>>,
        answer: fn(&Value) -> Value,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                let command: Value = serde_json::from_str(&text).unwrap();
                let reply = json!({"id": command["id"], "payload": answer(&command)});
                bridge.on_transport_message(Some(transport.clone()), reply.to_string());
            }
        })
    }

    #[tokio::test]
    async fn add_rectangle_round_trip() {
        let bridge = Arc::new(Bridge::new(&config(Duration::from_secs(15))));
        let cancel = CancellationToken::new();
        let _tasks = bridge.spawn(&cancel);

        let (handle, rx) = bridge.on_transport_connected(TransportKind::WebSocket);
        let _editor = editor(Arc::clone(&bridge), handle.id().clone(), rx, |_| {
            json!({"cellId": "abc123"})
        });

        let result = bridge
            .bus()
            .request(
                "add-rectangle",
                json!({"x": 100, "y": 100, "width": 200, "height": 100}),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"cellId": "abc123"}));
        assert_eq!(bridge.bus().pending_count(), 0);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn no_transport_times_out() {
        let bridge = Bridge::new(&config(Duration::from_secs(2)));
        let cancel = CancellationToken::new();
        let _tasks = bridge.spawn(&cancel);

        let started = tokio::time::Instant::now();
        let err = bridge.bus().request("add-rectangle", json!({})).await.unwrap_err();
        assert_matches!(err, BridgeError::Timeout { .. });
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(bridge.bus().pending_count(), 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn two_transports_first_reply_wins() {
        let bridge = Arc::new(Bridge::with_id_source(
            &config(Duration::from_secs(15)),
            Arc::new(SequentialIdSource::new("req")),
        ));
        let cancel = CancellationToken::new();
        let _tasks = bridge.spawn(&cancel);

        let (a, mut rx_a) = bridge.on_transport_connected(TransportKind::WebSocket);
        let (b, mut rx_b) = bridge.on_transport_connected(TransportKind::EventStream);

        let call = bridge.bus().dispatch("get-selected-cell", json!({}));
        let text_a = rx_a.recv().await.unwrap();
        let text_b = rx_b.recv().await.unwrap();
        assert_eq!(text_a, text_b);

        bridge.on_transport_message(
            Some(a.id().clone()),
            format!(r#"{{"id":"{}","payload":{{"from":"a"}}}}"#, call.id()),
        );
        bridge.on_transport_message(
            Some(b.id().clone()),
            format!(r#"{{"id":"{}","payload":{{"from":"b"}}}}"#, call.id()),
        );
        assert_eq!(call.wait().await.unwrap(), json!({"from": "a"}));

        tokio::time::timeout(Duration::from_secs(1), async {
            while bridge.bus().stats().unmatched_replies == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        let stats = bridge.bus().stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.unmatched_replies, 1);
        assert_eq!(stats.pending, 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn malformed_message_does_not_resolve() {
        let bridge = Bridge::new(&config(Duration::from_secs(15)));
        let cancel = CancellationToken::new();
        let _tasks = bridge.spawn(&cancel);

        let call = bridge.bus().dispatch("get-selected-cell", json!({}));
        let marker = bridge.bus().dispatch("list-paged-model", json!({}));
        bridge.on_transport_message(None, format!(r#"{{"id":"{}"}}"#, call.id()));
        bridge.on_transport_message(None, "garbage");
        bridge.on_transport_message(None, format!(r#"{{"id":"{}","payload":1}}"#, marker.id()));

        // Ingress is processed in order, so the marker resolving means the
        // malformed messages have been handled.
        assert_eq!(marker.wait().await.unwrap(), json!(1));
        assert!(bridge.bus().is_pending(call.id()));
        assert_eq!(bridge.bus().stats().completed, 1);
        assert!(bridge.bus().cancel(call.id()));
        assert_matches!(call.wait().await, Err(BridgeError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn spawn_only_once() {
        let bridge = Bridge::new(&BusConfig::default());
        let cancel = CancellationToken::new();
        assert_eq!(bridge.spawn(&cancel).len(), 3);
        assert!(bridge.spawn(&cancel).is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn disconnect_removes_transport() {
        let bridge = Bridge::new(&BusConfig::default());
        let (handle, _rx) = bridge.on_transport_connected(TransportKind::WebSocket);
        assert_eq!(bridge.broadcast("hi").delivered, 1);
        assert!(bridge.on_transport_disconnected(handle.id()));
        assert!(!bridge.on_transport_disconnected(handle.id()));
        assert_eq!(bridge.broadcast("hi"), BroadcastReport::default());
    }
}
