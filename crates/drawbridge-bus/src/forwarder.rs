//! Fan-out forwarder and reply listener.
//!
//! The forwarder owns both directions of transport traffic:
//! outbound commands are encoded once and broadcast to every transport,
//! inbound messages from any transport are parsed and republished as
//! replies. The [`ReplyListener`] drains those replies into the bus.

use std::sync::Arc;

use bytes::Bytes;
use drawbridge_core::wire::parse_reply;
use drawbridge_core::{InboundReply, OutboundCommand, TransportId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::bus::CorrelationBus;
use crate::registry::TransportRegistry;
use crate::telemetry;

/// Raw bytes received from a transport.
#[derive(Clone, Debug)]
pub struct IngressMessage {
    /// Sending transport, when known.
    pub transport: Option<TransportId>,
    /// Message body.
    pub raw: Bytes,
}

/// Cloneable entry point for inbound transport traffic.
#[derive(Clone, Debug)]
pub struct Ingress {
    tx: mpsc::UnboundedSender<IngressMessage>,
}

impl Ingress {
    /// Wrap the sending half of the forwarder's ingress channel.
    pub fn new(tx: mpsc::UnboundedSender<IngressMessage>) -> Self {
        Self { tx }
    }

    /// Hand a message to the forwarder. Returns `false` once it has stopped.
    pub fn submit(&self, transport: Option<TransportId>, raw: impl Into<Bytes>) -> bool {
        self.tx
            .send(IngressMessage {
                transport,
                raw: raw.into(),
            })
            .is_ok()
    }
}

/// Broadcasts outbound commands and parses inbound replies.
pub struct Forwarder {
    registry: Arc<TransportRegistry>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundCommand>,
    ingress_rx: mpsc::UnboundedReceiver<IngressMessage>,
    reply_tx: mpsc::UnboundedSender<InboundReply>,
}

impl Forwarder {
    /// Forwarder over the given channels.
    pub fn new(
        registry: Arc<TransportRegistry>,
        outbound_rx: mpsc::UnboundedReceiver<OutboundCommand>,
        ingress_rx: mpsc::UnboundedReceiver<IngressMessage>,
        reply_tx: mpsc::UnboundedSender<InboundReply>,
    ) -> Self {
        Self {
            registry,
            outbound_rx,
            ingress_rx,
            reply_tx,
        }
    }

    /// Run until cancelled or until both input channels close.
    #[instrument(name = "forwarder", skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("forwarder started");
        let mut outbound_open = true;
        let mut ingress_open = true;

        while outbound_open || ingress_open {
            tokio::select! {
                () = cancel.cancelled() => break,
                command = self.outbound_rx.recv(), if outbound_open => match command {
                    Some(command) => self.forward(&command),
                    None => outbound_open = false,
                },
                message = self.ingress_rx.recv(), if ingress_open => match message {
                    Some(message) => self.ingest(message),
                    None => ingress_open = false,
                },
            }
        }
        info!("forwarder stopped");
    }

    /// Encode once and broadcast to every transport.
    fn forward(&self, command: &OutboundCommand) {
        let encoded = match command.encode() {
            Ok(json) => Arc::<str>::from(json),
            Err(e) => {
                warn!(correlation_id = %command.id, error = %e, "failed to encode command");
                return;
            }
        };
        let report = self.registry.broadcast(encoded);
        debug!(
            correlation_id = %command.id,
            command = %command.name,
            delivered = report.delivered,
            evicted = report.evicted,
            "command forwarded"
        );
    }

    /// Parse one inbound message and republish it as a reply.
    fn ingest(&self, message: IngressMessage) {
        match parse_reply(&message.raw) {
            Ok(reply) => {
                if self.reply_tx.send(reply).is_err() {
                    debug!("reply listener gone, dropping reply");
                }
            }
            Err(error) => {
                metrics::counter!(telemetry::MALFORMED_REPLIES_TOTAL).increment(1);
                warn!(
                    transport_id = ?message.transport.as_ref().map(TransportId::as_str),
                    %error,
                    bytes = message.raw.len(),
                    "dropping malformed reply"
                );
            }
        }
    }
}

/// Feeds replies from the forwarder into the bus.
pub struct ReplyListener {
    bus: CorrelationBus,
    rx: mpsc::UnboundedReceiver<InboundReply>,
}

impl ReplyListener {
    /// Listener delivering to `bus`.
    pub fn new(bus: CorrelationBus, rx: mpsc::UnboundedReceiver<InboundReply>) -> Self {
        Self { bus, rx }
    }

    /// Run until cancelled or the reply channel closes.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                reply = self.rx.recv() => match reply {
                    Some(reply) => {
                        let _ = self.bus.on_reply(reply);
                    }
                    None => break,
                },
            }
        }
        debug!("reply listener stopped");
    }
}
