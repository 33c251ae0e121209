//! Registry of connected transports and fan-out to all of them.

use std::collections::HashMap;
use std::sync::Arc;

use drawbridge_core::{TransportId, TransportSendError};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::telemetry;
use crate::transport::{TransportHandle, TransportKind};

/// Result of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Transports that accepted the message.
    pub delivered: usize,
    /// Transports removed because the send failed.
    pub evicted: usize,
}

/// Point-in-time view of one transport, for health output.
#[derive(Clone, Debug, Serialize)]
pub struct TransportInfo {
    /// Transport id.
    pub id: TransportId,
    /// Transport kind.
    pub kind: TransportKind,
    /// Seconds since registration.
    pub age_secs: u64,
    /// Messages that could not be queued.
    pub dropped: u64,
}

/// Connected transports, keyed by id.
///
/// Broadcasting iterates over a snapshot, so transports may connect or
/// disconnect concurrently without invalidating an iteration in progress.
pub struct TransportRegistry {
    transports: RwLock<HashMap<TransportId, Arc<TransportHandle>>>,
    queue_capacity: usize,
}

impl TransportRegistry {
    /// Registry whose transports get outbound queues of `queue_capacity`.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            transports: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Create and register a transport with a fresh id and queue.
    pub fn connect(&self, kind: TransportKind) -> (Arc<TransportHandle>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let handle = Arc::new(TransportHandle::new(TransportId::new(), kind, tx));
        self.add(Arc::clone(&handle));
        (handle, rx)
    }

    /// Register an existing handle. A handle with the same id is replaced and closed.
    pub fn add(&self, handle: Arc<TransportHandle>) {
        let (previous, count) = {
            let mut transports = self.transports.write();
            let previous = transports.insert(handle.id().clone(), Arc::clone(&handle));
            (previous, transports.len())
        };
        if let Some(previous) = previous {
            previous.close();
            warn!(transport_id = %handle.id(), "transport id re-registered, closing previous handle");
        }
        set_active(count);
        info!(transport_id = %handle.id(), kind = %handle.kind(), count, "transport connected");
    }

    /// Deregister and close. Returns `false` if the id was not registered.
    pub fn remove(&self, id: &TransportId) -> bool {
        let (removed, count) = {
            let mut transports = self.transports.write();
            let removed = transports.remove(id);
            (removed, transports.len())
        };
        match removed {
            Some(handle) => {
                handle.close();
                set_active(count);
                info!(transport_id = %id, count, "transport disconnected");
                true
            }
            None => false,
        }
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &TransportId) -> bool {
        self.transports.read().contains_key(id)
    }

    /// Number of registered transports.
    pub fn len(&self) -> usize {
        self.transports.read().len()
    }

    /// No transports registered.
    pub fn is_empty(&self) -> bool {
        self.transports.read().is_empty()
    }

    /// Copy of the current handles.
    pub fn snapshot(&self) -> Vec<Arc<TransportHandle>> {
        self.transports.read().values().cloned().collect()
    }

    /// Health view of every transport.
    pub fn describe(&self) -> Vec<TransportInfo> {
        self.snapshot()
            .into_iter()
            .map(|h| TransportInfo {
                id: h.id().clone(),
                kind: h.kind(),
                age_secs: h.age().as_secs(),
                dropped: h.drop_count(),
            })
            .collect()
    }

    /// Send `message` to every registered transport.
    ///
    /// A transport whose send fails is evicted; the others still receive the
    /// message.
    pub fn broadcast(&self, message: Arc<str>) -> BroadcastReport {
        let targets = self.snapshot();
        if targets.is_empty() {
            debug!("broadcast with no transports connected");
            return BroadcastReport::default();
        }

        let mut report = BroadcastReport::default();
        let mut failed: Vec<(TransportId, TransportSendError)> = Vec::new();
        for handle in &targets {
            match handle.send(Arc::clone(&message)) {
                Ok(()) => report.delivered += 1,
                Err(e) => failed.push((handle.id().clone(), e)),
            }
        }

        for (id, error) in failed {
            if self.remove(&id) {
                report.evicted += 1;
                metrics::counter!(telemetry::TRANSPORT_EVICTIONS_TOTAL).increment(1);
                warn!(transport_id = %id, %error, "evicted transport after failed send");
            }
        }

        debug!(
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast complete"
        );
        report
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

#[allow(clippy::cast_precision_loss)]
fn set_active(count: usize) {
    metrics::gauge!(telemetry::TRANSPORTS_ACTIVE).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_registers_and_delivers() {
        let registry = TransportRegistry::new(8);
        let (handle, mut rx) = registry.connect(TransportKind::WebSocket);
        assert!(registry.contains(handle.id()));
        assert_eq!(registry.len(), 1);

        let report = registry.broadcast(Arc::from("cmd"));
        assert_eq!(report, BroadcastReport { delivered: 1, evicted: 0 });
        assert_eq!(&*rx.recv().await.unwrap(), "cmd");
    }

    #[test]
    fn broadcast_to_empty_registry() {
        let registry = TransportRegistry::new(8);
        assert!(registry.is_empty());
        assert_eq!(registry.broadcast(Arc::from("x")), BroadcastReport::default());
    }

    #[test]
    fn every_transport_receives_a_copy() {
        let registry = TransportRegistry::new(8);
        let mut receivers: Vec<_> = (0..3)
            .map(|_| registry.connect(TransportKind::EventStream).1)
            .collect();
        let report = registry.broadcast(Arc::from("m"));
        assert_eq!(report.delivered, 3);
        for rx in &mut receivers {
            assert_eq!(&*rx.try_recv().unwrap(), "m");
        }
    }

    #[test]
    fn failed_transport_is_evicted_others_still_receive() {
        let registry = TransportRegistry::new(8);
        let (_a, mut rx_a) = registry.connect(TransportKind::WebSocket);
        let (b, rx_b) = registry.connect(TransportKind::WebSocket);
        let (_c, mut rx_c) = registry.connect(TransportKind::WebSocket);
        drop(rx_b);

        let report = registry.broadcast(Arc::from("m"));
        assert_eq!(report, BroadcastReport { delivered: 2, evicted: 1 });
        assert!(!registry.contains(b.id()));
        assert!(b.is_closed());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[test]
    fn slow_transport_is_evicted() {
        let registry = TransportRegistry::new(1);
        let (slow, _rx) = registry.connect(TransportKind::EventStream);
        assert_eq!(registry.broadcast(Arc::from("1")).delivered, 1);
        let report = registry.broadcast(Arc::from("2"));
        assert_eq!(report.evicted, 1);
        assert!(!registry.contains(slow.id()));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = TransportRegistry::new(8);
        let (handle, _rx) = registry.connect(TransportKind::WebSocket);
        assert!(registry.remove(handle.id()));
        assert!(!registry.remove(handle.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn removed_handle_is_never_reused() {
        let registry = TransportRegistry::new(8);
        let (handle, _rx) = registry.connect(TransportKind::WebSocket);
        let _ = registry.remove(handle.id());
        assert_eq!(
            handle.send(Arc::from("late")),
            Err(TransportSendError::Closed)
        );
    }

    #[test]
    fn re_adding_same_id_closes_previous() {
        let registry = TransportRegistry::new(8);
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let first = Arc::new(TransportHandle::new("same".into(), TransportKind::WebSocket, tx1));
        let second = Arc::new(TransportHandle::new("same".into(), TransportKind::WebSocket, tx2));
        registry.add(Arc::clone(&first));
        registry.add(Arc::clone(&second));
        assert_eq!(registry.len(), 1);
        assert!(first.is_closed());
        assert!(!second.is_closed());
    }

    #[test]
    fn describe_lists_transports() {
        let registry = TransportRegistry::new(8);
        let (handle, _rx) = registry.connect(TransportKind::EventStream);
        let info = registry.describe();
        assert_eq!(info.len(), 1);
        assert_eq!(&info[0].id, handle.id());
        assert_eq!(info[0].kind, TransportKind::EventStream);
    }
}
