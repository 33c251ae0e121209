//! One connected editor-side transport.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use drawbridge_core::{TransportId, TransportSendError};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

/// How the transport reaches the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Bidirectional WebSocket.
    WebSocket,
    /// Server-sent events, replies arrive over HTTP ingress.
    EventStream,
}

impl TransportKind {
    /// Short label for logs and health output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "web-socket",
            Self::EventStream => "event-stream",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Send side of a transport's outbound queue.
///
/// The connection task owns the receiver and writes queued messages to the
/// socket or stream. Sending never awaits.
pub struct TransportHandle {
    id: TransportId,
    kind: TransportKind,
    tx: mpsc::Sender<Arc<str>>,
    connected_at: Instant,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl TransportHandle {
    /// Wrap the sender of a fresh queue.
    pub fn new(id: TransportId, kind: TransportKind, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            kind,
            tx,
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Transport id.
    pub fn id(&self) -> &TransportId {
        &self.id
    }

    /// Transport kind.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Queue a message.
    pub fn send(&self, message: Arc<str>) -> Result<(), TransportSendError> {
        if self.is_closed() {
            return Err(TransportSendError::Closed);
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                match e {
                    TrySendError::Full(_) => Err(TransportSendError::Full),
                    TrySendError::Closed(_) => Err(TransportSendError::Closed),
                }
            }
        }
    }

    /// Mark closed; later sends fail with [`TransportSendError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Closed by the registry or the receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Messages that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Time since registration.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(capacity: usize) -> (TransportHandle, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            TransportHandle::new("t1".into(), TransportKind::WebSocket, tx),
            rx,
        )
    }

    #[tokio::test]
    async fn send_delivers() {
        let (handle, mut rx) = make(4);
        handle.send(Arc::from("hello")).unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert_eq!(handle.drop_count(), 0);
    }

    #[test]
    fn full_queue_is_a_failure() {
        let (handle, _rx) = make(1);
        handle.send(Arc::from("a")).unwrap();
        assert_eq!(handle.send(Arc::from("b")), Err(TransportSendError::Full));
        assert_eq!(handle.drop_count(), 1);
    }

    #[test]
    fn dropped_receiver_is_closed() {
        let (handle, rx) = make(4);
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.send(Arc::from("a")), Err(TransportSendError::Closed));
    }

    #[test]
    fn close_stops_sends() {
        let (handle, _rx) = make(4);
        handle.close();
        assert_eq!(handle.send(Arc::from("a")), Err(TransportSendError::Closed));
        assert_eq!(handle.kind().as_str(), "web-socket");
    }
}
