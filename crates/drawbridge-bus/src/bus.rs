//! Correlation bus.
//!
//! Turns a fire-and-forget broadcast into an awaitable request:
//!
//! 1. `dispatch` mints an id, registers a pending entry, then emits the
//!    command on the outbound channel
//! 2. the forwarder broadcasts it and later republishes a reply
//! 3. `on_reply` removes the matching entry and completes the caller
//! 4. the caller's wait ends with the reply, a timeout or a cancellation
//!
//! Registration always happens before emission, so a reply can never
//! arrive for an id that is not yet pending.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use drawbridge_core::{
    BridgeError, CorrelationId, EditorCommand, InboundReply, OutboundCommand, ReplyOutcome,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, instrument, warn};

use crate::id_source::IdSource;
use crate::pending::{PendingRequest, PendingTable, Resolution};
use crate::telemetry;

#[derive(Debug, Default)]
struct Counters {
    registered: AtomicU64,
    completed: AtomicU64,
    remote_errors: AtomicU64,
    timeouts: AtomicU64,
    cancelled: AtomicU64,
    abandoned: AtomicU64,
    unmatched: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of bus activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Requests registered.
    pub registered: u64,
    /// Requests resolved by a success reply.
    pub completed: u64,
    /// Requests resolved by an error reply.
    pub remote_errors: u64,
    /// Requests that hit their deadline.
    pub timeouts: u64,
    /// Requests cancelled through [`CorrelationBus::cancel`].
    pub cancelled: u64,
    /// Requests whose caller stopped waiting.
    pub abandoned: u64,
    /// Replies that matched nothing pending.
    pub unmatched_replies: u64,
    /// Entries pending right now.
    pub pending: usize,
}

struct Inner {
    ids: Arc<dyn IdSource>,
    pending: PendingTable,
    outbound: mpsc::UnboundedSender<OutboundCommand>,
    default_timeout: Duration,
    seq: AtomicU64,
    counters: Counters,
}

/// Request/reply correlation over a broadcast channel. Cheap to clone.
#[derive(Clone)]
pub struct CorrelationBus {
    inner: Arc<Inner>,
}

impl CorrelationBus {
    /// Bus emitting on `outbound`, with `default_timeout` per request.
    pub fn new(
        ids: Arc<dyn IdSource>,
        outbound: mpsc::UnboundedSender<OutboundCommand>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ids,
                pending: PendingTable::new(),
                outbound,
                default_timeout,
                seq: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Deadline applied by [`request`](Self::request) and [`dispatch`](Self::dispatch).
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Send `name` with `payload` to the editor and wait for its reply.
    #[instrument(skip(self, payload), fields(command = %name))]
    pub async fn request(&self, name: &str, payload: Value) -> Resolution {
        self.dispatch(name, payload).wait().await
    }

    /// [`request`](Self::request) for a validated catalogue command.
    pub async fn execute(&self, command: &EditorCommand) -> Resolution {
        self.request(command.name(), command.payload()).await
    }

    /// Register and emit without waiting.
    pub fn dispatch(&self, name: &str, payload: Value) -> PendingCall {
        self.dispatch_with_timeout(name, payload, self.inner.default_timeout)
    }

    /// [`dispatch`](Self::dispatch) with an explicit deadline.
    pub fn dispatch_with_timeout(&self, name: &str, payload: Value, timeout: Duration) -> PendingCall {
        let inner = &self.inner;
        let id = inner.ids.next_id();
        let seq = inner.seq.fetch_add(1, Ordering::Relaxed);
        let (resolver, rx) = oneshot::channel();
        let created_at = Instant::now();
        let deadline = created_at + timeout;

        let entry = PendingRequest {
            command: name.to_owned(),
            created_at,
            deadline,
            seq,
            resolver,
        };
        if let Some(previous) = inner.pending.insert(id.clone(), entry) {
            // The previous caller's resolver is dropped with the entry.
            warn!(
                correlation_id = %id,
                previous_command = %previous.command,
                "correlation id collision, previous request overwritten"
            );
        }
        bump(&inner.counters.registered);
        metrics::counter!(telemetry::REQUESTS_TOTAL, "command" => name.to_owned()).increment(1);

        let command = OutboundCommand {
            id: id.clone(),
            name: name.to_owned(),
            payload,
        };
        if inner.outbound.send(command).is_err() {
            warn!(correlation_id = %id, "outbound channel closed, request will time out");
        } else {
            debug!(correlation_id = %id, timeout_ms = timeout.as_millis(), "request dispatched");
        }

        PendingCall {
            inner: Arc::clone(inner),
            id,
            command: name.to_owned(),
            seq,
            timeout,
            created_at,
            deadline,
            rx,
            settled: false,
        }
    }

    /// Deliver a reply. Returns `true` if it resolved a pending request.
    ///
    /// Replies for unknown or already settled ids are dropped.
    pub fn on_reply(&self, reply: InboundReply) -> bool {
        let inner = &self.inner;
        let Some(entry) = inner.pending.take(&reply.id) else {
            bump(&inner.counters.unmatched);
            metrics::counter!(telemetry::UNMATCHED_REPLIES_TOTAL).increment(1);
            warn!(correlation_id = %reply.id, "reply for unknown or settled request, dropping");
            return false;
        };

        let elapsed = entry.created_at.elapsed();
        let (resolution, counter) = match reply.outcome {
            ReplyOutcome::Success(payload) => (Ok(payload), &inner.counters.completed),
            ReplyOutcome::Error(payload) => (
                Err(BridgeError::RemoteExecution {
                    id: reply.id.clone(),
                    command: entry.command.clone(),
                    payload,
                }),
                &inner.counters.remote_errors,
            ),
        };

        if entry.resolver.send(resolution).is_err() {
            debug!(correlation_id = %reply.id, "caller stopped waiting before reply");
            return false;
        }
        bump(counter);
        debug!(
            correlation_id = %reply.id,
            command = %entry.command,
            elapsed_ms = elapsed.as_millis(),
            "request resolved"
        );
        true
    }

    /// Cancel a pending request; its caller fails with [`BridgeError::Cancelled`].
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        let Some(entry) = self.inner.pending.take(id) else {
            return false;
        };
        bump(&self.inner.counters.cancelled);
        debug!(correlation_id = %id, command = %entry.command, "request cancelled");
        let _ = entry.resolver.send(Err(BridgeError::Cancelled {
            id: id.clone(),
            command: entry.command,
        }));
        true
    }

    /// Resolve every entry past its deadline with a timeout.
    ///
    /// Waiters normally time themselves out; this catches entries whose
    /// waiter is not being polled.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired = self.inner.pending.take_expired(now);
        let count = expired.len();
        for (id, entry) in expired {
            bump(&self.inner.counters.timeouts);
            let timeout = entry.deadline.saturating_duration_since(entry.created_at);
            warn!(correlation_id = %id, command = %entry.command, "sweeping expired request");
            let _ = entry.resolver.send(Err(BridgeError::Timeout {
                id,
                command: entry.command,
                timeout,
            }));
        }
        count
    }

    /// Number of outstanding requests.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether `id` is outstanding.
    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.inner.pending.contains(id)
    }

    /// Activity counters.
    pub fn stats(&self) -> BusStats {
        let c = &self.inner.counters;
        BusStats {
            registered: c.registered.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            remote_errors: c.remote_errors.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            abandoned: c.abandoned.load(Ordering::Relaxed),
            unmatched_replies: c.unmatched.load(Ordering::Relaxed),
            pending: self.inner.pending.len(),
        }
    }
}

/// A dispatched request.
///
/// Dropping it before [`wait`](Self::wait) completes withdraws the pending
/// entry, so a later reply is treated as unknown.
#[must_use = "dropping a PendingCall abandons the request"]
pub struct PendingCall {
    inner: Arc<Inner>,
    id: CorrelationId,
    command: String,
    seq: u64,
    timeout: Duration,
    created_at: Instant,
    deadline: Instant,
    rx: oneshot::Receiver<Resolution>,
    settled: bool,
}

impl PendingCall {
    /// Correlation id of the request.
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Command name.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// When the request times out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the reply, the deadline or a cancellation.
    pub async fn wait(mut self) -> Resolution {
        let result = match timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Err(self.cancelled()),
            Err(_) => self.expire().await,
        };
        self.settled = true;
        record_outcome(&result, self.created_at.elapsed());
        result
    }

    async fn expire(&mut self) -> Resolution {
        if self
            .inner
            .pending
            .take_if_seq(&self.id, self.seq)
            .is_some()
        {
            bump(&self.inner.counters.timeouts);
            warn!(
                correlation_id = %self.id,
                command = %self.command,
                timeout_ms = self.timeout.as_millis(),
                "request timed out"
            );
            return Err(BridgeError::Timeout {
                id: self.id.clone(),
                command: self.command.clone(),
                timeout: self.timeout,
            });
        }
        // Someone else removed the entry first and is about to resolve it.
        match (&mut self.rx).await {
            Ok(resolution) => resolution,
            Err(_) => Err(self.cancelled()),
        }
    }

    fn cancelled(&self) -> BridgeError {
        BridgeError::Cancelled {
            id: self.id.clone(),
            command: self.command.clone(),
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self
            .inner
            .pending
            .take_if_seq(&self.id, self.seq)
            .is_some()
        {
            bump(&self.inner.counters.abandoned);
            debug!(correlation_id = %self.id, "caller dropped request, entry removed");
        }
    }
}

fn record_outcome(result: &Resolution, elapsed: Duration) {
    let outcome = match result {
        Ok(_) => "success",
        Err(BridgeError::RemoteExecution { .. }) => "remote_error",
        Err(BridgeError::Timeout { .. }) => "timeout",
        Err(BridgeError::Cancelled { .. }) => "cancelled",
    };
    metrics::counter!(telemetry::REQUEST_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::id_source::SequentialIdSource;

    fn bus(timeout: Duration) -> (CorrelationBus, mpsc::UnboundedReceiver<OutboundCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = CorrelationBus::new(Arc::new(SequentialIdSource::new("req")), tx, timeout);
        (bus, rx)
    }

    struct FixedId;

    impl IdSource for FixedId {
        fn next_id(&self) -> CorrelationId {
            "same".into()
        }
    }

    #[tokio::test]
    async fn dispatch_registers_before_emitting() {
        let (bus, mut out) = bus(Duration::from_secs(15));
        let call = bus.dispatch("add-rectangle", json!({"x": 100, "y": 100, "width": 200, "height": 100}));

        let emitted = out.recv().await.unwrap();
        assert_eq!(&emitted.id, call.id());
        assert_eq!(emitted.name, "add-rectangle");
        assert_eq!(emitted.payload["width"], 200);
        assert!(bus.is_pending(call.id()));
    }

    #[tokio::test]
    async fn success_reply_resolves_caller() {
        let (bus, mut out) = bus(Duration::from_secs(15));
        let responder = bus.clone();
        let _task = tokio::spawn(async move {
            let cmd = out.recv().await.unwrap();
            assert!(responder.on_reply(InboundReply::success(cmd.id, json!({"cellId": "abc123"}))));
        });

        let result = bus
            .request("add-rectangle", json!({"x": 100, "y": 100, "width": 200, "height": 100}))
            .await
            .unwrap();
        assert_eq!(result, json!({"cellId": "abc123"}));
        assert_eq!(bus.pending_count(), 0);
        assert_eq!(bus.stats().completed, 1);
    }

    #[tokio::test]
    async fn error_reply_keeps_payload() {
        let (bus, mut out) = bus(Duration::from_secs(15));
        let call = bus.dispatch("delete-cell-by-id", json!({"cellId": "missing"}));
        let cmd = out.recv().await.unwrap();
        assert!(bus.on_reply(InboundReply::error(cmd.id, json!({"message": "cell not found"}))));

        let err = call.wait().await.unwrap_err();
        assert_matches!(
            err,
            BridgeError::RemoteExecution { ref command, ref payload, .. }
                if command == "delete-cell-by-id" && payload["message"] == "cell not found"
        );
        assert_eq!(bus.stats().remote_errors, 1);
    }

    #[tokio::test]
    async fn reply_for_departed_waiter_is_not_counted() {
        let (bus, _out) = bus(Duration::from_secs(15));
        for (id, outcome) in [
            ("gone-ok", ReplyOutcome::Success(json!({"cellId": "c1"}))),
            ("gone-err", ReplyOutcome::Error(json!({"message": "boom"}))),
        ] {
            let (resolver, rx) = oneshot::channel();
            drop(rx);
            let now = Instant::now();
            let _ = bus.inner.pending.insert(
                id.into(),
                PendingRequest {
                    command: "get-selected-cell".into(),
                    created_at: now,
                    deadline: now + Duration::from_secs(15),
                    seq: 0,
                    resolver,
                },
            );
            assert!(!bus.on_reply(InboundReply { id: id.into(), outcome }));
        }

        let stats = bus.stats();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.remote_errors, 0);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn null_payload_is_success() {
        let (bus, _out) = bus(Duration::from_secs(15));
        let call = bus.dispatch("set-cell-data", json!({}));
        let _ = bus.on_reply(InboundReply::success(call.id().clone(), Value::Null));
        assert_eq!(call.wait().await.unwrap(), Value::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn no_reply_times_out_at_deadline() {
        let (bus, _out) = bus(Duration::from_secs(2));
        let started = Instant::now();
        let err = bus.request("add-rectangle", json!({})).await.unwrap_err();

        assert_matches!(err, BridgeError::Timeout { timeout, .. } if timeout == Duration::from_secs(2));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_millis(2100));
        assert_eq!(bus.pending_count(), 0);
        assert_eq!(bus.stats().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_after_timeout_is_inert() {
        let (bus, _out) = bus(Duration::from_millis(500));
        let call = bus.dispatch("get-selected-cell", json!({}));
        let id = call.id().clone();
        assert_matches!(call.wait().await, Err(BridgeError::Timeout { .. }));

        assert!(!bus.on_reply(InboundReply::success(id, json!({"late": true}))));
        assert_eq!(bus.stats().unmatched_replies, 1);
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test]
    async fn first_reply_wins() {
        let (bus, _out) = bus(Duration::from_secs(15));
        let call = bus.dispatch("get-selected-cell", json!({}));
        let id = call.id().clone();

        assert!(bus.on_reply(InboundReply::success(id.clone(), json!({"tab": 1}))));
        assert!(!bus.on_reply(InboundReply::success(id.clone(), json!({"tab": 2}))));
        assert!(!bus.on_reply(InboundReply::error(id, json!("too late"))));

        assert_eq!(call.wait().await.unwrap(), json!({"tab": 1}));
    }

    #[tokio::test]
    async fn unknown_reply_changes_nothing() {
        let (bus, _out) = bus(Duration::from_secs(15));
        let call = bus.dispatch("get-selected-cell", json!({}));
        assert!(!bus.on_reply(InboundReply::success("nobody", json!(1))));
        assert_eq!(bus.pending_count(), 1);
        assert!(bus.is_pending(call.id()));
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_independently() {
        let (bus, mut out) = bus(Duration::from_secs(15));
        let a = bus.dispatch("add-edge", json!({"n": "a"}));
        let b = bus.dispatch("add-edge", json!({"n": "b"}));
        let first = out.recv().await.unwrap();
        let second = out.recv().await.unwrap();

        // answer in reverse order
        let _ = bus.on_reply(InboundReply::success(second.id, json!("b")));
        let _ = bus.on_reply(InboundReply::success(first.id, json!("a")));

        assert_eq!(a.wait().await.unwrap(), json!("a"));
        assert_eq!(b.wait().await.unwrap(), json!("b"));
    }

    #[tokio::test]
    async fn cancel_fails_the_caller() {
        let (bus, _out) = bus(Duration::from_secs(15));
        let call = bus.dispatch("list-paged-model", json!({}));
        let id = call.id().clone();

        assert!(bus.cancel(&id));
        assert!(!bus.cancel(&id));
        assert_matches!(call.wait().await, Err(BridgeError::Cancelled { .. }));
        assert!(!bus.on_reply(InboundReply::success(id, json!(1))));
        assert_eq!(bus.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn dropping_call_removes_entry() {
        let (bus, _out) = bus(Duration::from_secs(15));
        let call = bus.dispatch("get-shape-categories", json!({}));
        let id = call.id().clone();
        drop(call);

        assert!(!bus.is_pending(&id));
        assert_eq!(bus.stats().abandoned, 1);
        assert!(!bus.on_reply(InboundReply::success(id, json!([]))));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_removes_entry() {
        let (bus, _out) = bus(Duration::from_secs(15));
        let call = bus.dispatch("get-shape-categories", json!({}));
        let id = call.id().clone();

        let outcome = tokio::time::timeout(Duration::from_millis(10), call.wait()).await;
        assert!(outcome.is_err());
        assert!(!bus.is_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_resolves_unpolled_waiters() {
        let (bus, _out) = bus(Duration::from_millis(100));
        let call = bus.dispatch("get-shape-by-name", json!({"shapeName": "cloud"}));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(bus.sweep_expired(), 1);
        assert_eq!(bus.pending_count(), 0);
        assert_matches!(call.wait().await, Err(BridgeError::Timeout { .. }));
        assert_eq!(bus.stats().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_leaves_live_requests() {
        let (bus, _out) = bus(Duration::from_secs(10));
        let _call = bus.dispatch("get-selected-cell", json!({}));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(bus.sweep_expired(), 0);
        assert_eq!(bus.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_delivered_at_deadline_wins() {
        let (bus, _out) = bus(Duration::from_millis(100));
        let call = bus.dispatch("edit-cell", json!({}));
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(bus.on_reply(InboundReply::success(call.id().clone(), json!("ok"))));
        assert_eq!(call.wait().await.unwrap(), json!("ok"));
        assert_eq!(bus.stats().timeouts, 0);
    }

    #[tokio::test]
    async fn id_collision_overwrites_previous() {
        let (tx, _out) = mpsc::unbounded_channel();
        let bus = CorrelationBus::new(Arc::new(FixedId), tx, Duration::from_secs(15));
        let first = bus.dispatch("add-edge", json!({}));
        let second = bus.dispatch("add-edge", json!({}));
        assert_eq!(bus.pending_count(), 1);

        assert!(bus.on_reply(InboundReply::success("same", json!("second"))));
        assert_matches!(first.wait().await, Err(BridgeError::Cancelled { .. }));
        assert_eq!(second.wait().await.unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn dropping_overwritten_call_keeps_newer_entry() {
        let (tx, _out) = mpsc::unbounded_channel();
        let bus = CorrelationBus::new(Arc::new(FixedId), tx, Duration::from_secs(15));
        let first = bus.dispatch("add-edge", json!({}));
        let _second = bus.dispatch("add-edge", json!({}));
        drop(first);
        assert_eq!(bus.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_outbound_channel_times_out() {
        let (bus, out) = bus(Duration::from_secs(1));
        drop(out);
        assert_matches!(
            bus.request("add-rectangle", json!({})).await,
            Err(BridgeError::Timeout { .. })
        );
    }

    #[tokio::test]
    async fn execute_uses_catalogue_name_and_payload() {
        let (bus, mut out) = bus(Duration::from_secs(15));
        let command = EditorCommand::parse("delete-cell-by-id", json!({"cellId": "c9"})).unwrap();
        let responder = bus.clone();
        let _task = tokio::spawn(async move {
            let cmd = out.recv().await.unwrap();
            assert_eq!(cmd.name, "delete-cell-by-id");
            assert_eq!(cmd.payload, json!({"cellId": "c9"}));
            let _ = responder.on_reply(InboundReply::success(cmd.id, json!({"deleted": true})));
        });
        assert_eq!(bus.execute(&command).await.unwrap(), json!({"deleted": true}));
    }
}
