//! Pending request table.
//!
//! Maps correlation ids to the resolver of the caller waiting on them.
//! Every path that settles a request (reply, timeout, cancel, sweep) first
//! removes the entry; only the remover may use the resolver, so each request
//! resolves at most once.

use dashmap::DashMap;
use drawbridge_core::{BridgeError, CorrelationId};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// What a waiting caller eventually receives.
pub type Resolution = Result<Value, BridgeError>;

/// One outstanding request.
#[derive(Debug)]
pub struct PendingRequest {
    /// Command name, for errors and logs.
    pub command: String,
    /// When the request was registered.
    pub created_at: Instant,
    /// When the request times out.
    pub deadline: Instant,
    /// Registration number, distinguishes a reused id from its predecessor.
    pub seq: u64,
    /// Completes the caller's wait.
    pub resolver: oneshot::Sender<Resolution>,
}

/// Correlation id → pending request.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: DashMap<CorrelationId, PendingRequest>,
}

impl PendingTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, returning any entry previously stored under `id`.
    pub fn insert(&self, id: CorrelationId, request: PendingRequest) -> Option<PendingRequest> {
        self.entries.insert(id, request)
    }

    /// Remove and return the entry for `id`.
    pub fn take(&self, id: &CorrelationId) -> Option<PendingRequest> {
        self.entries.remove(id).map(|(_, request)| request)
    }

    /// Remove the entry for `id` only if it is registration `seq`.
    pub fn take_if_seq(&self, id: &CorrelationId, seq: u64) -> Option<PendingRequest> {
        self.entries
            .remove_if(id, |_, request| request.seq == seq)
            .map(|(_, request)| request)
    }

    /// Remove every entry whose deadline is at or before `now`.
    pub fn take_expired(&self, now: Instant) -> Vec<(CorrelationId, PendingRequest)> {
        let expired: Vec<CorrelationId> = self
            .entries
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove_if(&id, |_, request| request.deadline <= now))
            .collect()
    }

    /// Whether `id` is pending.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No pending entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
