//! Correlation identifier minting.

use std::sync::atomic::{AtomicU64, Ordering};

use drawbridge_core::CorrelationId;

/// Produces correlation ids for outbound commands.
///
/// Ids must be unique among concurrently pending requests. The bus does not
/// check this beyond logging an overwrite.
pub trait IdSource: Send + Sync {
    /// Mint the next id.
    fn next_id(&self) -> CorrelationId;
}

/// UUID v7 ids, time-ordered.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_id(&self) -> CorrelationId {
        CorrelationId::new()
    }
}

/// `{prefix}-{n}` ids from an atomic counter.
#[derive(Debug)]
pub struct SequentialIdSource {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdSource {
    /// Counter starting at 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 1)
    }

    /// Counter starting at `first`.
    pub fn starting_at(prefix: impl Into<String>, first: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(first),
        }
    }
}

impl IdSource for SequentialIdSource {
    fn next_id(&self) -> CorrelationId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationId::from_string(format!("{}-{n}", self.prefix))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIdSource::new("req");
        assert_eq!(ids.next_id().as_str(), "req-1");
        assert_eq!(ids.next_id().as_str(), "req-2");
    }

    #[test]
    fn sequential_ids_unique_across_threads() {
        let ids = Arc::new(SequentialIdSource::starting_at("t", 100));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn uuid_ids_unique() {
        let ids = UuidIdSource;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
