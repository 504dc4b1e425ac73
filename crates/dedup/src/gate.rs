use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    dashmap::{DashMap, mapref::entry::Entry as MapEntry},
    tracing::debug,
};

/// Lifecycle of a message id inside the gate.
#[derive(Debug, Clone, Copy)]
enum Entry {
    /// Admitted, business action still running.
    InFlight { since: Instant },
    /// Finalized; replays are rejected until the entry ages out.
    Processed { at: Instant },
}

/// Counters exposed for operator visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub in_flight: usize,
    pub processed: usize,
}

/// Atomic check-and-set admission gate for inbound message ids.
///
/// Entries older than the TTL are forgotten by [`DedupGate::sweep`]. A replay
/// arriving after eviction is therefore admitted again — a deliberate
/// bounded-memory trade-off, not a correctness bug: the upstream channel
/// stops re-delivering long before the window closes.
pub struct DedupGate {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl DedupGate {
    /// Gate with a one hour retention window, matching the channel's
    /// observed redelivery horizon.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(3600))
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Atomically admit a message id.
    ///
    /// Returns `false` if the id is already in flight or already finalized.
    /// Exactly one of any set of concurrent callers for the same id wins.
    pub fn acquire(&self, message_id: &str) -> bool {
        match self.entries.entry(message_id.to_string()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::InFlight {
                    since: Instant::now(),
                });
                true
            },
        }
    }

    /// Return an in-flight id to available, so a failed handler can be
    /// retried before finalization. Finalized ids are left untouched.
    pub fn release(&self, message_id: &str) {
        self.entries
            .remove_if(message_id, |_, entry| matches!(entry, Entry::InFlight { .. }));
    }

    /// Finalize an id. Subsequent [`DedupGate::acquire`] calls return `false`
    /// for the lifetime of the retention window.
    pub fn mark_processed(&self, message_id: &str) {
        self.entries
            .insert(message_id.to_string(), Entry::Processed { at: Instant::now() });
    }

    /// Drop entries older than the TTL. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| match entry {
            Entry::InFlight { since } => since.elapsed() < ttl,
            Entry::Processed { at } => at.elapsed() < ttl,
        });
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, "dedup gate sweep");
        }
        evicted
    }

    #[must_use]
    pub fn stats(&self) -> GateStats {
        let mut stats = GateStats::default();
        for entry in &self.entries {
            match entry.value() {
                Entry::InFlight { .. } => stats.in_flight += 1,
                Entry::Processed { .. } => stats.processed += 1,
            }
        }
        stats
    }

    /// Spawn a background task sweeping this gate at a fixed interval.
    /// The task ends when the last reference to the gate is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let gate = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match gate.upgrade() {
                    Some(gate) => {
                        gate.sweep();
                    },
                    None => break,
                }
            }
        })
    }
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_exclusive() {
        let gate = DedupGate::new();
        assert!(gate.acquire("m1"));
        assert!(!gate.acquire("m1"));
        assert!(gate.acquire("m2"));
    }

    #[test]
    fn release_reopens_in_flight_only() {
        let gate = DedupGate::new();
        assert!(gate.acquire("m1"));
        gate.release("m1");
        assert!(gate.acquire("m1"));

        gate.mark_processed("m1");
        gate.release("m1");
        assert!(!gate.acquire("m1"), "finalized id must stay closed");
    }

    #[test]
    fn mark_processed_is_permanent_within_window() {
        let gate = DedupGate::new();
        assert!(gate.acquire("m1"));
        gate.mark_processed("m1");
        assert!(!gate.acquire("m1"));
        assert!(!gate.acquire("m1"));
    }

    #[test]
    fn sweep_forgets_old_entries() {
        let gate = DedupGate::with_ttl(Duration::ZERO);
        assert!(gate.acquire("m1"));
        gate.mark_processed("m1");
        assert_eq!(gate.sweep(), 1);
        // After eviction the id is admissible again (documented trade-off).
        assert!(gate.acquire("m1"));
    }

    #[tokio::test]
    async fn concurrent_acquire_exactly_one_wins() {
        let gate = Arc::new(DedupGate::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.acquire("same-id") }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[test]
    fn stats_reflect_lifecycle() {
        let gate = DedupGate::new();
        gate.acquire("a");
        gate.acquire("b");
        gate.mark_processed("b");
        assert_eq!(
            gate.stats(),
            GateStats {
                in_flight: 1,
                processed: 1
            }
        );
    }
}
