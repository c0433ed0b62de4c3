//! In-memory probe counters between flushes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scanaware_common::types::{Event, ScanKey, ScanRecord};
use tokio::sync::mpsc;

/// Per-key counters shared by the event consumer and the flush step.
///
/// The lock is held for a single insert or for the swap in
/// [`PendingCounters::drain`], never across I/O.
#[derive(Debug, Clone, Default)]
pub struct PendingCounters {
    inner: Arc<Mutex<HashMap<ScanKey, ScanRecord>>>,
}

impl PendingCounters {
    /// Creates an empty counter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScanKey, ScanRecord>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts one event under its `(source, port, protocol, day)` key.
    pub fn record(&self, event: &Event) {
        let key = ScanKey::from(event);
        let mut pending = self.lock();
        match pending.get_mut(&key) {
            Some(record) => record.observe(event.timestamp),
            None => {
                let _ = pending.insert(key, ScanRecord::from_event(event));
            }
        }
    }

    /// Swaps in an empty map and returns everything counted so far.
    #[must_use]
    pub fn drain(&self) -> Vec<ScanRecord> {
        let taken = std::mem::take(&mut *self.lock());
        taken.into_values().collect()
    }

    /// Sum of counts across all pending keys.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.lock().values().map(|r| r.count).sum()
    }

    /// Number of distinct keys pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Folds every event from `events` into `counters` until the channel closes.
pub async fn consume(mut events: mpsc::Receiver<Event>, counters: PendingCounters) {
    tracing::debug!("event consumer started");
    while let Some(event) = events.recv().await {
        counters.record(&event);
    }
    tracing::debug!("event consumer stopped, channel closed");
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use scanaware_common::types::Protocol;

    use super::*;

    fn event(ip: &str, port: u16, secs: i64) -> Event {
        Event {
            source_ip: ip.into(),
            port,
            protocol: Protocol::Tcp,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs),
        }
    }

    #[test]
    fn same_key_events_accumulate() {
        let counters = PendingCounters::new();
        counters.record(&event("203.0.113.5", 22, 30));
        counters.record(&event("203.0.113.5", 22, 0));

        assert_eq!(counters.total(), 2);
        let drained = counters.drain();
        assert_eq!(drained.len(), 1);
        let record = &drained[0];
        assert_eq!(record.count, 2);
        assert_eq!(record.first_seen, event("x", 0, 0).timestamp);
        assert_eq!(record.last_seen, event("x", 0, 30).timestamp);
    }

    #[test]
    fn distinct_keys_stay_separate() {
        let counters = PendingCounters::new();
        counters.record(&event("203.0.113.5", 22, 0));
        counters.record(&event("203.0.113.5", 23, 0));
        counters.record(&event("203.0.113.6", 22, 0));
        let mut udp = event("203.0.113.5", 22, 0);
        udp.protocol = Protocol::Udp;
        counters.record(&udp);
        assert_eq!(counters.len(), 4);
    }

    #[test]
    fn events_on_different_days_are_separate_keys() {
        let counters = PendingCounters::new();
        counters.record(&event("203.0.113.5", 22, 0));
        counters.record(&event("203.0.113.5", 22, 86_400));
        assert_eq!(counters.len(), 2);
    }

    #[test]
    fn drain_resets_the_map() {
        let counters = PendingCounters::new();
        counters.record(&event("203.0.113.5", 22, 0));
        assert_eq!(counters.drain().len(), 1);
        assert!(counters.is_empty());
        assert!(counters.drain().is_empty());
    }

    #[tokio::test]
    async fn consumer_counts_until_channel_closes() {
        let counters = PendingCounters::new();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(consume(rx, counters.clone()));
        for _ in 0..3 {
            tx.send(event("198.51.100.1", 3389, 0)).await.unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let drained = counters.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].count, 3);
    }
}
