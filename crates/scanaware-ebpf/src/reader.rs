//! Ring-buffer record decoding and hand-off.
//!
//! Each record the classifier emits is decoded into an [`Event`] and
//! offered to a bounded channel without waiting. A full channel drops the
//! event; short records are skipped. Both are counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use scanaware_classifier::{IPPROTO_UDP, RawEvent};
use scanaware_common::types::{Event, Protocol};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Snapshot of the reader's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    /// Records decoded and delivered to the channel.
    pub delivered: u64,
    /// Records shorter than the wire layout.
    pub short_records: u64,
    /// Events dropped because the channel was full.
    pub dropped_full: u64,
}

/// Live counters shared between the reader task and the scanner handle.
#[derive(Debug, Default)]
pub struct ReaderCounters {
    delivered: AtomicU64,
    short_records: AtomicU64,
    dropped_full: AtomicU64,
}

impl ReaderCounters {
    /// Reads the current values.
    pub fn snapshot(&self) -> ReaderStats {
        ReaderStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            short_records: self.short_records.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
        }
    }
}

/// Decodes one ring-buffer sample stamped with `at`.
///
/// Returns `None` for samples shorter than the record layout.
pub fn decode_record(sample: &[u8], at: DateTime<Utc>) -> Option<Event> {
    let raw = RawEvent::from_bytes(sample)?;
    let protocol = if raw.protocol == IPPROTO_UDP {
        Protocol::Udp
    } else {
        Protocol::Tcp
    };
    Some(Event {
        source_ip: raw.source().to_string(),
        port: raw.port(),
        protocol,
        timestamp: at,
    })
}

/// What happened to one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Decoded and queued.
    Sent,
    /// Too short to decode.
    Short,
    /// Decoded but the channel was full.
    Dropped,
    /// The consumer is gone.
    Closed,
}

/// Producer side of the event channel.
#[derive(Debug, Clone)]
pub struct Forwarder {
    tx: mpsc::Sender<Event>,
    counters: Arc<ReaderCounters>,
}

impl Forwarder {
    /// Wraps the sender half of the event channel.
    pub const fn new(tx: mpsc::Sender<Event>, counters: Arc<ReaderCounters>) -> Self {
        Self { tx, counters }
    }

    /// Decodes `sample` and offers it to the channel without waiting.
    pub fn forward(&self, sample: &[u8]) -> Delivery {
        let Some(event) = decode_record(sample, Utc::now()) else {
            let _ = self.counters.short_records.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(len = sample.len(), "skipping short ring buffer record");
            return Delivery::Short;
        };
        match self.tx.try_send(event) {
            Ok(()) => {
                let _ = self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                Delivery::Sent
            }
            Err(TrySendError::Full(event)) => {
                let dropped = self.counters.dropped_full.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(
                    source_ip = %event.source_ip,
                    port = event.port,
                    dropped,
                    "event channel full, dropping"
                );
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
