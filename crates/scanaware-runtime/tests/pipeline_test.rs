//! End-to-end tests for the aggregation pipeline.
//!
//! A fake backend stands in for the kernel classifier: each session hands
//! the job a channel whose sender the test keeps, so events flow through the
//! real consumer, counters, flush, store, and retention.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use scanaware_common::config::ScanSettings;
use scanaware_common::error::{Result, ScanError};
use scanaware_common::types::{Event, Protocol, ScanRecord};
use scanaware_ebpf::ReaderStats;
use scanaware_runtime::backend::{ScanBackend, ScanSession};
use scanaware_runtime::counters::PendingCounters;
use scanaware_runtime::job::ScanJob;
use scanaware_runtime::settings::SettingsSource;
use scanaware_runtime::store::{MemoryStore, ScanStore};
use tokio::sync::mpsc;

// ── Fakes ────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeKernel {
    starts: AtomicUsize,
    closes: AtomicUsize,
    fail_attach: AtomicBool,
    dropped: AtomicU64,
    senders: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl FakeKernel {
    fn sender(&self) -> mpsc::Sender<Event> {
        self.senders
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no session started")
    }
}

struct FakeBackend(Arc<FakeKernel>);

struct FakeSession {
    kernel: Arc<FakeKernel>,
    events: Option<mpsc::Receiver<Event>>,
    interfaces: Vec<String>,
    closed: bool,
}

impl ScanSession for FakeSession {
    fn take_events(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.events.take()
    }

    fn stats(&self) -> ReaderStats {
        ReaderStats {
            dropped_full: self.kernel.dropped.load(Ordering::SeqCst),
            ..ReaderStats::default()
        }
    }

    fn interfaces(&self) -> Vec<String> {
        self.interfaces.clone()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let _ = self.kernel.closes.fetch_add(1, Ordering::SeqCst);
            self.kernel.senders.lock().unwrap().clear();
        }
        Ok(())
    }
}

impl ScanBackend for FakeBackend {
    fn supported(&self) -> bool {
        true
    }

    fn start(&self, interfaces: &[String]) -> Result<Box<dyn ScanSession>> {
        let _ = self.0.starts.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_attach.load(Ordering::SeqCst) {
            return Err(ScanError::AttachFailed {
                interface: "eth9".into(),
                reason: "no such device".into(),
            });
        }
        let (tx, rx) = mpsc::channel(64);
        self.0.senders.lock().unwrap().push(tx);
        let interfaces = if interfaces.is_empty() {
            vec!["eth0".into()]
        } else {
            interfaces.to_vec()
        };
        Ok(Box::new(FakeSession {
            kernel: Arc::clone(&self.0),
            events: Some(rx),
            interfaces,
            closed: false,
        }))
    }
}

#[derive(Clone)]
struct SharedSettings(Arc<Mutex<ScanSettings>>);

impl SharedSettings {
    fn enabled() -> Self {
        Self(Arc::new(Mutex::new(ScanSettings {
            enabled: true,
            ..ScanSettings::default()
        })))
    }

    fn update(&self, change: impl FnOnce(&mut ScanSettings)) {
        change(&mut self.0.lock().unwrap());
    }
}

impl SettingsSource for SharedSettings {
    fn load(&self) -> Result<ScanSettings> {
        Ok(self.0.lock().unwrap().clone())
    }
}

struct Harness {
    job: ScanJob,
    kernel: Arc<FakeKernel>,
    settings: SharedSettings,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let kernel = Arc::new(FakeKernel::default());
    let settings = SharedSettings::enabled();
    let store = Arc::new(MemoryStore::new());
    let job = ScanJob::new(
        Box::new(settings.clone()),
        Box::new(FakeBackend(Arc::clone(&kernel))),
        store.clone(),
    );
    Harness {
        job,
        kernel,
        settings,
        store,
    }
}

fn scan_event(ip: &str, port: u16) -> Event {
    Event {
        source_ip: ip.into(),
        port,
        protocol: Protocol::Tcp,
        timestamp: Utc::now(),
    }
}

async fn wait_for(counters: &PendingCounters, total: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while counters.total() < total {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("consumer did not count the events in time");
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn stored(store: &MemoryStore) -> Vec<ScanRecord> {
    store
        .records(NaiveDate::MIN, NaiveDate::MAX)
        .expect("records failed")
}

// ── Aggregation ──────────────────────────────────────────────────────

#[tokio::test]
async fn identical_events_aggregate_into_one_row() {
    let mut h = harness();
    assert!(h.job.tick().scanning);

    let tx = h.kernel.sender();
    let first = scan_event("203.0.113.10", 2222);
    let mut second = first.clone();
    second.timestamp = first.timestamp + chrono::Duration::seconds(5);
    tx.send(second.clone()).await.unwrap();
    tx.send(first.clone()).await.unwrap();
    wait_for(h.job.counters(), 2).await;

    let report = h.job.tick();
    assert_eq!(report.flushed, 1);
    let rows = stored(&h.store);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 2);
    assert_eq!(rows[0].first_seen, first.timestamp);
    assert_eq!(rows[0].last_seen, second.timestamp);
    assert_eq!(h.kernel.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn later_flushes_increment_stored_rows() {
    let mut h = harness();
    let _ = h.job.tick();
    let tx = h.kernel.sender();

    tx.send(scan_event("198.51.100.4", 3389)).await.unwrap();
    wait_for(h.job.counters(), 1).await;
    let _ = h.job.tick();

    tx.send(scan_event("198.51.100.4", 3389)).await.unwrap();
    tx.send(scan_event("198.51.100.4", 3389)).await.unwrap();
    wait_for(h.job.counters(), 2).await;
    let _ = h.job.tick();

    let rows = stored(&h.store);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 3);
}

// ── Retention ────────────────────────────────────────────────────────

#[tokio::test]
async fn retention_drops_only_rows_outside_the_window() {
    let mut h = harness();
    h.settings.update(|s| s.retention_days = 7);

    let mut old = ScanRecord::from_event(&scan_event("203.0.113.1", 22));
    old.date = today().checked_sub_days(Days::new(30)).unwrap();
    let mut recent = ScanRecord::from_event(&scan_event("203.0.113.2", 22));
    recent.date = today().checked_sub_days(Days::new(2)).unwrap();
    h.store.upsert(&[old, recent]).expect("upsert failed");

    let report = h.job.tick();
    assert_eq!(report.expired, 1);
    let rows = stored(&h.store);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source_ip, "203.0.113.2");
}

// ── Geo enrichment ───────────────────────────────────────────────────

#[tokio::test]
async fn missing_geoip_database_leaves_geo_empty() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let mut h = harness();
    h.settings
        .update(|s| s.geoip_path = Some(dir.path().join("GeoLite2-City.mmdb")));
    let _ = h.job.tick();

    h.kernel
        .sender()
        .send(scan_event("192.0.2.77", 8080))
        .await
        .unwrap();
    wait_for(h.job.counters(), 1).await;
    assert_eq!(h.job.tick().flushed, 1);

    let rows = stored(&h.store);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].geo().is_empty());
}

// ── Scanner lifecycle ────────────────────────────────────────────────

#[tokio::test]
async fn attach_failure_is_retried_next_tick() {
    let mut h = harness();
    h.settings.update(|s| s.interfaces = vec!["eth9".into()]);
    h.kernel.fail_attach.store(true, Ordering::SeqCst);

    let report = h.job.tick();
    assert!(report.enabled);
    assert!(!report.scanning);
    assert!(!h.job.is_scanning());

    h.kernel.fail_attach.store(false, Ordering::SeqCst);
    assert!(h.job.tick().scanning);
    assert_eq!(h.kernel.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disabling_stops_the_scanner_and_flushes() {
    let mut h = harness();
    let _ = h.job.tick();
    h.kernel
        .sender()
        .send(scan_event("203.0.113.99", 23))
        .await
        .unwrap();
    wait_for(h.job.counters(), 1).await;

    h.settings.update(|s| s.enabled = false);
    let report = h.job.tick();
    assert!(!report.enabled);
    assert!(!report.scanning);
    assert_eq!(report.flushed, 1);
    assert!(!h.job.is_scanning());
    assert_eq!(h.kernel.closes.load(Ordering::SeqCst), 1);
    assert_eq!(stored(&h.store).len(), 1);

    let _ = h.job.tick();
    assert_eq!(h.kernel.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn interface_change_restarts_the_scanner() {
    let mut h = harness();
    let _ = h.job.tick();
    let _ = h.job.tick();
    assert_eq!(h.kernel.starts.load(Ordering::SeqCst), 1);

    h.settings.update(|s| s.interfaces = vec!["eth1".into()]);
    assert!(h.job.tick().scanning);
    assert_eq!(h.kernel.starts.load(Ordering::SeqCst), 2);
    assert_eq!(h.kernel.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn channel_drops_do_not_stop_the_pipeline() {
    let mut h = harness();
    let _ = h.job.tick();
    h.kernel.dropped.store(17, Ordering::SeqCst);
    let report = h.job.tick();
    assert!(report.scanning);
    assert_eq!(h.kernel.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_flushes_pending_counts() {
    let mut h = harness();
    let _ = h.job.tick();
    h.kernel
        .sender()
        .send(scan_event("203.0.113.5", 5900))
        .await
        .unwrap();
    wait_for(h.job.counters(), 1).await;

    assert_eq!(h.job.shutdown().await, 1);
    assert!(!h.job.is_scanning());
    assert_eq!(stored(&h.store).len(), 1);
}

#[tokio::test]
async fn shutdown_counts_events_still_in_the_channel() {
    let mut h = harness();
    let _ = h.job.tick();
    let tx = h.kernel.sender();
    for _ in 0..3 {
        tx.try_send(scan_event("198.51.100.9", 3389)).unwrap();
    }
    drop(tx);

    // Nothing has been consumed yet; shutdown must drain the channel itself.
    assert_eq!(h.job.counters().total(), 0);
    assert_eq!(h.job.shutdown().await, 1);

    let rows = stored(&h.store);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 3);
    assert!(h.job.counters().is_empty());
}
