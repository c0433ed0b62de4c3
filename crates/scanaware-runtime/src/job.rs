//! The periodic aggregation tick.
//!
//! A [`ScanJob`] is driven by an external scheduler. Each [`ScanJob::tick`]
//! reconciles the scanner with the current settings, flushes pending
//! counters into the store, and applies retention.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use scanaware_common::config::ScanSettings;
use tokio::task::JoinHandle;

use crate::backend::{ScanBackend, ScanSession};
use crate::counters::{PendingCounters, consume};
use crate::geoip::{GeoIpCache, GeoLookup};
use crate::settings::SettingsSource;
use crate::store::ScanStore;

/// Upper bound on waiting for the pipeline tasks to finish at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Settings loaded and the feature is on.
    pub enabled: bool,
    /// A scanner session is running after the tick.
    pub scanning: bool,
    /// Records written to the store.
    pub flushed: usize,
    /// Records removed by retention.
    pub expired: usize,
}

/// Drains `counters`, enriches each record, and upserts the batch.
///
/// Returns the number of records written. A batch the store rejects is
/// logged and discarded.
pub fn flush(counters: &PendingCounters, geo: &dyn GeoLookup, store: &dyn ScanStore) -> usize {
    let mut batch = counters.drain();
    if batch.is_empty() {
        return 0;
    }
    for record in &mut batch {
        let found = geo.lookup(&record.source_ip);
        record.set_geo(found);
    }
    match store.upsert(&batch) {
        Ok(()) => {
            tracing::debug!(records = batch.len(), "flushed scan records");
            batch.len()
        }
        Err(e) => {
            tracing::warn!(records = batch.len(), error = %e, "failed to persist scan records, batch discarded");
            0
        }
    }
}

/// Deletes rows dated before `today - retention_days`.
pub fn cleanup(store: &dyn ScanStore, retention_days: u32, today: NaiveDate) -> usize {
    let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(retention_days))) else {
        return 0;
    };
    match store.clear_before(cutoff) {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(removed, %cutoff, "expired old scan records");
            }
            removed
        }
        Err(e) => {
            tracing::warn!(%cutoff, error = %e, "failed to expire scan records");
            0
        }
    }
}

/// Owns the scanner session and the pipeline state between ticks.
pub struct ScanJob {
    settings: Box<dyn SettingsSource>,
    backend: Box<dyn ScanBackend>,
    store: Arc<dyn ScanStore>,
    counters: PendingCounters,
    geo: GeoIpCache,
    session: Option<Box<dyn ScanSession>>,
    consumer: Option<JoinHandle<()>>,
    requested: Vec<String>,
    dropped: u64,
}

impl std::fmt::Debug for ScanJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanJob")
            .field("running", &self.session.is_some())
            .field("requested", &self.requested)
            .field("pending", &self.counters.len())
            .field("geo", &self.geo)
            .finish_non_exhaustive()
    }
}

impl ScanJob {
    /// Creates a job with no scanner running.
    pub fn new(
        settings: Box<dyn SettingsSource>,
        backend: Box<dyn ScanBackend>,
        store: Arc<dyn ScanStore>,
    ) -> Self {
        Self {
            settings,
            backend,
            store,
            counters: PendingCounters::new(),
            geo: GeoIpCache::new(),
            session: None,
            consumer: None,
            requested: Vec::new(),
            dropped: 0,
        }
    }

    /// Counters not yet flushed.
    #[must_use]
    pub const fn counters(&self) -> &PendingCounters {
        &self.counters
    }

    /// Returns `true` while a scanner session is held.
    #[must_use]
    pub const fn is_scanning(&self) -> bool {
        self.session.is_some()
    }

    /// Runs one tick dated by the current UTC day.
    pub fn tick(&mut self) -> TickReport {
        self.tick_on(Utc::now().date_naive())
    }

    /// Runs one tick, applying retention relative to `today`.
    pub fn tick_on(&mut self, today: NaiveDate) -> TickReport {
        let settings = match self.settings.load() {
            Ok(settings) if settings.enabled => settings,
            Ok(_) => {
                tracing::debug!("scan detection disabled");
                return self.stand_down();
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load scan settings, stopping scanner");
                return self.stand_down();
            }
        };

        let scanning = self.ensure_running(&settings);
        self.note_drops();
        let _ = self.geo.refresh(settings.geoip_path.as_deref());
        let flushed = flush(&self.counters, &self.geo, self.store.as_ref());
        let expired = cleanup(self.store.as_ref(), settings.retention_days, today);
        TickReport {
            enabled: true,
            scanning,
            flushed,
            expired,
        }
    }

    /// Stops the scanner, waits for the reader and the consumer to finish,
    /// then flushes everything they counted.
    ///
    /// Waiting is bounded; counts that arrive after the bound are lost.
    pub async fn shutdown(&mut self) -> usize {
        let pending = self.stop();
        if !pending.is_empty() {
            let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
                for task in pending {
                    if let Err(e) = task.await {
                        if e.is_panic() {
                            tracing::warn!(error = %e, "pipeline task panicked");
                        }
                    }
                }
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    timeout_secs = DRAIN_TIMEOUT.as_secs(),
                    "pipeline tasks still running, flushing what was counted"
                );
            }
        }
        flush(&self.counters, &self.geo, self.store.as_ref())
    }

    fn stand_down(&mut self) -> TickReport {
        // Tasks keep draining in the background; later ticks flush the rest.
        drop(self.stop());
        TickReport {
            flushed: flush(&self.counters, &self.geo, self.store.as_ref()),
            ..TickReport::default()
        }
    }

    /// Closes the session and returns the tasks still feeding the counters,
    /// consumer last.
    fn stop(&mut self) -> Vec<JoinHandle<()>> {
        let mut pending = Vec::new();
        if let Some(mut session) = self.session.take() {
            pending = session.take_tasks();
            match session.close() {
                Ok(()) => tracing::info!("scanner stopped"),
                Err(e) => tracing::warn!(error = %e, "scanner did not detach cleanly"),
            }
        }
        pending.extend(self.consumer.take());
        self.requested.clear();
        self.dropped = 0;
        pending
    }

    fn ensure_running(&mut self, settings: &ScanSettings) -> bool {
        if self.session.is_some() {
            if self.consumer.as_ref().is_some_and(JoinHandle::is_finished) {
                tracing::warn!("event stream closed unexpectedly, restarting scanner");
                drop(self.stop());
            } else if self.requested != settings.interfaces {
                tracing::info!(
                    from = ?self.requested,
                    to = ?settings.interfaces,
                    "interface selection changed, restarting scanner"
                );
                drop(self.stop());
            } else {
                return true;
            }
        }

        if !self.backend.supported() {
            tracing::debug!("scan detection unsupported on this host");
            return false;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(error = %e, "no tokio runtime, scanner not started");
                return false;
            }
        };

        match self.backend.start(&settings.interfaces) {
            Ok(mut session) => {
                if let Some(events) = session.take_events() {
                    self.consumer = Some(runtime.spawn(consume(events, self.counters.clone())));
                }
                tracing::info!(interfaces = ?session.interfaces(), "scanner started");
                self.requested.clone_from(&settings.interfaces);
                self.session = Some(session);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start scanner, retrying next tick");
                false
            }
        }
    }

    fn note_drops(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let stats = session.stats();
        if stats.dropped_full > self.dropped {
            tracing::warn!(
                new = stats.dropped_full - self.dropped,
                total = stats.dropped_full,
                "event channel full, probes dropped"
            );
        }
        self.dropped = stats.dropped_full;
    }
}
