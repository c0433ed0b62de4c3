//! Probe aggregation for scanaware.
//!
//! The [`job::ScanJob`] tick ties the pieces together: it keeps the scanner
//! running while the feature is enabled, folds its events into
//! [`counters::PendingCounters`], enriches drained records through
//! [`geoip`], upserts them into a [`store::ScanStore`], and ages out rows
//! past the retention window. [`report`] answers read-side queries over
//! stored records.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod counters;
pub mod geoip;
pub mod job;
pub mod report;
pub mod settings;
pub mod store;
