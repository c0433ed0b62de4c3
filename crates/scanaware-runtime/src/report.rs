//! Read-side aggregates over stored scan records.
//!
//! All functions take the rows of one date range, as returned by
//! [`crate::store::ScanStore::records`].

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use scanaware_common::types::{
    Protocol, ScanDayTrend, ScanPortRank, ScanRecord, ScanSourceRank, ScanSummary,
};
use serde::Serialize;

fn len_u64<T>(set: &HashSet<T>) -> u64 {
    u64::try_from(set.len()).unwrap_or(u64::MAX)
}

/// Total probes, distinct sources, and distinct (port, protocol) pairs.
#[must_use]
pub fn summary(records: &[ScanRecord]) -> ScanSummary {
    let ips: HashSet<&str> = records.iter().map(|r| r.source_ip.as_str()).collect();
    let ports: HashSet<(u16, Protocol)> = records.iter().map(|r| (r.port, r.protocol)).collect();
    ScanSummary {
        total_count: records.iter().map(|r| r.count).sum(),
        unique_ips: len_u64(&ips),
        unique_ports: len_u64(&ports),
    }
}

/// Per-day totals in ascending date order.
#[must_use]
pub fn trend(records: &[ScanRecord]) -> Vec<ScanDayTrend> {
    let mut days: BTreeMap<NaiveDate, (u64, HashSet<&str>)> = BTreeMap::new();
    for record in records {
        let (total, ips) = days.entry(record.date).or_default();
        *total += record.count;
        let _ = ips.insert(record.source_ip.as_str());
    }
    days.into_iter()
        .map(|(date, (total_count, ips))| ScanDayTrend {
            date,
            total_count,
            unique_ips: len_u64(&ips),
        })
        .collect()
}

/// Sources with the most probes, highest first, at most `limit`.
#[must_use]
pub fn top_sources(records: &[ScanRecord], limit: usize) -> Vec<ScanSourceRank> {
    let mut by_source: HashMap<&str, (ScanSourceRank, HashSet<(u16, Protocol)>)> = HashMap::new();
    for record in records {
        let (rank, ports) = by_source.entry(&record.source_ip).or_insert_with(|| {
            (
                ScanSourceRank {
                    source_ip: record.source_ip.clone(),
                    total_count: 0,
                    port_count: 0,
                    last_seen: record.last_seen,
                },
                HashSet::new(),
            )
        });
        rank.total_count += record.count;
        rank.last_seen = rank.last_seen.max(record.last_seen);
        let _ = ports.insert((record.port, record.protocol));
    }
    let mut ranks: Vec<ScanSourceRank> = by_source
        .into_values()
        .map(|(mut rank, ports)| {
            rank.port_count = len_u64(&ports);
            rank
        })
        .collect();
    ranks.sort_by(|a, b| {
        b.total_count
            .cmp(&a.total_count)
            .then_with(|| a.source_ip.cmp(&b.source_ip))
    });
    ranks.truncate(limit);
    ranks
}

/// Ports with the most probes, highest first, at most `limit`.
#[must_use]
pub fn top_ports(records: &[ScanRecord], limit: usize) -> Vec<ScanPortRank> {
    let mut by_port: HashMap<(u16, Protocol), (u64, HashSet<&str>)> = HashMap::new();
    for record in records {
        let (total, ips) = by_port.entry((record.port, record.protocol)).or_default();
        *total += record.count;
        let _ = ips.insert(record.source_ip.as_str());
    }
    let mut ranks: Vec<ScanPortRank> = by_port
        .into_iter()
        .map(|((port, protocol), (total_count, ips))| ScanPortRank {
            port,
            protocol,
            total_count,
            ip_count: len_u64(&ips),
        })
        .collect();
    ranks.sort_by(|a, b| {
        b.total_count
            .cmp(&a.total_count)
            .then_with(|| (a.port, a.protocol).cmp(&(b.port, b.protocol)))
    });
    ranks.truncate(limit);
    ranks
}

/// Filter and page for [`list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Keep rows whose source contains this substring.
    pub source_ip: Option<String>,
    /// Keep rows for this port only.
    pub port: Option<u16>,
    /// 1-based page number.
    pub page: usize,
    /// Rows per page.
    pub limit: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            source_ip: None,
            port: None,
            page: 1,
            limit: 20,
        }
    }
}

/// One page of matching rows plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Rows on this page.
    pub items: Vec<ScanRecord>,
    /// Rows matching the filter across all pages.
    pub total: usize,
}

/// Filters rows, orders them newest `last_seen` first, and returns one page.
#[must_use]
pub fn list(records: &[ScanRecord], query: &ListQuery) -> Page {
    let mut matching: Vec<&ScanRecord> = records
        .iter()
        .filter(|r| {
            query
                .source_ip
                .as_deref()
                .is_none_or(|needle| r.source_ip.contains(needle))
        })
        .filter(|r| query.port.is_none_or(|port| r.port == port))
        .collect();
    matching.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    let total = matching.len();
    let skip = query.page.saturating_sub(1).saturating_mul(query.limit);
    Page {
        items: matching
            .into_iter()
            .skip(skip)
            .take(query.limit)
            .cloned()
            .collect(),
        total,
    }
}
