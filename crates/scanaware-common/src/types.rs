//! Domain types shared by the scanner, the aggregation job, and the CLI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Transport protocol of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// A pure-SYN TCP segment.
    Tcp,
    /// A UDP datagram.
    Udp,
}

impl Protocol {
    /// Returns the lowercase protocol name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(ScanError::Config {
                message: format!("unknown protocol: {other}"),
            }),
        }
    }
}

/// A decoded probe event, produced by the ring-buffer reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Textual source address (dotted quad or RFC 5952 IPv6).
    pub source_ip: String,
    /// Destination port on this host.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// When user space decoded the record.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Calendar day (UTC) this event is bucketed under.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Geographic attributes for a source address. Empty fields mean unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoResult {
    /// Country name.
    pub country: String,
    /// First-level subdivision (state, province).
    pub region: String,
    /// City name.
    pub city: String,
    /// Second-level subdivision, when the database carries one.
    pub district: String,
}

impl GeoResult {
    /// Returns `true` when no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.country.is_empty()
            && self.region.is_empty()
            && self.city.is_empty()
            && self.district.is_empty()
    }
}

/// Dedup key of a [`ScanRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScanKey {
    /// Source address.
    pub source_ip: String,
    /// Destination port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// UTC calendar day.
    pub date: NaiveDate,
}

impl From<&Event> for ScanKey {
    fn from(event: &Event) -> Self {
        Self {
            source_ip: event.source_ip.clone(),
            port: event.port,
            protocol: event.protocol,
            date: event.date(),
        }
    }
}

/// Aggregated, persisted count of probes for one key on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Source address.
    pub source_ip: String,
    /// Destination port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// UTC calendar day.
    pub date: NaiveDate,
    /// Number of probes seen.
    pub count: u64,
    /// Earliest probe.
    pub first_seen: DateTime<Utc>,
    /// Latest probe.
    pub last_seen: DateTime<Utc>,
    /// Country of the source.
    #[serde(default)]
    pub country: String,
    /// Region of the source.
    #[serde(default)]
    pub region: String,
    /// City of the source.
    #[serde(default)]
    pub city: String,
    /// District of the source.
    #[serde(default)]
    pub district: String,
}

impl ScanRecord {
    /// Starts a record with a count of one from its first event.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        Self {
            source_ip: event.source_ip.clone(),
            port: event.port,
            protocol: event.protocol,
            date: event.date(),
            count: 1,
            first_seen: event.timestamp,
            last_seen: event.timestamp,
            country: String::new(),
            region: String::new(),
            city: String::new(),
            district: String::new(),
        }
    }

    /// Returns the dedup key of this record.
    #[must_use]
    pub fn key(&self) -> ScanKey {
        ScanKey {
            source_ip: self.source_ip.clone(),
            port: self.port,
            protocol: self.protocol,
            date: self.date,
        }
    }

    /// Counts another event with the same key.
    pub fn observe(&mut self, at: DateTime<Utc>) {
        self.count += 1;
        self.first_seen = self.first_seen.min(at);
        self.last_seen = self.last_seen.max(at);
    }

    /// Folds a record with the same key into this one.
    ///
    /// Counts add up, the seen window widens, and geo fields are only
    /// filled where this record has none.
    pub fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
        if self.geo().is_empty() {
            self.set_geo(other.geo());
        }
    }

    /// Returns the geo fields as a [`GeoResult`].
    #[must_use]
    pub fn geo(&self) -> GeoResult {
        GeoResult {
            country: self.country.clone(),
            region: self.region.clone(),
            city: self.city.clone(),
            district: self.district.clone(),
        }
    }

    /// Overwrites the geo fields.
    pub fn set_geo(&mut self, geo: GeoResult) {
        self.country = geo.country;
        self.region = geo.region;
        self.city = geo.city;
        self.district = geo.district;
    }
}

/// Administrative state of a network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceStatus {
    /// Interface is administratively up.
    Up,
    /// Interface is down.
    Down,
}

impl fmt::Display for InterfaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// A non-loopback network interface the classifier can attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Interface name.
    pub name: String,
    /// Configured IP addresses.
    pub ips: Vec<String>,
    /// Administrative status.
    pub status: InterfaceStatus,
}

/// Totals over a date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Sum of all probe counts.
    pub total_count: u64,
    /// Distinct source addresses.
    pub unique_ips: u64,
    /// Distinct (port, protocol) pairs.
    pub unique_ports: u64,
}

/// Per-day totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDayTrend {
    /// Calendar day.
    pub date: NaiveDate,
    /// Sum of probe counts on that day.
    pub total_count: u64,
    /// Distinct sources on that day.
    pub unique_ips: u64,
}

/// A source address ranked by probe volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSourceRank {
    /// Source address.
    pub source_ip: String,
    /// Sum of probe counts.
    pub total_count: u64,
    /// Distinct (port, protocol) pairs probed.
    pub port_count: u64,
    /// Latest probe from this source.
    pub last_seen: DateTime<Utc>,
}

/// A local port ranked by probe volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPortRank {
    /// Destination port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Sum of probe counts.
    pub total_count: u64,
    /// Distinct sources that probed it.
    pub ip_count: u64,
}
