//! Formatted output helpers for CLI commands.

use chrono::{DateTime, Utc};
use scanaware_common::types::ScanRecord;

/// Formats a count with thousands separators (e.g., "12,345").
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a timestamp to the second, in UTC.
#[must_use]
pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Joins the non-empty geo fields of a record, or `-` when none are known.
#[must_use]
pub fn location(record: &ScanRecord) -> String {
    let parts: Vec<&str> = [
        record.district.as_str(),
        record.city.as_str(),
        record.region.as_str(),
        record.country.as_str(),
    ]
    .into_iter()
    .filter(|p| !p.is_empty())
    .collect();
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(", ")
    }
}
