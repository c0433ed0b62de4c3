//! GeoIP enrichment over MaxMind City databases.
//!
//! Region is the first subdivision and district the second; all names are
//! taken in English. Any failure yields an empty [`GeoResult`].

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use maxminddb::{Reader, geoip2};
use scanaware_common::error::{Result, ScanError};
use scanaware_common::types::GeoResult;

/// Resolves a source address to geographic attributes.
pub trait GeoLookup {
    /// Returns the attributes for `ip`, empty on a miss or failure.
    fn lookup(&self, ip: &str) -> GeoResult;
}

/// Lookup that never knows anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeo;

impl GeoLookup for NoGeo {
    fn lookup(&self, _ip: &str) -> GeoResult {
        GeoResult::default()
    }
}

fn english(names: Option<&BTreeMap<&str, &str>>) -> String {
    names
        .and_then(|n| n.get("en"))
        .map(|name| (*name).to_string())
        .unwrap_or_default()
}

/// An open MaxMind database.
pub struct GeoIp {
    reader: Reader<Vec<u8>>,
}

impl std::fmt::Debug for GeoIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoIp")
            .field("database_type", &self.reader.metadata.database_type)
            .finish()
    }
}

impl GeoIp {
    /// Opens the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::LookupFailed`] if the file is missing or is not
    /// a valid MaxMind database.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = Reader::open_readfile(path).map_err(|e| ScanError::LookupFailed {
            reason: format!("{}: {e}", path.display()),
        })?;
        Ok(Self { reader })
    }

    /// Replaces the open database with the one at `path`. On failure the
    /// current database stays in use.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::LookupFailed`] if the new file cannot be opened.
    pub fn reload(&mut self, path: &Path) -> Result<()> {
        *self = Self::open(path)?;
        Ok(())
    }

    fn find(&self, ip: IpAddr) -> Result<GeoResult> {
        let city: geoip2::City<'_> = self
            .reader
            .lookup(ip)
            .map_err(|e| ScanError::LookupFailed {
                reason: e.to_string(),
            })?;
        let subdivision = |i: usize| {
            english(
                city.subdivisions
                    .as_ref()
                    .and_then(|s| s.get(i))
                    .and_then(|s| s.names.as_ref()),
            )
        };
        Ok(GeoResult {
            country: english(city.country.as_ref().and_then(|c| c.names.as_ref())),
            region: subdivision(0),
            city: english(city.city.as_ref().and_then(|c| c.names.as_ref())),
            district: subdivision(1),
        })
    }
}

impl GeoLookup for GeoIp {
    fn lookup(&self, ip: &str) -> GeoResult {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            tracing::debug!(ip, "not an IP address, skipping geoip lookup");
            return GeoResult::default();
        };
        self.find(addr).unwrap_or_else(|e| {
            tracing::debug!(ip, error = %e, "geoip lookup failed");
            GeoResult::default()
        })
    }
}

/// What [`GeoIpCache::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// No database configured; any open one was released.
    Disabled,
    /// Configured file is inaccessible; any open one was released.
    Missing,
    /// Same file, same modification time.
    Unchanged,
    /// Same path, newer file, reopened in place.
    Reloaded,
    /// A new path was opened.
    Loaded,
    /// Opening failed; lookups degrade to empty results.
    Failed,
}

/// Holds the database named by settings and reopens it when the path or
/// the file's modification time changes.
#[derive(Debug, Default)]
pub struct GeoIpCache {
    current: Option<GeoIp>,
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
}

impl GeoIpCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when a database is open.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    fn release(&mut self) {
        self.current = None;
        self.modified = None;
    }

    /// Brings the cache in line with the configured `path`.
    pub fn refresh(&mut self, path: Option<&Path>) -> Refresh {
        let Some(path) = path else {
            self.release();
            self.path = None;
            return Refresh::Disabled;
        };

        let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                if self.current.is_some() {
                    tracing::warn!(path = %path.display(), error = %e, "geoip database inaccessible, releasing");
                }
                self.release();
                self.path = Some(path.to_path_buf());
                return Refresh::Missing;
            }
        };

        let same_path = self.path.as_deref() == Some(path);
        if let (true, Some(current)) = (same_path, self.current.as_mut()) {
            if self.modified == Some(modified) {
                return Refresh::Unchanged;
            }
            return match current.reload(path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "geoip database reloaded");
                    self.modified = Some(modified);
                    Refresh::Reloaded
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to reload geoip database");
                    Refresh::Failed
                }
            };
        }

        self.path = Some(path.to_path_buf());
        match GeoIp::open(path) {
            Ok(geo) => {
                tracing::info!(path = %path.display(), "geoip database loaded");
                self.current = Some(geo);
                self.modified = Some(modified);
                Refresh::Loaded
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load geoip database");
                self.release();
                Refresh::Failed
            }
        }
    }
}

impl GeoLookup for GeoIpCache {
    fn lookup(&self, ip: &str) -> GeoResult {
        self.current
            .as_ref()
            .map_or_else(GeoResult::default, |geo| geo.lookup(ip))
    }
}
