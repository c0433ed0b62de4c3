//! Scan detection settings.
//!
//! The hosting panel owns where these live; the job only polls them once
//! per tick, so toggling `enabled` takes effect on the next tick.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RETENTION_DAYS;
use crate::error::{Result, ScanError};

/// Operator-facing settings for scan detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Whether the scanner should be attached.
    pub enabled: bool,
    /// Interfaces to attach to. Empty means autodetect one.
    pub interfaces: Vec<String>,
    /// Days of records to keep.
    pub retention_days: u32,
    /// MaxMind City database used for enrichment, if any.
    pub geoip_path: Option<PathBuf>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interfaces: Vec::new(),
            retention_days: DEFAULT_RETENTION_DAYS,
            geoip_path: None,
        }
    }
}

impl ScanSettings {
    /// Rejects settings the job cannot act on.
    ///
    /// # Errors
    ///
    /// Returns `ScanError::Config` for a zero retention or a blank
    /// interface name.
    pub fn validate(&self) -> Result<()> {
        if self.retention_days == 0 {
            return Err(ScanError::Config {
                message: "retention_days must be at least 1".into(),
            });
        }
        if self.interfaces.iter().any(|i| i.trim().is_empty()) {
            return Err(ScanError::Config {
                message: "interface names must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Loads settings from a JSON file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed,
    /// or validated.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Writes settings to a JSON file, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ScanError::io(path, e))
    }
}
