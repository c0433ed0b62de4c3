//! Sources of [`ScanSettings`] polled on every tick.

use std::path::{Path, PathBuf};

use scanaware_common::config::ScanSettings;
use scanaware_common::error::Result;

/// Supplies the current settings.
pub trait SettingsSource: Send + Sync {
    /// Returns the settings in force right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be read or are invalid.
    fn load(&self) -> Result<ScanSettings>;
}

impl SettingsSource for ScanSettings {
    fn load(&self) -> Result<ScanSettings> {
        self.validate()?;
        Ok(self.clone())
    }
}

/// Settings read from a JSON file. A missing file means defaults.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    /// Reads settings from `path` on every load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for FileSettings {
    fn load(&self) -> Result<ScanSettings> {
        ScanSettings::load(&self.path)
    }
}
