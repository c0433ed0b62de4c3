//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Default base directory for scanaware data on Linux with root access.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/scanaware";

/// Returns the data directory, preferring `/var/lib/scanaware` when it is
/// writable and falling back to `$HOME/.scanaware`.
fn resolve_data_dir() -> PathBuf {
    let system = PathBuf::from(SYSTEM_DATA_DIR);
    if std::fs::create_dir_all(&system).is_ok() {
        return system;
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        let user_dir = PathBuf::from(home).join(".scanaware");
        if std::fs::create_dir_all(&user_dir).is_ok() {
            return user_dir;
        }
    }
    system
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Returns the default settings file path.
pub fn default_settings_file() -> PathBuf {
    data_dir().join("settings.json")
}

/// Returns the default record store path.
pub fn default_store_file() -> PathBuf {
    data_dir().join("scan_records.json")
}

/// Days of scan records kept when settings do not say otherwise.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Interval between whitelist syncs against the host socket table.
pub const WHITELIST_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval between aggregation ticks when driven by the CLI.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Capacity of the decoded event channel between reader and consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Application name used in CLI output.
pub const APP_NAME: &str = "scanaware";
