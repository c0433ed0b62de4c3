//! `scanaware settings`: Show or change scan detection settings.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use scanaware_common::config::ScanSettings;

use super::Paths;

/// Arguments for the `settings` command.
#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// Settings action; `show` when omitted.
    #[command(subcommand)]
    pub action: Option<SettingsAction>,
}

/// Settings actions.
#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the current settings.
    Show,
    /// Change one or more settings.
    Set(SetArgs),
}

/// Changes applied by `settings set`.
#[derive(Args, Debug, Default)]
pub struct SetArgs {
    /// Turn scan detection on.
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Turn scan detection off.
    #[arg(long)]
    pub disable: bool,

    /// Interface to attach to (repeatable). Replaces the current list.
    #[arg(long = "interface", conflicts_with = "autodetect")]
    pub interfaces: Vec<String>,

    /// Clear the interface list so one is autodetected.
    #[arg(long)]
    pub autodetect: bool,

    /// Days of records to keep.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retention_days: Option<u32>,

    /// MaxMind City database used for enrichment.
    #[arg(long, conflicts_with = "no_geoip")]
    pub geoip_path: Option<PathBuf>,

    /// Stop enriching records with GeoIP data.
    #[arg(long)]
    pub no_geoip: bool,
}

impl SetArgs {
    fn apply(&self, settings: &mut ScanSettings) {
        if self.enable {
            settings.enabled = true;
        }
        if self.disable {
            settings.enabled = false;
        }
        if self.autodetect {
            settings.interfaces.clear();
        } else if !self.interfaces.is_empty() {
            settings.interfaces.clone_from(&self.interfaces);
        }
        if let Some(days) = self.retention_days {
            settings.retention_days = days;
        }
        if self.no_geoip {
            settings.geoip_path = None;
        } else if let Some(path) = &self.geoip_path {
            settings.geoip_path = Some(path.clone());
        }
    }
}

fn print(settings: &ScanSettings, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(settings)?);
        return Ok(());
    }
    let interfaces = if settings.interfaces.is_empty() {
        "(autodetect)".to_string()
    } else {
        settings.interfaces.join(", ")
    };
    let geoip = settings
        .geoip_path
        .as_ref()
        .map_or_else(|| "(none)".to_string(), |p| p.display().to_string());
    println!("enabled:        {}", settings.enabled);
    println!("interfaces:     {interfaces}");
    println!("retention_days: {}", settings.retention_days);
    println!("geoip_path:     {geoip}");
    Ok(())
}

/// Executes the `settings` command.
///
/// Changes take effect on the running job's next tick.
///
/// # Errors
///
/// Returns an error if the settings file cannot be read, is invalid, or
/// cannot be written.
pub fn execute(args: SettingsArgs, paths: &Paths, json: bool) -> anyhow::Result<()> {
    let mut settings = ScanSettings::load(&paths.settings)?;
    match args.action.unwrap_or(SettingsAction::Show) {
        SettingsAction::Show => print(&settings, json),
        SettingsAction::Set(set) => {
            set.apply(&mut settings);
            settings.validate()?;
            settings.save(&paths.settings)?;
            tracing::info!(path = %paths.settings.display(), "settings updated");
            print(&settings, json)
        }
    }
}
