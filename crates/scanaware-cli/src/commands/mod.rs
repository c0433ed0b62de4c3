//! CLI command definitions and dispatch.

pub mod clear;
pub mod interfaces;
pub mod list;
pub mod report;
pub mod run;
pub mod settings;
pub mod supported;

use std::path::PathBuf;

use chrono::{Days, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use scanaware_runtime::store::JsonFileStore;

/// scanaware: passive port-scan detection.
#[derive(Parser, Debug)]
#[command(name = "scanaware", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the settings file.
    #[arg(long, global = true, env = "SCANAWARE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Path to the record store.
    #[arg(long, global = true, env = "SCANAWARE_STORE")]
    pub store: Option<PathBuf>,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the detector until interrupted.
    Run(run::RunArgs),
    /// Report whether this host can run the classifier.
    Supported,
    /// List candidate network interfaces.
    Interfaces,
    /// Summarize recorded probes over a date range.
    Report(report::ReportArgs),
    /// List recorded probes, newest first.
    List(list::ListArgs),
    /// Show or change scan detection settings.
    Settings(settings::SettingsArgs),
    /// Delete recorded probes.
    Clear(clear::ClearArgs),
}

/// Resolved file locations shared by the subcommands.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Settings JSON file.
    pub settings: PathBuf,
    /// Record store JSON file.
    pub store: PathBuf,
}

impl Paths {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            settings: cli
                .settings
                .clone()
                .unwrap_or_else(scanaware_common::constants::default_settings_file),
            store: cli
                .store
                .clone()
                .unwrap_or_else(scanaware_common::constants::default_store_file),
        }
    }

    /// Opens the record store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be created.
    pub fn open_store(&self) -> anyhow::Result<JsonFileStore> {
        Ok(JsonFileStore::open(&self.store)?)
    }
}

/// Date range selection shared by `report` and `list`.
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// First day to include (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Days to cover when `--from` is not given.
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..))]
    pub days: u32,
}

impl RangeArgs {
    /// Returns the inclusive `(start, end)` range.
    ///
    /// # Errors
    ///
    /// Returns an error if `start` falls after `end`.
    pub fn resolve(&self, today: NaiveDate) -> anyhow::Result<(NaiveDate, NaiveDate)> {
        let end = self.to.unwrap_or(today);
        let start = match self.from {
            Some(from) => from,
            None => end
                .checked_sub_days(Days::new(u64::from(self.days.saturating_sub(1))))
                .unwrap_or(NaiveDate::MIN),
        };
        if start > end {
            anyhow::bail!("--from {start} is after --to {end}");
        }
        Ok((start, end))
    }

    /// Resolves against the current UTC day.
    ///
    /// # Errors
    ///
    /// Returns an error if `start` falls after `end`.
    pub fn resolve_now(&self) -> anyhow::Result<(NaiveDate, NaiveDate)> {
        self.resolve(Utc::now().date_naive())
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::from_cli(&cli);
    let json = cli.json;
    match cli.command {
        Command::Run(args) => run::execute(&args, &paths),
        Command::Supported => supported::execute(json),
        Command::Interfaces => interfaces::execute(json),
        Command::Report(args) => report::execute(&args, &paths, json),
        Command::List(args) => list::execute(&args, &paths, json),
        Command::Settings(args) => settings::execute(args, &paths, json),
        Command::Clear(args) => clear::execute(&args, &paths),
    }
}
