//! `scanaware clear`: Delete recorded probes.

use chrono::NaiveDate;
use clap::Args;
use scanaware_runtime::store::ScanStore;

use super::Paths;

/// Arguments for the `clear` command.
#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Only delete rows dated before this day (YYYY-MM-DD).
    #[arg(long, conflicts_with = "all")]
    pub before: Option<NaiveDate>,

    /// Delete every row.
    #[arg(long, required_unless_present = "before")]
    pub all: bool,
}

/// Executes the `clear` command.
///
/// # Errors
///
/// Returns an error if the store cannot be rewritten.
pub fn execute(args: &ClearArgs, paths: &Paths) -> anyhow::Result<()> {
    let store = paths.open_store()?;
    let removed = match args.before {
        Some(cutoff) => store.clear_before(cutoff)?,
        None => store.clear()?,
    };
    tracing::info!(removed, store = %paths.store.display(), "scan records cleared");
    println!("Removed {removed} scan records.");
    Ok(())
}
