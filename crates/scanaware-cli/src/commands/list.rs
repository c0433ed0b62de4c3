//! `scanaware list`: Page through recorded probes.

use clap::Args;
use scanaware_runtime::report::{ListQuery, list};
use scanaware_runtime::store::ScanStore;

use super::{Paths, RangeArgs};
use crate::output::{format_count, format_time, location};

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Date range to list.
    #[command(flatten)]
    pub range: RangeArgs,

    /// Only sources containing this text.
    #[arg(long)]
    pub ip: Option<String>,

    /// Only this destination port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Page number, starting at 1.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub page: u64,

    /// Rows per page.
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u64).range(1..=1000))]
    pub limit: u64,
}

impl ListArgs {
    fn query(&self) -> ListQuery {
        ListQuery {
            source_ip: self.ip.clone().filter(|ip| !ip.is_empty()),
            port: self.port,
            page: usize::try_from(self.page).unwrap_or(usize::MAX),
            limit: usize::try_from(self.limit).unwrap_or(usize::MAX),
        }
    }
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn execute(args: &ListArgs, paths: &Paths, json: bool) -> anyhow::Result<()> {
    let (start, end) = args.range.resolve_now()?;
    let records = paths.open_store()?.records(start, end)?;
    let page = list(&records, &args.query());

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    if page.items.is_empty() {
        println!("No scan records found.");
        return Ok(());
    }

    println!(
        "{:<40} {:<6} {:<5} {:>8} {:<20} {:<20} LOCATION",
        "SOURCE", "PORT", "PROTO", "COUNT", "FIRST SEEN", "LAST SEEN"
    );
    for r in &page.items {
        println!(
            "{:<40} {:<6} {:<5} {:>8} {:<20} {:<20} {}",
            r.source_ip,
            r.port,
            r.protocol,
            format_count(r.count),
            format_time(r.first_seen),
            format_time(r.last_seen),
            location(r)
        );
    }
    println!();
    println!(
        "Page {} ({} of {} rows)",
        args.page,
        page.items.len(),
        page.total
    );
    Ok(())
}
