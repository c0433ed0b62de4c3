//! `scanaware report`: Summarize recorded probes.

use clap::Args;
use scanaware_runtime::report::{summary, top_ports, top_sources, trend};
use scanaware_runtime::store::ScanStore;

use super::{Paths, RangeArgs};
use crate::output::{format_count, format_time};

/// Arguments for the `report` command.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Date range to summarize.
    #[command(flatten)]
    pub range: RangeArgs,

    /// Entries in each top-N table.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

/// Executes the `report` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn execute(args: &ReportArgs, paths: &Paths, json: bool) -> anyhow::Result<()> {
    let (start, end) = args.range.resolve_now()?;
    let records = paths.open_store()?.records(start, end)?;

    let totals = summary(&records);
    let days = trend(&records);
    let sources = top_sources(&records, args.top);
    let ports = top_ports(&records, args.top);

    if json {
        let report = serde_json::json!({
            "from": start,
            "to": end,
            "summary": totals,
            "trend": days,
            "top_sources": sources,
            "top_ports": ports,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Scan report {start} .. {end}");
    println!(
        "  {} probes from {} sources on {} ports",
        format_count(totals.total_count),
        format_count(totals.unique_ips),
        format_count(totals.unique_ports)
    );
    if records.is_empty() {
        return Ok(());
    }

    println!();
    println!("{:<12} {:>10} {:>8}", "DATE", "PROBES", "SOURCES");
    for day in &days {
        println!(
            "{:<12} {:>10} {:>8}",
            day.date,
            format_count(day.total_count),
            format_count(day.unique_ips)
        );
    }

    println!();
    println!("{:<40} {:>10} {:>6} {:<20}", "SOURCE", "PROBES", "PORTS", "LAST SEEN");
    for source in &sources {
        println!(
            "{:<40} {:>10} {:>6} {:<20}",
            source.source_ip,
            format_count(source.total_count),
            source.port_count,
            format_time(source.last_seen)
        );
    }

    println!();
    println!("{:<10} {:<6} {:>10} {:>8}", "PORT", "PROTO", "PROBES", "SOURCES");
    for port in &ports {
        println!(
            "{:<10} {:<6} {:>10} {:>8}",
            port.port,
            port.protocol,
            format_count(port.total_count),
            format_count(port.ip_count)
        );
    }
    Ok(())
}
