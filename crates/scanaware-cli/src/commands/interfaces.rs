//! `scanaware interfaces`: List interfaces the classifier can attach to.

use scanaware_ebpf::interfaces::{list_interfaces, pick_default};

/// Executes the `interfaces` command.
///
/// The interface autodetection would pick is marked with `*`.
///
/// # Errors
///
/// Returns an error if interfaces cannot be enumerated.
pub fn execute(json: bool) -> anyhow::Result<()> {
    let interfaces = list_interfaces()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&interfaces)?);
        return Ok(());
    }
    if interfaces.is_empty() {
        println!("No interfaces found.");
        return Ok(());
    }

    let default = pick_default(&interfaces);
    println!("  {:<16} {:<6} ADDRESSES", "NAME", "STATUS");
    for iface in &interfaces {
        let mark = if default.as_deref() == Some(iface.name.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{mark} {:<16} {:<6} {}",
            iface.name,
            iface.status,
            iface.ips.join(", ")
        );
    }
    Ok(())
}
