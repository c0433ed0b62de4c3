//! `scanaware supported`: Report platform capability.

/// Executes the `supported` command.
///
/// # Errors
///
/// Returns an error if JSON output cannot be written.
pub fn execute(json: bool) -> anyhow::Result<()> {
    let supported = scanaware_ebpf::supported();
    if json {
        println!("{}", serde_json::json!({ "supported": supported }));
    } else if supported {
        println!("Scan detection is supported on this host.");
    } else {
        println!("Scan detection is not supported on this host.");
    }
    Ok(())
}
