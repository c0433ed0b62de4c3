//! Attach-all-or-nothing over a set of interfaces.

use scanaware_common::error::{Result, ScanError};
use scanaware_common::types::{InterfaceInfo, InterfaceStatus};
use tracing::{info, warn};

/// Per-interface attach and detach of the classifier.
pub(crate) trait Hook {
    /// Handle needed to undo one attach.
    type Link;

    /// Attaches to `interface`.
    fn attach(&mut self, interface: &str) -> Result<Self::Link>;

    /// Undoes one attach.
    fn detach(&mut self, interface: &str, link: Self::Link) -> Result<()>;
}

/// Checks that `found`, the lookup result for `interface`, can be attached to.
pub(crate) fn attachable(interface: &str, found: Option<&InterfaceInfo>) -> Result<()> {
    let reason = match found {
        None => "no such interface",
        Some(info) if info.status == InterfaceStatus::Down => "interface is down",
        Some(_) => return Ok(()),
    };
    Err(ScanError::AttachFailed {
        interface: interface.to_string(),
        reason: reason.to_string(),
    })
}

/// Attaches to every interface in order. On the first failure everything
/// attached so far is detached again and that failure is returned.
pub(crate) fn attach_all<H: Hook>(
    hook: &mut H,
    interfaces: &[String],
) -> Result<Vec<(String, H::Link)>> {
    let mut links = Vec::with_capacity(interfaces.len());
    for interface in interfaces {
        match hook.attach(interface) {
            Ok(link) => {
                info!(interface = %interface, "scan detector attached");
                links.push((interface.clone(), link));
            }
            Err(e) => {
                if let Err(rollback) = detach_all(hook, links) {
                    warn!(error = %rollback, "rollback after failed attach was incomplete");
                }
                return Err(e);
            }
        }
    }
    Ok(links)
}

/// Detaches every link, continuing past failures. Returns the first one.
pub(crate) fn detach_all<H: Hook>(hook: &mut H, links: Vec<(String, H::Link)>) -> Result<()> {
    let mut first_error = None;
    for (interface, link) in links {
        match hook.detach(&interface, link) {
            Ok(()) => info!(interface = %interface, "scan detector detached"),
            Err(e) => {
                warn!(interface = %interface, error = %e, "failed to detach scan detector");
                let _ = first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
