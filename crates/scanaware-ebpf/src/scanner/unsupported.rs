//! Scanner stand-in for hosts or builds without eBPF support.

use scanaware_common::error::{Result, ScanError};
use tokio::runtime::Handle;

use super::Attachment;
use crate::reader::Forwarder;

#[cfg(target_os = "linux")]
const REASON: &str = "built without the `ebpf` feature";
#[cfg(not(target_os = "linux"))]
const REASON: &str = "eBPF scan detection requires Linux";

pub(super) const fn supported() -> bool {
    false
}

pub(super) fn ensure_available() -> Result<()> {
    Err(ScanError::Unsupported {
        reason: REASON.to_string(),
    })
}

pub(super) fn open(
    _interfaces: &[String],
    _forwarder: Forwarder,
    _runtime: &Handle,
) -> Result<Box<dyn Attachment>> {
    Err(ScanError::Unsupported {
        reason: REASON.to_string(),
    })
}
