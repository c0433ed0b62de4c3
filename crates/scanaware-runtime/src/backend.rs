//! Scanner abstraction the job drives.
//!
//! [`EbpfBackend`] wraps [`scanaware_ebpf::Scanner`]; tests substitute their
//! own implementations to exercise the job without a kernel.

use scanaware_common::error::Result;
use scanaware_common::types::Event;
use scanaware_ebpf::{ReaderStats, Scanner};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running scanner session.
pub trait ScanSession: Send {
    /// Hands out the event receiver. Returns `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::Receiver<Event>>;

    /// Reader counters, including records dropped on a full channel.
    fn stats(&self) -> ReaderStats;

    /// Interfaces the session is attached to.
    fn interfaces(&self) -> Vec<String>;

    /// Hands out background task handles to wait on after [`Self::close`].
    fn take_tasks(&mut self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }

    /// Detaches and releases kernel resources. Calling twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if detaching fails.
    fn close(&mut self) -> Result<()>;
}

/// Factory for scanner sessions.
pub trait ScanBackend: Send + Sync {
    /// Returns whether this backend can start on the current host.
    fn supported(&self) -> bool;

    /// Starts a session on `interfaces`; empty means autodetect.
    ///
    /// # Errors
    ///
    /// Returns an error if the scanner is unsupported or cannot attach.
    fn start(&self, interfaces: &[String]) -> Result<Box<dyn ScanSession>>;
}

/// Backend over the TC ingress classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct EbpfBackend;

impl ScanSession for Scanner {
    fn take_events(&mut self) -> Option<mpsc::Receiver<Event>> {
        Self::take_events(self)
    }

    fn stats(&self) -> ReaderStats {
        Self::stats(self)
    }

    fn interfaces(&self) -> Vec<String> {
        Self::interfaces(self).to_vec()
    }

    fn take_tasks(&mut self) -> Vec<JoinHandle<()>> {
        Self::take_tasks(self)
    }

    fn close(&mut self) -> Result<()> {
        Self::close(self)
    }
}

impl ScanBackend for EbpfBackend {
    fn supported(&self) -> bool {
        scanaware_ebpf::supported()
    }

    fn start(&self, interfaces: &[String]) -> Result<Box<dyn ScanSession>> {
        Ok(Box::new(Scanner::start(interfaces)?))
    }
}

/// Returns the backend for this build.
#[must_use]
pub fn detect_backend() -> Box<dyn ScanBackend> {
    Box::new(EbpfBackend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detected_backend_agrees_with_scanner() {
        assert_eq!(detect_backend().supported(), scanaware_ebpf::supported());
    }

    #[cfg(not(all(target_os = "linux", feature = "ebpf")))]
    #[test]
    fn stub_backend_refuses_to_start() {
        let err = EbpfBackend.start(&[]).err().expect("start should fail");
        assert!(matches!(
            err,
            scanaware_common::error::ScanError::Unsupported { .. }
        ));
    }
}
