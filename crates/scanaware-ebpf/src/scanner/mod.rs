//! Scanner controller.
//!
//! A [`Scanner`] owns one loaded classifier attached to TC ingress on one or
//! more interfaces, plus the reader and whitelist-sync tasks feeding it. The
//! platform half is selected at build time: the Linux implementation needs
//! the `ebpf` feature, every other build gets a stub that reports the
//! capability as unsupported.

#[cfg_attr(not(all(target_os = "linux", feature = "ebpf")), allow(dead_code))]
mod attach;
#[cfg(all(target_os = "linux", feature = "ebpf"))]
mod linux;
#[cfg(not(all(target_os = "linux", feature = "ebpf")))]
mod unsupported;

#[cfg(all(target_os = "linux", feature = "ebpf"))]
use linux as platform;
#[cfg(not(all(target_os = "linux", feature = "ebpf")))]
use unsupported as platform;

use std::fmt;
use std::sync::Arc;

use scanaware_common::constants::EVENT_CHANNEL_CAPACITY;
use scanaware_common::error::{Result, ScanError};
use scanaware_common::types::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::interfaces;
use crate::reader::{Forwarder, ReaderCounters, ReaderStats};

/// Lifecycle of a [`Scanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    /// Nothing loaded.
    Unattached,
    /// Loading the classifier and attaching to interfaces.
    Attaching,
    /// Attached; tasks running.
    Running,
    /// Detaching and stopping tasks.
    Closing,
    /// Everything released.
    Closed,
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unattached => write!(f, "unattached"),
            Self::Attaching => write!(f, "attaching"),
            Self::Running => write!(f, "running"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Kernel resources held by a running scanner.
pub(crate) trait Attachment: Send {
    /// Signals the tasks to stop and detaches from every interface. Tasks
    /// whose handles are still held are aborted.
    fn shutdown(&mut self) -> Result<()>;

    /// Hands out the background task handles.
    fn take_tasks(&mut self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }
}

/// Returns `true` if this host can load and verify the classifier.
///
/// Always `false` on non-Linux hosts and in builds without the `ebpf`
/// feature. Safe to call repeatedly; nothing stays loaded.
#[must_use]
pub fn supported() -> bool {
    platform::supported()
}

/// Applies the default-interface rule to a requested list.
///
/// An empty request resolves to the autodetected interface. Duplicates are
/// removed, keeping the first occurrence.
fn resolve_interfaces(
    requested: &[String],
    autodetect: impl FnOnce() -> Option<String>,
) -> Result<Vec<String>> {
    if requested.is_empty() {
        return autodetect()
            .map(|name| vec![name])
            .ok_or(ScanError::NoInterfaceFound);
    }
    let mut names: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    Ok(names)
}

/// A loaded, attached classifier and its user-space tasks.
pub struct Scanner {
    state: ScannerState,
    interfaces: Vec<String>,
    events: Option<mpsc::Receiver<Event>>,
    counters: Arc<ReaderCounters>,
    attachment: Option<Box<dyn Attachment>>,
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("state", &self.state)
            .field("interfaces", &self.interfaces)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Scanner {
    /// Loads the classifier and attaches it to TC ingress on `interfaces`.
    ///
    /// An empty list autodetects one interface. Every named interface must
    /// exist and be up. On the first attach failure all interfaces attached
    /// so far are detached again. The reader and whitelist-sync tasks are
    /// spawned on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ScanError::Unsupported`] if the platform cannot run the classifier
    ///   or no Tokio runtime is active.
    /// - [`ScanError::NoInterfaceFound`] if autodetection finds nothing.
    /// - [`ScanError::CompileFailed`] if the object fails to load or verify.
    /// - [`ScanError::AttachFailed`] naming the interface that failed.
    pub fn start(interfaces: &[String]) -> Result<Self> {
        platform::ensure_available()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| ScanError::Unsupported {
                reason: format!("no tokio runtime: {e}"),
            })?;
        let names = resolve_interfaces(interfaces, interfaces::default_interface)?;

        tracing::info!(interfaces = ?names, state = %ScannerState::Attaching, "starting scan detector");
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let counters = Arc::new(ReaderCounters::default());
        let forwarder = Forwarder::new(tx, Arc::clone(&counters));

        let attachment = platform::open(&names, forwarder, &runtime).inspect_err(|e| {
            tracing::warn!(error = %e, state = %ScannerState::Unattached, "scan detector failed to start");
        })?;

        tracing::info!(interfaces = ?names, "scan detector running");
        Ok(Self::running(names, rx, counters, attachment))
    }

    fn running(
        interfaces: Vec<String>,
        events: mpsc::Receiver<Event>,
        counters: Arc<ReaderCounters>,
        attachment: Box<dyn Attachment>,
    ) -> Self {
        Self {
            state: ScannerState::Running,
            interfaces,
            events: Some(events),
            counters,
            attachment: Some(attachment),
        }
    }

    /// Hands out the event stream. Returns `None` after the first call.
    ///
    /// The channel closes once the reader task has stopped.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<Event>> {
        self.events.take()
    }

    /// Hands out the reader and whitelist-sync task handles so a caller can
    /// wait for them after [`Scanner::close`]. Tasks not taken are aborted
    /// on close.
    pub fn take_tasks(&mut self) -> Vec<JoinHandle<()>> {
        self.attachment
            .as_mut()
            .map(|attachment| attachment.take_tasks())
            .unwrap_or_default()
    }

    /// Detaches from every interface and stops both tasks. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if detaching failed on the first call. The scanner
    /// is `Closed` either way.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ScannerState::Closed {
            return Ok(());
        }
        self.state = ScannerState::Closing;
        let result = self
            .attachment
            .take()
            .map_or(Ok(()), |mut attachment| attachment.shutdown());
        self.state = ScannerState::Closed;
        tracing::info!(interfaces = ?self.interfaces, "scan detector closed");
        result
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ScannerState {
        self.state
    }

    /// Interfaces the classifier is attached to.
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Reader counters: delivered events, short records, channel-full drops.
    #[must_use]
    pub fn stats(&self) -> ReaderStats {
        self.counters.snapshot()
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close scan detector on drop");
        }
    }
}
