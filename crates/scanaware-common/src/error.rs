//! Unified error types for the scanaware workspace.
//!
//! Failures on the packet path never surface here; the classifier only
//! drops. These variants cover the control plane: attaching, reading the
//! ring buffer, persisting aggregates, and geo enrichment.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The host cannot run the classifier (non-Linux, missing capability,
    /// kernel without BPF ring buffers, or a build without the `ebpf` feature).
    #[error("scan detection unsupported: {reason}")]
    Unsupported {
        /// Why the capability check failed.
        reason: String,
    },

    /// No interface was requested and none could be autodetected.
    #[error("no available network interface found")]
    NoInterfaceFound,

    /// Attaching the classifier to an interface failed.
    #[error("failed to attach to interface {interface}: {reason}")]
    AttachFailed {
        /// Interface the attach was attempted on.
        interface: String,
        /// Underlying failure.
        reason: String,
    },

    /// The classifier or its maps failed to load or verify.
    #[error("failed to load classifier: {reason}")]
    CompileFailed {
        /// Loader or verifier message.
        reason: String,
    },

    /// Reading the event ring buffer failed for a reason other than shutdown.
    #[error("ring buffer read failed: {reason}")]
    ReadFailed {
        /// Underlying failure.
        reason: String,
    },

    /// Inserting into or removing from the listening-port table failed.
    #[error("whitelist update failed for port {port}: {reason}")]
    WhitelistUpdate {
        /// Port being inserted or removed.
        port: u16,
        /// Underlying failure.
        reason: String,
    },

    /// The record store rejected a write or delete.
    #[error("persistence failed: {reason}")]
    PersistenceFailed {
        /// Underlying failure.
        reason: String,
    },

    /// A GeoIP database could not be opened or queried.
    #[error("geoip lookup failed: {reason}")]
    LookupFailed {
        /// Underlying failure.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl ScanError {
    /// Builds an [`ScanError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ScanError>;
