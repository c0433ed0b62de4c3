//! # scanaware-ebpf
//!
//! The scanner controller: owns the TC ingress classifier and the
//! user-space half of its event pipeline.
//!
//! - **Scanner**: load, verify, attach to interfaces, and tear down.
//! - **Reader**: drain the ring buffer into a bounded event channel.
//! - **Listening ports**: mirror the host's bound sockets into the
//!   whitelist map the classifier consults.
//! - **Interfaces**: enumerate candidate interfaces and pick a default.
//!
//! The `ebpf` feature flag must be enabled and the host must be Linux with
//! BPF ring buffer support for the scanner to start. Without it every
//! entry point reports the capability as unsupported.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod interfaces;
pub mod listening;
#[cfg(all(target_os = "linux", feature = "ebpf"))]
mod programs;
pub mod reader;
pub mod scanner;

pub use reader::ReaderStats;
pub use scanner::{Scanner, ScannerState, supported};
