//! # scanaware-classifier
//!
//! The ingress probe classifier shared by the eBPF program and user space.
//!
//! The decision procedure in [`classify`] is written against two small
//! traits so the same code runs in the kernel sandbox and under the host
//! test harness:
//!
//! - [`PacketBytes`]: fixed-size, bounds-checked loads at an offset. The
//!   kernel implements it over `bpf_skb_load_bytes`; tests over `[u8]`.
//! - [`PortFilter`]: whitelist lookup for the destination port.
//!
//! Every loop has a constant bound and every load returns `Option`, so a
//! malformed packet can only ever produce a [`Skip`], never a fault.
//!
//! [`RawEvent`] is the 20-byte record handed from the classifier to user
//! space through the ring buffer.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod classify;
mod event;
mod packet;

pub use classify::{Skip, classify};
pub use event::{RAW_EVENT_SIZE, RawEvent};
pub use packet::{PacketBytes, PortFilter};

/// Name of the TC classifier program inside the eBPF object.
pub const PROGRAM_NAME: &str = "scan_detector";

/// Name of the ring buffer map carrying [`RawEvent`]s.
pub const EVENTS_MAP: &str = "EVENTS";

/// Name of the listening-port whitelist map (`u16` port → `u8` marker).
pub const LISTENING_PORTS_MAP: &str = "LISTENING_PORTS";

/// Ring buffer size in bytes. Must be a power-of-two multiple of the page size.
pub const RING_BUFFER_BYTES: u32 = 256 * 1024;

/// Capacity of the whitelist map: every possible port.
pub const MAX_LISTENING_PORTS: u32 = 65_536;

/// Maximum nested VLAN tags skipped before giving up.
pub const MAX_VLAN_DEPTH: usize = 2;

/// Maximum IPv6 extension headers walked before giving up.
pub const MAX_IPV6_EXT_HEADERS: usize = 8;

/// Protocol tag for TCP in [`RawEvent::protocol`].
pub const IPPROTO_TCP: u8 = 6;

/// Protocol tag for UDP in [`RawEvent::protocol`].
pub const IPPROTO_UDP: u8 = 17;
