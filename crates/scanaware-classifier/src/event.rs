//! Wire layout of the classifier's ring-buffer record.

use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Size of a [`RawEvent`] on the wire.
pub const RAW_EVENT_SIZE: usize = 20;

/// Fixed-size record emitted for every probe.
///
/// Layout: `src_addr(16) | dst_port(2, big-endian) | protocol(1) | version(1)`.
/// IPv4 sources occupy the first four address bytes; the rest are zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Source address bytes.
    pub src_addr: [u8; 16],
    /// Destination port in network byte order.
    pub dst_port: [u8; 2],
    /// [`crate::IPPROTO_TCP`] or [`crate::IPPROTO_UDP`].
    pub protocol: u8,
    /// 4 or 6.
    pub ip_version: u8,
}

const _: () = assert!(core::mem::size_of::<RawEvent>() == RAW_EVENT_SIZE);

impl RawEvent {
    /// Builds a record. `port` is taken in host order.
    #[inline(always)]
    #[must_use]
    pub const fn new(src_addr: [u8; 16], ip_version: u8, port: u16, protocol: u8) -> Self {
        Self {
            src_addr,
            dst_port: port.to_be_bytes(),
            protocol,
            ip_version,
        }
    }

    /// Destination port in host order.
    #[must_use]
    pub const fn port(&self) -> u16 {
        u16::from_be_bytes(self.dst_port)
    }

    /// Source address, IPv6 when the version marker says so, IPv4 otherwise.
    #[must_use]
    pub fn source(&self) -> IpAddr {
        if self.ip_version == 6 {
            IpAddr::V6(Ipv6Addr::from(self.src_addr))
        } else {
            let [a, b, c, d, ..] = self.src_addr;
            IpAddr::V4(Ipv4Addr::new(a, b, c, d))
        }
    }

    /// Serializes to the wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RAW_EVENT_SIZE] {
        let mut out = [0u8; RAW_EVENT_SIZE];
        out[..16].copy_from_slice(&self.src_addr);
        out[16..18].copy_from_slice(&self.dst_port);
        out[18] = self.protocol;
        out[19] = self.ip_version;
        out
    }

    /// Parses a ring-buffer sample. Returns `None` for short samples;
    /// trailing bytes beyond the record are ignored.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let record: &[u8; RAW_EVENT_SIZE] = bytes.get(..RAW_EVENT_SIZE)?.try_into().ok()?;
        let mut src_addr = [0u8; 16];
        src_addr.copy_from_slice(&record[..16]);
        Some(Self {
            src_addr,
            dst_port: [record[16], record[17]],
            protocol: record[18],
            ip_version: record[19],
        })
    }
}
