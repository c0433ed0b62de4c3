//! Packet access and whitelist abstractions.

/// Bounds-checked, fixed-size reads from a packet.
pub trait PacketBytes {
    /// Total packet length in bytes, starting at the Ethernet header.
    fn packet_len(&self) -> usize;

    /// Copies `N` bytes starting at `offset`, or `None` if any of them lies
    /// past the end of the packet.
    fn load<const N: usize>(&self, offset: usize) -> Option<[u8; N]>;

    /// Reads one byte.
    #[inline(always)]
    fn load_u8(&self, offset: usize) -> Option<u8> {
        self.load::<1>(offset).map(|[b]| b)
    }

    /// Reads a big-endian `u16`.
    #[inline(always)]
    fn load_be16(&self, offset: usize) -> Option<u16> {
        self.load::<2>(offset).map(u16::from_be_bytes)
    }

    /// Returns `true` if the packet holds at least `end` bytes.
    #[inline(always)]
    fn covers(&self, end: usize) -> bool {
        self.packet_len() >= end
    }
}

impl PacketBytes for [u8] {
    fn packet_len(&self) -> usize {
        self.len()
    }

    fn load<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        self.get(offset..end)?.try_into().ok()
    }
}

/// Whitelist of destination ports the host is listening on.
pub trait PortFilter {
    /// Returns `true` if `port` belongs to a local listener.
    fn is_listening(&self, port: u16) -> bool;
}

impl<F> PortFilter for F
where
    F: Fn(u16) -> bool,
{
    #[inline(always)]
    fn is_listening(&self, port: u16) -> bool {
        self(port)
    }
}
