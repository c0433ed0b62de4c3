//! Ingress packet decision procedure.
//!
//! Order of checks: link layer (VLAN unwrap), network layer (IPv4 or IPv6
//! with extension headers), transport layer (pure SYN or any UDP), then
//! the whitelist. The first failing check decides the [`Skip`] reason.

use crate::event::RawEvent;
use crate::packet::{PacketBytes, PortFilter};
use crate::{IPPROTO_TCP, IPPROTO_UDP, MAX_IPV6_EXT_HEADERS, MAX_VLAN_DEPTH};

const ETH_HLEN: usize = 14;
const ETH_TYPE_OFFSET: usize = 12;
const VLAN_HLEN: usize = 4;

const ETH_P_IP: u16 = 0x0800;
const ETH_P_IPV6: u16 = 0x86DD;
const ETH_P_8021Q: u16 = 0x8100;
const ETH_P_8021AD: u16 = 0x88A8;

const IPV4_MIN_HLEN: usize = 20;
const IPV4_FRAG_OFFSET_MASK: u16 = 0x1FFF;
const IPV6_HLEN: usize = 40;
const IPV6_FRAG_OFFSET_MASK: u16 = 0xFFF8;

const IPPROTO_HOPOPTS: u8 = 0;
const IPPROTO_ROUTING: u8 = 43;
const IPPROTO_FRAGMENT: u8 = 44;
const IPPROTO_AH: u8 = 51;
const IPPROTO_DSTOPTS: u8 = 60;

const TCP_HLEN: usize = 20;
const TCP_FLAGS_OFFSET: usize = 13;
const TCP_CONTROL_MASK: u8 = 0x3F;
const TCP_SYN: u8 = 0x02;
const UDP_HLEN: usize = 8;
const L4_DPORT_OFFSET: usize = 2;

/// Why a packet produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// A header extends past the end of the packet.
    Truncated,
    /// EtherType is neither IPv4 nor IPv6 after VLAN unwrapping.
    NotIp,
    /// IP version or header length field is inconsistent.
    BadHeader,
    /// A non-initial IPv4 or IPv6 fragment.
    Fragment,
    /// More IPv6 extension headers than the walk allows.
    ExtensionLimit,
    /// Transport is neither TCP nor UDP.
    UnsupportedProtocol,
    /// TCP segment other than a pure SYN.
    NotSyn,
    /// Destination port belongs to a local listener.
    Listening,
}

struct Network {
    source: [u8; 16],
    version: u8,
    protocol: u8,
    transport_offset: usize,
}

#[inline(always)]
fn need<T>(value: Option<T>) -> Result<T, Skip> {
    value.ok_or(Skip::Truncated)
}

/// Decides whether an ingress packet is a probe worth reporting.
///
/// Returns the record to emit, or the reason the packet was dropped. Never
/// reads outside the packet and performs a constant-bounded amount of work.
///
/// # Errors
///
/// Returns the [`Skip`] reason for every packet that is not a SYN or UDP
/// datagram addressed to a port outside `ports`.
#[inline(always)]
pub fn classify<P, F>(packet: &P, ports: &F) -> Result<RawEvent, Skip>
where
    P: PacketBytes + ?Sized,
    F: PortFilter + ?Sized,
{
    let (ether_type, l3) = link_layer(packet)?;
    let network = match ether_type {
        ETH_P_IP => ipv4(packet, l3)?,
        ETH_P_IPV6 => ipv6(packet, l3)?,
        _ => return Err(Skip::NotIp),
    };
    let port = transport(packet, network.protocol, network.transport_offset)?;
    if ports.is_listening(port) {
        return Err(Skip::Listening);
    }
    Ok(RawEvent::new(
        network.source,
        network.version,
        port,
        network.protocol,
    ))
}

/// Returns the innermost EtherType and the offset of the network header.
#[inline(always)]
fn link_layer<P: PacketBytes + ?Sized>(packet: &P) -> Result<(u16, usize), Skip> {
    if !packet.covers(ETH_HLEN) {
        return Err(Skip::Truncated);
    }
    let mut ether_type = need(packet.load_be16(ETH_TYPE_OFFSET))?;
    let mut l3 = ETH_HLEN;
    for _ in 0..MAX_VLAN_DEPTH {
        if ether_type != ETH_P_8021Q && ether_type != ETH_P_8021AD {
            break;
        }
        // Tag layout: TCI(2) | inner EtherType(2).
        ether_type = need(packet.load_be16(l3 + 2))?;
        l3 += VLAN_HLEN;
    }
    Ok((ether_type, l3))
}

#[inline(always)]
fn ipv4<P: PacketBytes + ?Sized>(packet: &P, l3: usize) -> Result<Network, Skip> {
    let version_ihl = need(packet.load_u8(l3))?;
    if version_ihl >> 4 != 4 {
        return Err(Skip::BadHeader);
    }
    let header_len = usize::from(version_ihl & 0x0F) * 4;
    if header_len < IPV4_MIN_HLEN {
        return Err(Skip::BadHeader);
    }
    if !packet.covers(l3 + header_len) {
        return Err(Skip::Truncated);
    }
    let flags_fragment = need(packet.load_be16(l3 + 6))?;
    if flags_fragment & IPV4_FRAG_OFFSET_MASK != 0 {
        return Err(Skip::Fragment);
    }
    let protocol = need(packet.load_u8(l3 + 9))?;
    let [a, b, c, d] = need(packet.load::<4>(l3 + 12))?;
    Ok(Network {
        source: [a, b, c, d, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        version: 4,
        protocol,
        transport_offset: l3 + header_len,
    })
}

#[inline(always)]
const fn is_extension_header(next: u8) -> bool {
    matches!(
        next,
        IPPROTO_HOPOPTS | IPPROTO_ROUTING | IPPROTO_FRAGMENT | IPPROTO_AH | IPPROTO_DSTOPTS
    )
}

#[inline(always)]
fn ipv6<P: PacketBytes + ?Sized>(packet: &P, l3: usize) -> Result<Network, Skip> {
    let version = need(packet.load_u8(l3))?;
    if version >> 4 != 6 {
        return Err(Skip::BadHeader);
    }
    if !packet.covers(l3 + IPV6_HLEN) {
        return Err(Skip::Truncated);
    }
    let mut next = need(packet.load_u8(l3 + 6))?;
    let source = need(packet.load::<16>(l3 + 8))?;
    let mut offset = l3 + IPV6_HLEN;

    for _ in 0..MAX_IPV6_EXT_HEADERS {
        match next {
            IPPROTO_HOPOPTS | IPPROTO_ROUTING | IPPROTO_DSTOPTS => {
                let [next_header, ext_len] = need(packet.load::<2>(offset))?;
                next = next_header;
                offset += usize::from(ext_len) * 8 + 8;
            }
            IPPROTO_FRAGMENT => {
                let [next_header, _reserved] = need(packet.load::<2>(offset))?;
                let fragment = need(packet.load_be16(offset + 2))?;
                if fragment & IPV6_FRAG_OFFSET_MASK != 0 {
                    return Err(Skip::Fragment);
                }
                next = next_header;
                offset += 8;
            }
            IPPROTO_AH => {
                let [next_header, payload_len] = need(packet.load::<2>(offset))?;
                next = next_header;
                offset += (usize::from(payload_len) + 2) * 4;
            }
            _ => break,
        }
    }
    if is_extension_header(next) {
        return Err(Skip::ExtensionLimit);
    }

    Ok(Network {
        source,
        version: 6,
        protocol: next,
        transport_offset: offset,
    })
}

/// Applies the transport filter and returns the destination port.
#[inline(always)]
fn transport<P: PacketBytes + ?Sized>(packet: &P, protocol: u8, l4: usize) -> Result<u16, Skip> {
    match protocol {
        IPPROTO_TCP => {
            if !packet.covers(l4 + TCP_HLEN) {
                return Err(Skip::Truncated);
            }
            let flags = need(packet.load_u8(l4 + TCP_FLAGS_OFFSET))?;
            if flags & TCP_CONTROL_MASK != TCP_SYN {
                return Err(Skip::NotSyn);
            }
            need(packet.load_be16(l4 + L4_DPORT_OFFSET))
        }
        IPPROTO_UDP => {
            if !packet.covers(l4 + UDP_HLEN) {
                return Err(Skip::Truncated);
            }
            need(packet.load_be16(l4 + L4_DPORT_OFFSET))
        }
        _ => Err(Skip::UnsupportedProtocol),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use super::*;

    const SYN: u8 = 0x02;
    const ACK: u8 = 0x10;
    const RST: u8 = 0x04;
    const FIN: u8 = 0x01;
    const PSH: u8 = 0x08;
    const URG: u8 = 0x20;
    const ECE: u8 = 0x40;
    const CWR: u8 = 0x80;

    fn nothing_listening(_: u16) -> bool {
        false
    }

    fn ethernet(vlans: &[u16], ether_type: u16) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame[..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
        frame[6..].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
        for (i, tpid) in vlans.iter().enumerate() {
            frame.extend_from_slice(&tpid.to_be_bytes());
            frame.extend_from_slice(&(100 + u16::try_from(i).unwrap()).to_be_bytes());
        }
        frame.extend_from_slice(&ether_type.to_be_bytes());
        frame
    }

    fn ipv4_header(src: Ipv4Addr, protocol: u8, fragment: u16, options: usize) -> Vec<u8> {
        let ihl = 5 + u8::try_from(options / 4).unwrap();
        let mut header = vec![0x40 | ihl, 0, 0, 0, 0, 0];
        header.extend_from_slice(&fragment.to_be_bytes());
        header.extend_from_slice(&[64, protocol, 0, 0]);
        header.extend_from_slice(&src.octets());
        header.extend_from_slice(&[192, 0, 2, 1]);
        header.extend(std::iter::repeat_n(1u8, options));
        header
    }

    fn ipv6_header(src: Ipv6Addr, next: u8) -> Vec<u8> {
        let mut header = vec![0x60, 0, 0, 0, 0, 0, next, 64];
        header.extend_from_slice(&src.octets());
        header.extend_from_slice(&"2001:db8::100".parse::<Ipv6Addr>().unwrap().octets());
        header
    }

    fn tcp(dport: u16, flags: u8) -> Vec<u8> {
        let mut header = vec![0u8; 20];
        header[..2].copy_from_slice(&40_000u16.to_be_bytes());
        header[2..4].copy_from_slice(&dport.to_be_bytes());
        header[12] = 0x50;
        header[13] = flags;
        header
    }

    fn udp(dport: u16) -> Vec<u8> {
        let mut header = vec![0u8; 8];
        header[..2].copy_from_slice(&53_000u16.to_be_bytes());
        header[2..4].copy_from_slice(&dport.to_be_bytes());
        header
    }

    fn v4_packet(src: &str, l4: &[u8], protocol: u8) -> Vec<u8> {
        let mut packet = ethernet(&[], ETH_P_IP);
        packet.extend(ipv4_header(src.parse().unwrap(), protocol, 0, 0));
        packet.extend_from_slice(l4);
        packet
    }

    fn v6_packet(src: &str, extensions: &[u8], first_next: u8, l4: &[u8]) -> Vec<u8> {
        let mut packet = ethernet(&[], ETH_P_IPV6);
        packet.extend(ipv6_header(src.parse().unwrap(), first_next));
        packet.extend_from_slice(extensions);
        packet.extend_from_slice(l4);
        packet
    }

    fn run(packet: &[u8]) -> Result<RawEvent, Skip> {
        classify(packet, &nothing_listening)
    }

    #[test]
    fn ipv4_pure_syn_emits_one_event() {
        let packet = v4_packet("203.0.113.9", &tcp(2222, SYN), IPPROTO_TCP);
        let event = run(&packet).expect("syn should be reported");
        assert_eq!(event.port(), 2222);
        assert_eq!(event.protocol, IPPROTO_TCP);
        assert_eq!(event.ip_version, 4);
        assert_eq!(event.source(), IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)));
        assert_eq!(&event.src_addr[4..], &[0u8; 12]);
    }

    #[test]
    fn tcp_flag_combinations_other_than_pure_syn_are_dropped() {
        for flags in [
            SYN | ACK,
            SYN | RST,
            SYN | FIN,
            SYN | PSH,
            SYN | URG,
            ACK,
            RST,
            FIN | ACK,
            PSH | ACK,
            0,
            FIN | PSH | URG,
        ] {
            let packet = v4_packet("203.0.113.9", &tcp(8080, flags), IPPROTO_TCP);
            assert_eq!(run(&packet), Err(Skip::NotSyn), "flags {flags:#04x}");
        }
    }

    #[test]
    fn syn_with_ecn_setup_bits_is_still_a_probe() {
        // ECE and CWR sit above the six control bits.
        let packet = v4_packet("203.0.113.9", &tcp(8080, SYN | ECE | CWR), IPPROTO_TCP);
        assert!(run(&packet).is_ok());
    }

    #[test]
    fn udp_to_closed_port_emits_event() {
        let packet = v4_packet("198.51.100.4", &udp(161), IPPROTO_UDP);
        let event = run(&packet).expect("udp should be reported");
        assert_eq!(event.port(), 161);
        assert_eq!(event.protocol, IPPROTO_UDP);
    }

    #[test]
    fn whitelisted_ports_are_dropped_for_tcp_and_udp() {
        let listening = |port: u16| port == 22 || port == 53;
        let syn = v4_packet("203.0.113.9", &tcp(22, SYN), IPPROTO_TCP);
        let dns = v4_packet("203.0.113.9", &udp(53), IPPROTO_UDP);
        assert_eq!(classify(syn.as_slice(), &listening), Err(Skip::Listening));
        assert_eq!(classify(dns.as_slice(), &listening), Err(Skip::Listening));
    }

    #[test]
    fn only_the_unlisted_port_yields_an_event() {
        let listening = |port: u16| port == 22;
        let events: Vec<_> = [22u16, 2222]
            .iter()
            .map(|&port| v4_packet("203.0.113.9", &tcp(port, SYN), IPPROTO_TCP))
            .filter_map(|packet| classify(packet.as_slice(), &listening).ok())
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].port(), 2222);
    }

    #[test]
    fn non_initial_ipv4_fragments_are_dropped() {
        let mut packet = ethernet(&[], ETH_P_IP);
        packet.extend(ipv4_header(Ipv4Addr::new(203, 0, 113, 9), IPPROTO_UDP, 185, 0));
        packet.extend(udp(9999));
        assert_eq!(run(&packet), Err(Skip::Fragment));
    }

    #[test]
    fn first_ipv4_fragment_with_more_fragments_flag_is_inspected() {
        let mut packet = ethernet(&[], ETH_P_IP);
        packet.extend(ipv4_header(Ipv4Addr::new(203, 0, 113, 9), IPPROTO_UDP, 0x2000, 0));
        packet.extend(udp(9999));
        assert!(run(&packet).is_ok());
    }

    #[test]
    fn ipv4_options_shift_the_transport_header() {
        let mut packet = ethernet(&[], ETH_P_IP);
        packet.extend(ipv4_header(Ipv4Addr::new(203, 0, 113, 9), IPPROTO_TCP, 0, 8));
        packet.extend(tcp(3389, SYN));
        assert_eq!(run(&packet).map(|e| e.port()), Ok(3389));
    }

    #[test]
    fn ipv4_header_length_below_minimum_is_dropped() {
        let mut packet = v4_packet("203.0.113.9", &tcp(80, SYN), IPPROTO_TCP);
        packet[ETH_HLEN] = 0x44;
        assert_eq!(run(&packet), Err(Skip::BadHeader));
    }

    #[test]
    fn version_mismatch_is_dropped() {
        let mut packet = v4_packet("203.0.113.9", &tcp(80, SYN), IPPROTO_TCP);
        packet[ETH_HLEN] = 0x65;
        assert_eq!(run(&packet), Err(Skip::BadHeader));
    }

    #[test]
    fn single_and_double_vlan_tags_are_unwrapped() {
        for vlans in [&[ETH_P_8021Q][..], &[ETH_P_8021AD, ETH_P_8021Q]] {
            let mut packet = ethernet(vlans, ETH_P_IP);
            packet.extend(ipv4_header(Ipv4Addr::new(203, 0, 113, 9), IPPROTO_TCP, 0, 0));
            packet.extend(tcp(445, SYN));
            assert_eq!(run(&packet).map(|e| e.port()), Ok(445), "vlans {vlans:?}");
        }
    }

    #[test]
    fn third_vlan_tag_is_not_unwrapped() {
        let mut packet = ethernet(&[ETH_P_8021AD, ETH_P_8021Q, ETH_P_8021Q], ETH_P_IP);
        packet.extend(ipv4_header(Ipv4Addr::new(203, 0, 113, 9), IPPROTO_TCP, 0, 0));
        packet.extend(tcp(445, SYN));
        assert_eq!(run(&packet), Err(Skip::NotIp));
    }

    #[test]
    fn non_ip_ethertypes_are_dropped() {
        let mut arp = ethernet(&[], 0x0806);
        arp.extend_from_slice(&[0u8; 28]);
        assert_eq!(run(&arp), Err(Skip::NotIp));
    }

    #[test]
    fn ipv6_syn_emits_full_source_address() {
        let packet = v6_packet("2001:db8:dead::beef", &[], IPPROTO_TCP, &tcp(22, SYN));
        let event = run(&packet).expect("ipv6 syn should be reported");
        assert_eq!(event.ip_version, 6);
        assert_eq!(event.source().to_string(), "2001:db8:dead::beef");
        assert_eq!(event.port(), 22);
    }

    #[test]
    fn ipv6_generic_extension_headers_are_walked() {
        // Hop-by-Hop (8 bytes) -> Destination Options (16 bytes) -> UDP.
        let mut ext = vec![IPPROTO_DSTOPTS, 0, 1, 4, 0, 0, 0, 0];
        ext.extend_from_slice(&[IPPROTO_UDP, 1]);
        ext.extend_from_slice(&[0u8; 14]);
        let packet = v6_packet("2001:db8::7", &ext, IPPROTO_HOPOPTS, &udp(5060));
        assert_eq!(run(&packet).map(|e| e.port()), Ok(5060));
    }

    #[test]
    fn ipv6_authentication_header_is_sized_in_words() {
        // AH with payload length 4 spans (4 + 2) * 4 = 24 bytes.
        let mut ext = vec![IPPROTO_TCP, 4, 0, 0];
        ext.extend_from_slice(&[0u8; 20]);
        let packet = v6_packet("2001:db8::7", &ext, IPPROTO_AH, &tcp(25, SYN));
        assert_eq!(run(&packet).map(|e| e.port()), Ok(25));
    }

    #[test]
    fn ipv6_first_fragment_is_inspected() {
        // Offset 0, M flag set.
        let ext = [IPPROTO_UDP, 0, 0x00, 0x01, 0, 0, 0, 42];
        let packet = v6_packet("2001:db8::7", &ext, IPPROTO_FRAGMENT, &udp(123));
        assert_eq!(run(&packet).map(|e| e.port()), Ok(123));
    }

    #[test]
    fn ipv6_non_initial_fragment_is_dropped() {
        // Offset 1 (8 bytes) in the upper 13 bits.
        let ext = [IPPROTO_UDP, 0, 0x00, 0x08, 0, 0, 0, 42];
        let packet = v6_packet("2001:db8::7", &ext, IPPROTO_FRAGMENT, &udp(123));
        assert_eq!(run(&packet), Err(Skip::Fragment));
    }

    #[test]
    fn ipv6_extension_chain_beyond_limit_is_dropped() {
        let mut ext = Vec::new();
        for _ in 0..MAX_IPV6_EXT_HEADERS {
            ext.extend_from_slice(&[IPPROTO_DSTOPTS, 0, 0, 0, 0, 0, 0, 0]);
        }
        ext.extend_from_slice(&[IPPROTO_UDP, 0, 0, 0, 0, 0, 0, 0]);
        let packet = v6_packet("2001:db8::7", &ext, IPPROTO_DSTOPTS, &udp(123));
        assert_eq!(run(&packet), Err(Skip::ExtensionLimit));
    }

    #[test]
    fn ipv6_chain_at_limit_is_accepted() {
        let mut ext = Vec::new();
        for i in 0..MAX_IPV6_EXT_HEADERS {
            let next = if i + 1 == MAX_IPV6_EXT_HEADERS {
                IPPROTO_UDP
            } else {
                IPPROTO_DSTOPTS
            };
            ext.extend_from_slice(&[next, 0, 0, 0, 0, 0, 0, 0]);
        }
        let packet = v6_packet("2001:db8::7", &ext, IPPROTO_DSTOPTS, &udp(123));
        assert_eq!(run(&packet).map(|e| e.port()), Ok(123));
    }

    #[test]
    fn other_transports_are_dropped() {
        let icmp = v4_packet("203.0.113.9", &[8, 0, 0, 0, 0, 0, 0, 0], 1);
        assert_eq!(run(&icmp), Err(Skip::UnsupportedProtocol));
        let no_next = v6_packet("2001:db8::7", &[], 59, &[]);
        assert_eq!(run(&no_next), Err(Skip::UnsupportedProtocol));
    }

    #[test]
    fn truncated_packets_never_emit() {
        let full = v4_packet("203.0.113.9", &tcp(2222, SYN), IPPROTO_TCP);
        for len in 0..full.len() {
            assert!(run(&full[..len]).is_err(), "prefix of {len} bytes emitted");
        }
        let full = v6_packet("2001:db8::7", &[], IPPROTO_UDP, &udp(123));
        for len in 0..full.len() {
            assert!(run(&full[..len]).is_err(), "prefix of {len} bytes emitted");
        }
    }

    #[test]
    fn truncated_tcp_header_reports_truncation() {
        let packet = v4_packet("203.0.113.9", &tcp(2222, SYN)[..12], IPPROTO_TCP);
        assert_eq!(run(&packet), Err(Skip::Truncated));
    }
}
