//! TC ingress classifier.
//!
//! Runs the shared decision procedure on every ingress packet and writes a
//! record to `EVENTS` for each probe. The packet always continues up the
//! stack.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::TC_ACT_OK,
    macros::{classifier, map},
    maps::{HashMap, RingBuf},
    programs::TcContext,
};
use scanaware_classifier::{MAX_LISTENING_PORTS, PacketBytes, RING_BUFFER_BYTES, classify};

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(RING_BUFFER_BYTES, 0);

#[map]
static LISTENING_PORTS: HashMap<u16, u8> = HashMap::with_max_entries(MAX_LISTENING_PORTS, 0);

/// Packet loads through `bpf_skb_load_bytes`.
struct Skb<'a>(&'a TcContext);

impl PacketBytes for Skb<'_> {
    #[inline(always)]
    fn packet_len(&self) -> usize {
        self.0.len() as usize
    }

    #[inline(always)]
    fn load<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.0.load::<[u8; N]>(offset).ok()
    }
}

#[inline(always)]
fn is_listening(port: u16) -> bool {
    unsafe { LISTENING_PORTS.get(&port) }.is_some()
}

#[classifier]
pub fn scan_detector(ctx: TcContext) -> i32 {
    if let Ok(event) = classify(&Skb(&ctx), &is_listening) {
        // A full ring buffer drops the record; the packet is unaffected.
        let _ = EVENTS.output(&event, 0);
    }
    TC_ACT_OK
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[unsafe(link_section = "license")]
#[unsafe(no_mangle)]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
