//! Embedded BPF object.
//!
//! The `scanaware-tc` crate is compiled for `bpfel-unknown-none` by the
//! build script and its object file is baked into this crate, so the
//! scanner has no runtime dependency on a compiler or on files next to
//! the binary.

/// The compiled classifier object, aligned for the ELF parser.
pub(crate) fn object() -> &'static [u8] {
    aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/scanaware-tc"))
}
