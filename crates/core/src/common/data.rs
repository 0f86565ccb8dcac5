//! Access classification and integer packing.
//!
//! This module defines how memory accesses are categorized and how integer
//! values cross the byte-stream boundary. It is used for:
//! 1. **Permission Validation:** Distinguishing fetch, read, and write in the MMU.
//! 2. **Typed Loads/Stores:** Packing and unpacking values at any width from
//!    1 to 8 bytes, honoring the target's endianness and signedness.

use serde::Deserialize;

/// Kind of memory access operation.
///
/// Used to distinguish instruction fetches from data loads and stores for
/// permission enforcement and fault reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// Instruction fetch. Requires execute permission.
    Fetch,
    /// Data load. Requires the page to be present.
    Read,
    /// Data store. Requires write permission.
    Write,
}

/// Byte order of the simulated target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Least-significant byte first (the default).
    #[default]
    Little,
    /// Most-significant byte first.
    Big,
}

/// Packs the low `size` bytes of `value` into a byte vector.
///
/// The value is truncated to `size` bytes; two's-complement representation
/// makes the operation identical for signed and unsigned inputs.
///
/// # Arguments
///
/// * `value` - The integer to pack.
/// * `size` - Number of bytes to emit (1 to 8).
/// * `endian` - Target byte order.
pub fn pack_int(value: u64, size: usize, endian: Endianness) -> Vec<u8> {
    debug_assert!((1..=8).contains(&size));
    let mut out = vec![0u8; size];
    for (i, slot) in out.iter_mut().enumerate() {
        let shift = match endian {
            Endianness::Little => 8 * i as u32,
            Endianness::Big => 8 * (size - 1 - i) as u32,
        };
        *slot = (value >> shift) as u8;
    }
    out
}

/// Unpacks a byte slice into a 64-bit integer.
///
/// When `signed` is true and the top bit of the source is set, the result is
/// sign-extended to the full 64 bits.
///
/// # Arguments
///
/// * `bytes` - Source bytes (1 to 8).
/// * `signed` - Whether to sign-extend the result.
/// * `endian` - Source byte order.
pub fn unpack_int(bytes: &[u8], signed: bool, endian: Endianness) -> u64 {
    debug_assert!((1..=8).contains(&bytes.len()));
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let shift = match endian {
            Endianness::Little => 8 * i as u32,
            Endianness::Big => 8 * (bytes.len() - 1 - i) as u32,
        };
        value |= (*byte as u64) << shift;
    }
    let width = 8 * bytes.len() as u32;
    if signed && width < 64 && (value >> (width - 1)) & 1 == 1 {
        value |= !0u64 << width;
    }
    value
}
