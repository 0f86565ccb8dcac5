//! Common types shared across the simulator.
//!
//! This module collects the vocabulary used by every other component:
//! 1. **Access classification:** Fetch/read/write kinds and endianness.
//! 2. **Data packing:** Endianness- and signedness-aware integer conversion.
//! 3. **Errors:** The crate-wide error enum and result alias.

/// Access kinds, endianness, and integer pack/unpack helpers.
pub mod data;
/// Error kinds raised by memory, bus, MMU, cache, and device operations.
pub mod error;

pub use data::{pack_int, unpack_int, AccessKind, Endianness};
pub use error::{MemError, MemResult};
