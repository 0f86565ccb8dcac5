//! Memory and interrupt subsystem simulator.
//!
//! This crate implements an in-process model of a small computer's memory
//! fabric and interrupt plumbing:
//! 1. **Memory:** Sparse DRAM, a region-routing bus with strict MMIO caps,
//!    and a DMA engine acting as a bus master.
//! 2. **CPU front-end:** Typed loads/stores/fetches over paged virtual
//!    addresses, an LRU TLB with address-space identifiers, and a
//!    write-combining buffer.
//! 3. **Caches:** A four-level inclusive write-back hierarchy with LRU
//!    replacement and child-aware eviction.
//! 4. **Interrupts:** A priority/threshold external controller with
//!    claim/complete, a per-hart CLINT, peripherals driving their lines,
//!    and CSR-level delivery.
//! 5. **Firmware:** Boot-time page allocator, runtime variable store, and
//!    wall-clock service.

/// Common types (addresses, access kinds, integer packing, errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical structures).
pub mod config;
/// CPU core (front-end, CSRs, MMU, caches).
pub mod core;
/// Firmware boot and runtime services.
pub mod fw;
/// System-on-chip (bus, DRAM, devices, wiring).
pub mod soc;
/// Statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// CPU front-end; holds the MMU, caches, CSRs, and interrupt attachments.
pub use crate::core::Cpu;
/// Top-level system; construct with `System::new`.
pub use crate::soc::System;
