//! System-on-chip: memory, bus, devices, and wiring.

/// System construction and the top-level `System` type.
pub mod builder;
/// System bus (region routing, split transfers, strict MMIO).
pub mod bus;
/// MMIO devices and the `Device` trait.
pub mod devices;
/// Sparse DRAM backing store.
pub mod dram;

pub use builder::System;
pub use bus::Bus;
pub use dram::Dram;
