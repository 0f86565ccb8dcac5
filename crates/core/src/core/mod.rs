//! CPU core: front-end, CSR block, and memory units.

/// CPU front-end (typed memory operations, CSRs, interrupt aggregation).
pub mod cpu;
/// Memory units (MMU and cache hierarchy).
pub mod units;

pub use cpu::Cpu;
