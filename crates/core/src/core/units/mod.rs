//! Memory units shared by the CPU front-end.

/// Multi-level inclusive cache controller.
pub mod cache;
/// Memory management unit with TLB.
pub mod mmu;
