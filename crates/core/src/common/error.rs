//! Error kinds for the memory and interrupt subsystem.
//!
//! This module defines the single error enum shared by DRAM, the bus, the
//! MMU, the cache hierarchy, devices, and the firmware surfaces. It provides:
//! 1. **Classification:** One variant per failure kind, with the faulting
//!    address or offending configuration attached.
//! 2. **Propagation:** Errors are raised synchronously at the point of
//!    violation and never retried; statistics counters are never rolled back.
//! 3. **Reporting:** Integration with the standard error traits.

use std::fmt;

use super::data::AccessKind;

/// Result alias used throughout the simulator.
pub type MemResult<T> = Result<T, MemError>;

/// Failure kinds raised by memory, bus, translation, and device operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemError {
    /// A DRAM or bus transfer escaped the bounds of its region.
    AccessViolation {
        /// First address of the offending transfer.
        addr: u64,
        /// Length of the offending transfer in bytes.
        len: usize,
    },

    /// A bus transfer touched an address with no covering region.
    Unmapped {
        /// The first uncovered address.
        addr: u64,
    },

    /// An attempt to register a bus region that intersects an existing one.
    Overlap {
        /// Name of the rejected region.
        name: String,
        /// Base address of the rejected region.
        base: u64,
        /// Size of the rejected region in bytes.
        size: u64,
    },

    /// A strict-mode MMIO access violated a device's alignment or width caps.
    MmioConstraint {
        /// Name of the device or region.
        name: String,
        /// Offending address (bus) or device-relative offset (device).
        addr: u64,
        /// Size of the offending access in bytes.
        len: usize,
    },

    /// Translation found no present page table entry.
    PageFault {
        /// Address space the lookup ran in.
        asid: u16,
        /// Faulting virtual address.
        va: u64,
    },

    /// An access violated the page's permission bits.
    PermissionDenied {
        /// Faulting virtual address.
        va: u64,
        /// The kind of access that was refused.
        access: AccessKind,
    },

    /// The MMU's physical frame pool is exhausted.
    OutOfFrames,

    /// The boot allocator cannot satisfy a contiguous page request.
    OutOfMemory {
        /// Number of pages that were requested.
        pages: usize,
    },

    /// A write to a strict ROM or a read-only firmware variable.
    ReadOnly {
        /// Name of the device or variable.
        name: String,
    },

    /// Invalid configuration: cache geometry, page size, alignment.
    BadConfig(String),

    /// Device-specific failure (for example a DMA transfer error).
    DeviceError {
        /// Name of the device.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A bus failure surfaced through the cache hierarchy.
    ///
    /// Wraps the underlying error with the cache level and block address
    /// that triggered the fill, writeback, or prefetch.
    CacheFault {
        /// Name of the cache level ("l1d", "l1i", "l2", "l3").
        level: &'static str,
        /// Block address of the failing line operation.
        block: u64,
        /// The underlying bus error.
        source: Box<MemError>,
    },
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemError::AccessViolation { addr, len } => {
                write!(f, "access violation: {} bytes at {:#x}", len, addr)
            }
            MemError::Unmapped { addr } => write!(f, "unmapped bus address {:#x}", addr),
            MemError::Overlap { name, base, size } => write!(
                f,
                "region '{}' [{:#x}, {:#x}) overlaps an existing region",
                name,
                base,
                base + size
            ),
            MemError::MmioConstraint { name, addr, len } => write!(
                f,
                "mmio constraint on '{}': {} bytes at {:#x}",
                name, len, addr
            ),
            MemError::PageFault { asid, va } => {
                write!(f, "page fault at {:#x} (asid {})", va, asid)
            }
            MemError::PermissionDenied { va, access } => {
                write!(f, "{:?} access denied at {:#x}", access, va)
            }
            MemError::OutOfFrames => write!(f, "physical frame pool exhausted"),
            MemError::OutOfMemory { pages } => {
                write!(f, "out of memory: {} contiguous pages requested", pages)
            }
            MemError::ReadOnly { name } => write!(f, "'{}' is read-only", name),
            MemError::BadConfig(reason) => write!(f, "bad configuration: {}", reason),
            MemError::DeviceError { name, reason } => {
                write!(f, "device '{}': {}", name, reason)
            }
            MemError::CacheFault {
                level,
                block,
                source,
            } => write!(f, "{} fault at block {:#x}: {}", level, block, source),
        }
    }
}

impl std::error::Error for MemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MemError::CacheFault { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
