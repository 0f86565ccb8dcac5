//! Boot-time physical page allocator.
//!
//! Hands out page frames from the bus's RAM regions: a bump pointer per
//! region for contiguous runs, plus a free list for returned single pages.

use crate::common::{MemError, MemResult};
use crate::soc::bus::Bus;

struct FrameRegion {
    next: u64,
    end: u64,
}

/// Page-frame allocator over the registered RAM regions.
pub struct BootAllocator {
    page_size: u64,
    regions: Vec<FrameRegion>,
    free: Vec<u64>,
}

impl BootAllocator {
    /// Builds an allocator over the bus's current RAM regions.
    ///
    /// Region edges are aligned inward so only whole pages are handed out.
    pub fn new(bus: &Bus, page_size: u64) -> Self {
        let regions = bus
            .ram_regions()
            .into_iter()
            .filter_map(|(base, size)| {
                let start = base.next_multiple_of(page_size);
                let end = (base + size) / page_size * page_size;
                if start < end {
                    Some(FrameRegion { next: start, end })
                } else {
                    None
                }
            })
            .collect();
        Self {
            page_size,
            regions,
            free: Vec::new(),
        }
    }

    /// Number of pages still allocatable (bump pools plus free list).
    pub fn remaining_pages(&self) -> u64 {
        let bump: u64 = self
            .regions
            .iter()
            .map(|r| (r.end - r.next) / self.page_size)
            .sum();
        bump + self.free.len() as u64
    }

    /// Allocates one page.
    pub fn alloc_page(&mut self) -> MemResult<u64> {
        if let Some(pa) = self.free.pop() {
            return Ok(pa);
        }
        self.alloc_pages(1)
    }

    /// Allocates `n` contiguous pages.
    ///
    /// # Returns
    ///
    /// The physical address of the first page, or `OutOfMemory` when no
    /// region has room.
    pub fn alloc_pages(&mut self, n: usize) -> MemResult<u64> {
        if n == 0 {
            return Err(MemError::OutOfMemory { pages: 0 });
        }
        let span = self.page_size * n as u64;
        for region in &mut self.regions {
            if region.end - region.next >= span {
                let pa = region.next;
                region.next += span;
                return Ok(pa);
            }
        }
        Err(MemError::OutOfMemory { pages: n })
    }

    /// Returns `n` pages starting at `pa` to the free list.
    pub fn free_pages(&mut self, pa: u64, n: usize) {
        for i in 0..n as u64 {
            self.free.push(pa + i * self.page_size);
        }
    }
}
