//! Memory Management Unit.
//!
//! Per-ASID page tables with typed page attributes, a shared LRU TLB, and a
//! bounded physical frame pool. The MMU is purely a translation and
//! permission engine; it never touches the bus.
//!
//! Memory-type rules: `device` and `wc` pages are uncached unless the
//! mapper explicitly overrides, and any attribute change invalidates the
//! page's TLB entry.

/// Translation lookaside buffer.
pub mod tlb;

use std::collections::HashMap;

use crate::common::{AccessKind, MemError, MemResult};
use crate::config::MmuConfig;

use self::tlb::Tlb;

/// Memory type of a page, controlling cacheability and store routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemType {
    /// Ordinary memory; cacheable by default.
    #[default]
    Normal,
    /// Device registers; uncached, stores are ordering barriers.
    Device,
    /// Write-combining memory; uncached, stores coalesce in the CPU buffer.
    Wc,
}

/// A page table entry.
#[derive(Clone, Copy, Debug)]
pub struct Pte {
    /// Physical frame number.
    pub frame: u64,
    /// The translation is valid.
    pub present: bool,
    /// Stores are allowed.
    pub writable: bool,
    /// Instruction fetches are allowed.
    pub executable: bool,
    /// User-mode accessible.
    pub user: bool,
    /// Accesses go through the cache hierarchy.
    pub cached: bool,
    /// Memory type of the page.
    pub memtype: MemType,
    /// A store has touched the page.
    pub dirty: bool,
    /// A translation has touched the page.
    pub accessed: bool,
}

/// Attributes supplied when mapping or reshaping a page.
///
/// `cached` left as `None` resolves from the memory type: normal pages
/// cache, device and write-combining pages do not.
#[derive(Clone, Copy, Debug)]
pub struct PageAttrs {
    /// Stores are allowed.
    pub writable: bool,
    /// Instruction fetches are allowed.
    pub executable: bool,
    /// User-mode accessible.
    pub user: bool,
    /// Explicit cacheability override.
    pub cached: Option<bool>,
    /// Memory type of the page.
    pub memtype: MemType,
}

impl Default for PageAttrs {
    fn default() -> Self {
        Self {
            writable: true,
            executable: false,
            user: false,
            cached: None,
            memtype: MemType::Normal,
        }
    }
}

impl PageAttrs {
    /// Resolves the effective cacheability for these attributes.
    fn effective_cached(&self) -> bool {
        match self.cached {
            Some(cached) => cached,
            None => self.memtype == MemType::Normal,
        }
    }
}

/// Monotonic MMU counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MmuStats {
    /// TLB lookups that hit.
    pub tlb_hits: u64,
    /// TLB lookups that missed.
    pub tlb_misses: u64,
    /// Translations that faulted.
    pub page_faults: u64,
}

/// Memory management unit with per-ASID page tables and an LRU TLB.
#[derive(Debug)]
pub struct Mmu {
    page_size: u64,
    page_shift: u32,
    asid: u16,
    tables: HashMap<u16, HashMap<u64, Pte>>,
    tlb: Tlb,
    next_frame: u64,
    free_frames: Vec<u64>,
    max_frames: u64,
    stats: MmuStats,
}

impl Mmu {
    /// Creates an MMU from its configuration.
    ///
    /// # Returns
    ///
    /// `BadConfig` when the page size is not a power of two or the TLB has
    /// no capacity.
    pub fn new(config: &MmuConfig) -> MemResult<Self> {
        if !config.page_size.is_power_of_two() {
            return Err(MemError::BadConfig(format!(
                "page size must be a power of two, got {}",
                config.page_size
            )));
        }
        if config.tlb_entries == 0 {
            return Err(MemError::BadConfig("tlb_entries must be at least 1".into()));
        }
        let mut tables = HashMap::new();
        tables.insert(0, HashMap::new());
        Ok(Self {
            page_size: config.page_size,
            page_shift: config.page_size.trailing_zeros(),
            asid: 0,
            tables,
            tlb: Tlb::new(config.tlb_entries),
            next_frame: 0,
            free_frames: Vec::new(),
            max_frames: config.max_frames,
            stats: MmuStats::default(),
        })
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// log2 of the page size.
    pub fn page_shift(&self) -> u32 {
        self.page_shift
    }

    /// Currently active address space.
    pub fn current_asid(&self) -> u16 {
        self.asid
    }

    /// Snapshot of the MMU counters.
    pub fn stats(&self) -> MmuStats {
        self.stats
    }

    /// Number of live TLB entries (test hook).
    pub fn tlb_len(&self) -> usize {
        self.tlb.len()
    }

    /// Switches the active address space, creating its table on first use.
    pub fn set_asid(&mut self, asid: u16) {
        self.asid = asid;
        self.tables.entry(asid).or_default();
    }

    fn resolve_asid(&self, asid: Option<u16>) -> u16 {
        asid.unwrap_or(self.asid)
    }

    fn alloc_frame(&mut self) -> MemResult<u64> {
        if let Some(frame) = self.free_frames.pop() {
            return Ok(frame);
        }
        if self.next_frame >= self.max_frames {
            return Err(MemError::OutOfFrames);
        }
        let frame = self.next_frame;
        self.next_frame += 1;
        Ok(frame)
    }

    /// Maps `vpn` to a frame with the given attributes.
    ///
    /// # Arguments
    ///
    /// * `vpn` - Virtual page number.
    /// * `frame` - Physical frame, or `None` to allocate from the pool.
    /// * `attrs` - Page attributes; cacheability resolves from the memory
    ///   type unless overridden.
    /// * `asid` - Address space, defaulting to the current one.
    ///
    /// # Returns
    ///
    /// The frame the page now maps to, or `OutOfFrames` when the pool is
    /// exhausted.
    pub fn map_page(
        &mut self,
        vpn: u64,
        frame: Option<u64>,
        attrs: PageAttrs,
        asid: Option<u16>,
    ) -> MemResult<u64> {
        let asid = self.resolve_asid(asid);
        let frame = match frame {
            Some(frame) => frame,
            None => self.alloc_frame()?,
        };
        let pte = Pte {
            frame,
            present: true,
            writable: attrs.writable,
            executable: attrs.executable,
            user: attrs.user,
            cached: attrs.effective_cached(),
            memtype: attrs.memtype,
            dirty: false,
            accessed: false,
        };
        self.tables.entry(asid).or_default().insert(vpn, pte);
        self.tlb.invalidate(asid, vpn);
        Ok(frame)
    }

    /// Removes the mapping for `vpn`.
    ///
    /// Pool-allocated frames return to the free list.
    ///
    /// # Returns
    ///
    /// `PageFault` when the page was not mapped.
    pub fn unmap_page(&mut self, vpn: u64, asid: Option<u16>) -> MemResult<()> {
        let asid = self.resolve_asid(asid);
        let removed = self
            .tables
            .get_mut(&asid)
            .and_then(|table| table.remove(&vpn));
        match removed {
            Some(pte) => {
                if pte.frame < self.next_frame {
                    self.free_frames.push(pte.frame);
                }
                self.tlb.invalidate(asid, vpn);
                Ok(())
            }
            None => Err(MemError::PageFault {
                asid,
                va: vpn << self.page_shift,
            }),
        }
    }

    /// Translates a virtual address in the current address space.
    ///
    /// A TLB hit restamps the entry; a miss walks the page table, installs
    /// the translation (evicting the least-recent entry when full), and
    /// marks the page accessed.
    ///
    /// # Returns
    ///
    /// `(physical_address, pte)`, or `PageFault` when no present mapping
    /// exists.
    pub fn translate(&mut self, va: u64) -> MemResult<(u64, Pte)> {
        let vpn = va >> self.page_shift;
        let offset = va & (self.page_size - 1);
        let asid = self.asid;

        if self.tlb.lookup(asid, vpn).is_some() {
            self.stats.tlb_hits += 1;
        } else {
            self.stats.tlb_misses += 1;
            let present = self
                .tables
                .get(&asid)
                .and_then(|table| table.get(&vpn))
                .map(|pte| pte.present)
                .unwrap_or(false);
            if !present {
                self.stats.page_faults += 1;
                return Err(MemError::PageFault { asid, va });
            }
            let frame = self.tables[&asid][&vpn].frame;
            self.tlb.insert(asid, vpn, frame);
        }

        let pte = self
            .tables
            .get_mut(&asid)
            .and_then(|table| table.get_mut(&vpn))
            .ok_or(MemError::PageFault { asid, va })?;
        pte.accessed = true;
        let pte = *pte;
        Ok(((pte.frame << self.page_shift) | offset, pte))
    }

    /// Translates and checks permissions for the given access kind.
    ///
    /// # Returns
    ///
    /// `PermissionDenied` for a store to a read-only page or a fetch from a
    /// non-executable page.
    pub fn check_access(&mut self, va: u64, kind: AccessKind) -> MemResult<(u64, Pte)> {
        let (pa, pte) = self.translate(va)?;
        match kind {
            AccessKind::Read => {}
            AccessKind::Write => {
                if !pte.writable {
                    return Err(MemError::PermissionDenied { va, access: kind });
                }
            }
            AccessKind::Fetch => {
                if !pte.executable {
                    return Err(MemError::PermissionDenied { va, access: kind });
                }
            }
        }
        Ok((pa, pte))
    }

    /// Reshapes an existing mapping.
    ///
    /// The page's TLB entry is invalidated so the next translation observes
    /// the new attributes.
    pub fn set_page_attributes(
        &mut self,
        vpn: u64,
        attrs: PageAttrs,
        asid: Option<u16>,
    ) -> MemResult<()> {
        let asid = self.resolve_asid(asid);
        let page_shift = self.page_shift;
        let pte = self
            .tables
            .get_mut(&asid)
            .and_then(|table| table.get_mut(&vpn))
            .ok_or(MemError::PageFault {
                asid,
                va: vpn << page_shift,
            })?;
        pte.writable = attrs.writable;
        pte.executable = attrs.executable;
        pte.user = attrs.user;
        pte.memtype = attrs.memtype;
        pte.cached = attrs.effective_cached();
        self.tlb.invalidate(asid, vpn);
        Ok(())
    }

    /// Marks the page containing `vpn` dirty in the current address space.
    pub fn set_dirty(&mut self, vpn: u64) {
        if let Some(pte) = self
            .tables
            .get_mut(&self.asid)
            .and_then(|table| table.get_mut(&vpn))
        {
            pte.dirty = true;
        }
    }

    /// Returns a copy of the PTE for `vpn`, if mapped.
    pub fn pte(&self, vpn: u64, asid: Option<u16>) -> Option<Pte> {
        let asid = self.resolve_asid(asid);
        self.tables
            .get(&asid)
            .and_then(|table| table.get(&vpn))
            .copied()
    }

    /// Flushes the whole TLB, or only one address space's entries.
    pub fn flush_tlb(&mut self, asid: Option<u16>) {
        self.tlb.flush(asid);
    }

    /// Flushes a single TLB entry.
    pub fn flush_tlb_entry(&mut self, vpn: u64, asid: Option<u16>) {
        let asid = self.resolve_asid(asid);
        self.tlb.invalidate(asid, vpn);
    }
}
