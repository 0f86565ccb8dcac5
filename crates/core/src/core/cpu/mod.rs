//! CPU front-end.
//!
//! Typed loads, stores, and fetches over virtual addresses. Every access
//! translates through the MMU and is then routed by the page's memory
//! type: normal cached pages go through the cache hierarchy, device pages
//! bypass it with barrier ordering, and write-combining pages post into
//! the coalescing buffer. The front-end also hosts the machine-mode CSR
//! block and aggregates interrupt lines from an attached PLIC context and
//! CLINT hart.

/// Machine-mode CSR block.
pub mod csr;
/// Write-combining buffer.
pub mod wc;

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::{pack_int, unpack_int, AccessKind, Endianness, MemResult};
use crate::config::{Config, PrefetchTarget};
use crate::core::units::cache::{CacheController, Level};
use crate::core::units::mmu::{MemType, Mmu, PageAttrs};
use crate::soc::bus::Bus;
use crate::soc::devices::{Clint, Plic};

use self::csr::Csr;
use self::wc::WriteCombining;

/// Properties of the simulated target ISA.
#[derive(Clone, Copy, Debug)]
pub struct Target {
    /// Byte order used by integer packers.
    pub endian: Endianness,
    /// Register width in bits.
    pub xlen: u32,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            endian: Endianness::Little,
            xlen: 64,
        }
    }
}

/// Next-line prefetch policy.
#[derive(Clone, Copy, Debug)]
pub struct PrefetchPolicy {
    /// Whether cached accesses trigger a next-line prefetch.
    pub enable: bool,
    /// Level the prefetched line lands in.
    pub to: Level,
}

struct PlicAttachment {
    dev: Rc<RefCell<Plic>>,
    base: u64,
    ctx: usize,
}

struct ClintAttachment {
    dev: Rc<RefCell<Clint>>,
    hart: usize,
}

/// CPU front-end over the MMU, cache hierarchy, and bus.
pub struct Cpu {
    target: Target,
    bus: Rc<Bus>,
    mmu: Mmu,
    cache: CacheController,
    prefetch: PrefetchPolicy,
    wc: WriteCombining,
    plic: Option<PlicAttachment>,
    clint: Option<ClintAttachment>,
    /// Machine-mode CSR block.
    pub csr: Csr,
    traps_taken: u64,
}

impl Cpu {
    /// Builds a CPU front-end over the given bus.
    pub fn new(bus: Rc<Bus>, config: &Config) -> MemResult<Self> {
        let mmu = Mmu::new(&config.mmu)?;
        let cache = CacheController::new(&config.cache, bus.clone())?;
        let line_size = cache.line_size(Level::L1d);
        let to = match config.prefetch.to {
            PrefetchTarget::L1d => Level::L1d,
            PrefetchTarget::L2 => Level::L2,
            PrefetchTarget::L3 => Level::L3,
        };
        Ok(Self {
            target: Target {
                endian: config.system.endianness,
                xlen: 64,
            },
            bus,
            mmu,
            cache,
            prefetch: PrefetchPolicy {
                enable: config.prefetch.enable,
                to,
            },
            wc: WriteCombining::new(line_size),
            plic: None,
            clint: None,
            csr: Csr::default(),
            traps_taken: 0,
        })
    }

    /// The target description.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Shared view of the MMU.
    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    /// Mutable view of the MMU.
    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    /// Shared view of the cache hierarchy.
    pub fn cache(&self) -> &CacheController {
        &self.cache
    }

    /// Mutable view of the cache hierarchy.
    pub fn cache_mut(&mut self) -> &mut CacheController {
        &mut self.cache
    }

    /// Number of interrupts taken so far.
    pub fn traps_taken(&self) -> u64 {
        self.traps_taken
    }

    /// Pending write-combining burst as `(base, length)`, if any.
    pub fn wc_pending(&self) -> Option<(u64, usize)> {
        self.wc.pending().map(|(base, bytes)| (base, bytes.len()))
    }

    // ── Paging and maintenance ────────────────────────────────

    /// Switches the active address space, creating its table on first use.
    pub fn set_asid(&mut self, asid: u16) {
        self.mmu.set_asid(asid);
    }

    /// Maps a virtual page; see [`Mmu::map_page`].
    pub fn map_page(
        &mut self,
        vpn: u64,
        frame: Option<u64>,
        attrs: PageAttrs,
        asid: Option<u16>,
    ) -> MemResult<u64> {
        self.mmu.map_page(vpn, frame, attrs, asid)
    }

    /// Unmaps a virtual page; see [`Mmu::unmap_page`].
    pub fn unmap_page(&mut self, vpn: u64, asid: Option<u16>) -> MemResult<()> {
        self.mmu.unmap_page(vpn, asid)
    }

    /// Reshapes a mapping; see [`Mmu::set_page_attributes`].
    pub fn set_page_attributes(
        &mut self,
        vpn: u64,
        attrs: PageAttrs,
        asid: Option<u16>,
    ) -> MemResult<()> {
        self.mmu.set_page_attributes(vpn, attrs, asid)
    }

    /// Flushes the TLB, or one address space's entries.
    pub fn flush_tlb(&mut self, asid: Option<u16>) {
        self.mmu.flush_tlb(asid);
    }

    /// Flushes the instruction cache.
    pub fn flush_icache(&mut self) -> MemResult<()> {
        self.cache.flush_all(Level::L1i)
    }

    /// Flushes the data cache.
    pub fn flush_dcache(&mut self) -> MemResult<()> {
        self.cache.flush_all(Level::L1d)
    }

    /// Flushes the unified L2.
    pub fn flush_l2(&mut self) -> MemResult<()> {
        self.cache.flush_all(Level::L2)
    }

    /// Flushes the last-level cache.
    pub fn flush_l3(&mut self) -> MemResult<()> {
        self.cache.flush_all(Level::L3)
    }

    /// Prefetches the data line covering `va` into the L1 data cache.
    pub fn prefetch_data(&mut self, va: u64) -> MemResult<()> {
        let (pa, _) = self.mmu.check_access(va, AccessKind::Read)?;
        self.cache.prefetch_line(Level::L1d, pa)
    }

    /// Prefetches the instruction line covering `va` into the L1 instruction cache.
    pub fn prefetch_inst(&mut self, va: u64) -> MemResult<()> {
        let (pa, _) = self.mmu.check_access(va, AccessKind::Fetch)?;
        self.cache.prefetch_line(Level::L1i, pa)
    }

    /// Flushes the write-combining buffer to the bus.
    ///
    /// The only ordering primitive the front-end offers; device stores run
    /// it implicitly.
    pub fn memory_barrier(&mut self) -> MemResult<()> {
        if let Some((base, bytes)) = self.wc.take() {
            self.bus.write_bytes(base, &bytes)?;
        }
        Ok(())
    }

    // ── Typed memory operations ───────────────────────────────

    /// Fetches `size` bytes of instruction stream at `va`.
    ///
    /// Requires execute permission; normal cached pages read through the
    /// instruction cache, everything else bypasses to the bus.
    pub fn fetch(&mut self, va: u64, size: usize) -> MemResult<u64> {
        let bytes = self.read_virtual(va, size, AccessKind::Fetch)?;
        Ok(unpack_int(&bytes, false, self.target.endian))
    }

    /// Loads an integer of `size` bytes at `va`.
    pub fn load(&mut self, va: u64, size: usize, signed: bool) -> MemResult<u64> {
        let bytes = self.read_virtual(va, size, AccessKind::Read)?;
        Ok(unpack_int(&bytes, signed, self.target.endian))
    }

    /// Stores an integer of `size` bytes at `va`.
    ///
    /// Routing by memory type: device stores barrier then go to the bus,
    /// write-combining stores post into the coalescing buffer, normal
    /// stores go through the cache (write-allocate) or straight to the bus
    /// when uncached, marking the page dirty.
    pub fn store(&mut self, va: u64, size: usize, value: u64, _signed: bool) -> MemResult<()> {
        let bytes = pack_int(value, size, self.target.endian);
        let page_size = self.mmu.page_size();
        let mut addr = va;
        let mut rest: &[u8] = &bytes;
        while !rest.is_empty() {
            let page_end = (addr | (page_size - 1)) + 1;
            let chunk = rest.len().min((page_end - addr) as usize);
            let (pa, pte) = self.mmu.check_access(addr, AccessKind::Write)?;
            match pte.memtype {
                MemType::Device => {
                    self.memory_barrier()?;
                    self.bus.write_bytes(pa, &rest[..chunk])?;
                }
                MemType::Wc => {
                    if let Some((base, burst)) = self.wc.push(pa, &rest[..chunk]) {
                        self.bus.write_bytes(base, &burst)?;
                    }
                }
                MemType::Normal => {
                    if pte.cached {
                        self.cache.write_bytes(pa, &rest[..chunk], Level::L1d)?;
                        self.maybe_prefetch_next(pa, Level::L1d)?;
                    } else {
                        self.bus.write_bytes(pa, &rest[..chunk])?;
                    }
                    self.mmu.set_dirty(addr >> self.mmu.page_shift());
                }
            }
            addr += chunk as u64;
            rest = &rest[chunk..];
        }
        Ok(())
    }

    /// Reads bytes at `va`, splitting at page boundaries and routing each
    /// piece by its page's memory type.
    fn read_virtual(&mut self, va: u64, size: usize, kind: AccessKind) -> MemResult<Vec<u8>> {
        let page_size = self.mmu.page_size();
        let which = if kind == AccessKind::Fetch {
            Level::L1i
        } else {
            Level::L1d
        };
        let mut out = Vec::with_capacity(size);
        let mut addr = va;
        let mut remaining = size;
        while remaining > 0 {
            let page_end = (addr | (page_size - 1)) + 1;
            let chunk = remaining.min((page_end - addr) as usize);
            let (pa, pte) = self.mmu.check_access(addr, kind)?;
            if pte.memtype == MemType::Normal && pte.cached {
                let bytes = self.cached_read(pa, chunk, which)?;
                out.extend_from_slice(&bytes);
                self.maybe_prefetch_next(pa, which)?;
            } else {
                let bytes = self.bus.read_bytes(pa, chunk)?;
                out.extend_from_slice(&bytes);
            }
            addr += chunk as u64;
            remaining -= chunk;
        }
        Ok(out)
    }

    /// Reads bytes through an L1, one line at a time.
    fn cached_read(&mut self, pa: u64, len: usize, which: Level) -> MemResult<Vec<u8>> {
        let line_size = self.cache.line_size(which);
        let mut out = Vec::with_capacity(len);
        let mut addr = pa;
        let mut remaining = len;
        while remaining > 0 {
            let block = addr - addr % line_size;
            let span = (block + line_size - addr) as usize;
            let chunk = remaining.min(span);
            let line = self.cache.read(addr, which)?;
            let off = (addr - block) as usize;
            out.extend_from_slice(&line[off..off + chunk]);
            addr += chunk as u64;
            remaining -= chunk;
        }
        Ok(out)
    }

    /// Prefetches the next line after `pa` unless it crosses a page boundary.
    fn maybe_prefetch_next(&mut self, pa: u64, which: Level) -> MemResult<()> {
        if !self.prefetch.enable {
            return Ok(());
        }
        let line_size = self.cache.line_size(which);
        let next_pa = (pa - pa % line_size) + line_size;
        let page_size = self.mmu.page_size();
        if next_pa / page_size == pa / page_size {
            self.cache.prefetch_line(self.prefetch.to, next_pa)?;
        }
        Ok(())
    }

    // ── Interrupt aggregation ─────────────────────────────────

    /// Attaches a PLIC context for MEIP sampling and claim/complete polling.
    ///
    /// # Arguments
    ///
    /// * `dev` - The controller.
    /// * `base` - Its bus base address (claims go through memory operations).
    /// * `ctx` - The context this CPU drains.
    pub fn attach_plic(&mut self, dev: Rc<RefCell<Plic>>, base: u64, ctx: usize) {
        self.plic = Some(PlicAttachment { dev, base, ctx });
    }

    /// Attaches a CLINT hart for MSIP/MTIP sampling.
    pub fn attach_clint(&mut self, dev: Rc<RefCell<Clint>>, hart: usize) {
        self.clint = Some(ClintAttachment { dev, hart });
    }

    /// Polls attached controllers into the CSR pending bits.
    pub fn sample_irqs(&mut self) {
        if let Some(att) = &self.clint {
            let (msip, mtip) = att.dev.borrow().get_irq_levels(att.hart);
            self.csr.msip = msip;
            self.csr.mtip = mtip;
        }
        if let Some(att) = &self.plic {
            self.csr.meip = att.dev.borrow().get_context_irq(att.ctx);
        }
    }

    /// Takes the highest-priority deliverable interrupt, if any.
    ///
    /// # Returns
    ///
    /// The cause code entered into `mcause`, or `None` when nothing is
    /// deliverable.
    pub fn maybe_take_interrupt(&mut self) -> Option<u64> {
        let cause = self.csr.should_take_interrupt()?;
        self.csr.trap_enter(cause, true);
        self.traps_taken += 1;
        Some(cause)
    }

    /// Returns from the current trap.
    pub fn complete_trap(&mut self) {
        self.csr.mret();
    }

    /// Claims, services, and completes one external interrupt.
    ///
    /// Reads the context's claim register through 4-byte bus operations
    /// (barriered, like any device access). A non-zero claim invokes the
    /// handler, whose errors are swallowed so a faulty service routine
    /// cannot take the simulator down, then writes the id back to
    /// complete.
    ///
    /// # Returns
    ///
    /// The claimed source id, or 0 when nothing was pending.
    pub fn poll_interrupts(
        &mut self,
        ctx: usize,
        mut handler: Option<&mut dyn FnMut(u32) -> MemResult<()>>,
    ) -> MemResult<u32> {
        let claim_addr = match &self.plic {
            Some(att) => att.base + att.dev.borrow().claim_offset(ctx),
            None => return Ok(0),
        };
        self.memory_barrier()?;
        let bytes = self.bus.read_bytes(claim_addr, 4)?;
        let id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if id != 0 {
            if let Some(handler) = handler.as_mut() {
                let _ = handler(id);
            }
            self.bus.write_bytes(claim_addr, &id.to_le_bytes())?;
        }
        Ok(id)
    }
}
