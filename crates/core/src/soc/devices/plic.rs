//! Platform-level interrupt controller.
//!
//! Arbitrates external interrupt lines and distributes them to contexts,
//! each with its own enable set, threshold, and claim/complete pair. It
//! supports two register layouts and two pending-bit semantics:
//!
//! * `level` mode mirrors the line into the pending bit.
//! * `latched` mode latches pending on a low-to-high transition; complete
//!   re-latches it while the line is still high.
//!
//! # Memory Map (compact / canonical)
//!
//! * `0x000 + 4*(id-1)`: source `id` priority
//! * `0x100 / 0x1000`: pending bits 1..32
//! * `0x104 / 0x1004`: pending bits 33..64
//! * `CTX + ctx*STRIDE + 0`: context enable bits 1..32
//! * `CTX + ctx*STRIDE + 4`: context enable bits 33..64
//! * `CTX + ctx*STRIDE + 8`: context threshold
//! * `CTX + ctx*STRIDE + 12`: context claim/complete
//!
//! compact: `CTX = 0x180`, `STRIDE = 0x20`; canonical: `CTX = 0x2000`,
//! `STRIDE = 0x1000`. All registers are 32-bit little-endian.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::common::{MemError, MemResult};
use crate::config::{PlicConfig, PlicLayout, PlicMode};
use crate::soc::devices::{Device, DeviceCaps};

/// Pending registers relative to the priority block (compact layout).
const COMPACT_PENDING_BASE: u64 = 0x100;
/// Context block base (compact layout).
const COMPACT_CTX_BASE: u64 = 0x180;
/// Per-context stride (compact layout).
const COMPACT_CTX_STRIDE: u64 = 0x20;

/// Pending registers relative to the priority block (canonical layout).
const CANONICAL_PENDING_BASE: u64 = 0x1000;
/// Context block base (canonical layout).
const CANONICAL_CTX_BASE: u64 = 0x2000;
/// Per-context stride (canonical layout).
const CANONICAL_CTX_STRIDE: u64 = 0x1000;

/// Platform-level interrupt controller state.
pub struct Plic {
    base: u64,
    sources: usize,
    contexts: usize,
    layout: PlicLayout,
    mode: PlicMode,
    /// Per-source priority, indexed by source id (slot 0 unused).
    priority: Vec<u32>,
    /// Device-driven line level, indexed by source id (slot 0 unused).
    line_high: Vec<bool>,
    /// Pending bitmap; bit `id - 1` tracks source `id`.
    pending: u64,
    /// Per-context enable bitmap.
    enable: Vec<u64>,
    /// Per-context priority threshold.
    threshold: Vec<u32>,
    claims_served: u64,
}

impl Plic {
    /// Creates a PLIC from its configuration.
    ///
    /// # Returns
    ///
    /// `BadConfig` when `sources` is outside 1..=64 or `contexts` outside 1..=8.
    pub fn new(config: &PlicConfig) -> MemResult<Self> {
        if !(1..=64).contains(&config.sources) {
            return Err(MemError::BadConfig(format!(
                "plic sources must be in 1..=64, got {}",
                config.sources
            )));
        }
        if !(1..=8).contains(&config.contexts) {
            return Err(MemError::BadConfig(format!(
                "plic contexts must be in 1..=8, got {}",
                config.contexts
            )));
        }
        Ok(Self {
            base: config.base,
            sources: config.sources,
            contexts: config.contexts,
            layout: config.layout,
            mode: config.mode,
            priority: vec![0; config.sources + 1],
            line_high: vec![false; config.sources + 1],
            pending: 0,
            enable: vec![0; config.contexts],
            threshold: vec![0; config.contexts],
            claims_served: 0,
        })
    }

    /// Bitmap bit for a source id (1-based ids pack from bit 0).
    #[inline]
    fn bit(id: usize) -> u64 {
        1u64 << (id - 1)
    }

    fn ctx_base(&self) -> u64 {
        match self.layout {
            PlicLayout::Compact => COMPACT_CTX_BASE,
            PlicLayout::Canonical => CANONICAL_CTX_BASE,
        }
    }

    fn ctx_stride(&self) -> u64 {
        match self.layout {
            PlicLayout::Compact => COMPACT_CTX_STRIDE,
            PlicLayout::Canonical => CANONICAL_CTX_STRIDE,
        }
    }

    fn pending_base(&self) -> u64 {
        match self.layout {
            PlicLayout::Compact => COMPACT_PENDING_BASE,
            PlicLayout::Canonical => CANONICAL_PENDING_BASE,
        }
    }

    /// Offset of the claim/complete register for a context.
    pub fn claim_offset(&self, ctx: usize) -> u64 {
        self.ctx_base() + ctx as u64 * self.ctx_stride() + 12
    }

    /// Number of configured contexts.
    pub fn contexts(&self) -> usize {
        self.contexts
    }

    /// Number of claims served so far.
    pub fn claims_served(&self) -> u64 {
        self.claims_served
    }

    /// Drives the interrupt line of `id` high.
    ///
    /// In level mode the pending bit mirrors the line. In latched mode a
    /// low-to-high transition latches the pending bit.
    pub fn raise(&mut self, id: u32) {
        let id = id as usize;
        if id == 0 || id > self.sources {
            return;
        }
        match self.mode {
            PlicMode::Level => {
                self.line_high[id] = true;
                self.pending |= Self::bit(id);
            }
            PlicMode::Latched => {
                if !self.line_high[id] {
                    self.pending |= Self::bit(id);
                }
                self.line_high[id] = true;
            }
        }
    }

    /// Drives the interrupt line of `id` low.
    ///
    /// In level mode this also clears the pending bit; in latched mode the
    /// latch survives until claimed.
    pub fn lower(&mut self, id: u32) {
        let id = id as usize;
        if id == 0 || id > self.sources {
            return;
        }
        self.line_high[id] = false;
        if self.mode == PlicMode::Level {
            self.pending &= !Self::bit(id);
        }
    }

    /// Returns the source the next claim for `ctx` would deliver, or 0.
    ///
    /// The winner is the pending, enabled source with the highest priority
    /// strictly above the context threshold (and above zero); ties break to
    /// the lowest source id.
    fn best_candidate(&self, ctx: usize) -> u32 {
        let mut best_id = 0u32;
        let mut best_prio = self.threshold[ctx];
        for id in 1..=self.sources {
            let bit = Self::bit(id);
            if self.pending & bit == 0 || self.enable[ctx] & bit == 0 {
                continue;
            }
            let prio = self.priority[id];
            if prio > best_prio && prio > 0 {
                best_prio = prio;
                best_id = id as u32;
            }
        }
        best_id
    }

    /// Claims the highest-priority pending source for `ctx`.
    ///
    /// # Returns
    ///
    /// The claimed source id, or 0 when nothing qualifies. In latched mode
    /// a successful claim clears the source's pending bit.
    pub fn claim(&mut self, ctx: usize) -> u32 {
        if ctx >= self.contexts {
            return 0;
        }
        let id = self.best_candidate(ctx);
        if id != 0 {
            self.claims_served += 1;
            if self.mode == PlicMode::Latched {
                self.pending &= !Self::bit(id as usize);
            }
        }
        id
    }

    /// Acknowledges completion of source `id` for `ctx`.
    ///
    /// In latched mode the pending bit is re-latched if the line is still
    /// high; in level mode pending already tracks the line, so this is a
    /// no-op.
    pub fn complete(&mut self, ctx: usize, id: u32) {
        let id = id as usize;
        if ctx >= self.contexts || id == 0 || id > self.sources {
            return;
        }
        if self.mode == PlicMode::Latched && self.line_high[id] {
            self.pending |= Self::bit(id);
        }
    }

    /// Returns whether a claim for `ctx` would deliver a non-zero source.
    pub fn get_context_irq(&self, ctx: usize) -> bool {
        ctx < self.contexts && self.best_candidate(ctx) != 0
    }

    fn read_reg(&mut self, offset: u64) -> u32 {
        let pend = self.pending_base();
        if offset < pend {
            let id = (offset / 4) as usize + 1;
            if id <= self.sources {
                return self.priority[id];
            }
            return 0;
        }
        if offset == pend {
            return self.pending as u32;
        }
        if offset == pend + 4 {
            return (self.pending >> 32) as u32;
        }
        let ctx_base = self.ctx_base();
        if offset >= ctx_base {
            let ctx = ((offset - ctx_base) / self.ctx_stride()) as usize;
            let reg = (offset - ctx_base) % self.ctx_stride();
            if ctx < self.contexts {
                match reg {
                    0 => return self.enable[ctx] as u32,
                    4 => return (self.enable[ctx] >> 32) as u32,
                    8 => return self.threshold[ctx],
                    12 => return self.claim(ctx),
                    _ => {}
                }
            }
        }
        0
    }

    fn write_reg(&mut self, offset: u64, val: u32) {
        let pend = self.pending_base();
        if offset < pend {
            let id = (offset / 4) as usize + 1;
            if id <= self.sources {
                self.priority[id] = val;
            }
            return;
        }
        let ctx_base = self.ctx_base();
        if offset >= ctx_base {
            let ctx = ((offset - ctx_base) / self.ctx_stride()) as usize;
            let reg = (offset - ctx_base) % self.ctx_stride();
            if ctx < self.contexts {
                match reg {
                    0 => {
                        self.enable[ctx] =
                            (self.enable[ctx] & 0xFFFF_FFFF_0000_0000) | val as u64;
                    }
                    4 => {
                        self.enable[ctx] =
                            (self.enable[ctx] & 0x0000_0000_FFFF_FFFF) | ((val as u64) << 32);
                    }
                    8 => self.threshold[ctx] = val,
                    12 => self.complete(ctx, val),
                    _ => {}
                }
            }
        }
    }
}

impl Device for Plic {
    fn name(&self) -> &str {
        "plic"
    }

    fn region(&self) -> (u64, u64) {
        (
            self.base,
            self.ctx_base() + self.contexts as u64 * self.ctx_stride(),
        )
    }

    fn caps(&self) -> DeviceCaps {
        DeviceCaps {
            align: 4,
            widths: Some(vec![4]),
        }
    }

    fn read(&mut self, offset: u64, count: usize) -> MemResult<Vec<u8>> {
        if count != 4 || offset % 4 != 0 {
            return Err(MemError::MmioConstraint {
                name: "plic".to_string(),
                addr: offset,
                len: count,
            });
        }
        Ok(self.read_reg(offset).to_le_bytes().to_vec())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> MemResult<()> {
        if data.len() != 4 || offset % 4 != 0 {
            return Err(MemError::MmioConstraint {
                name: "plic".to_string(),
                addr: offset,
                len: data.len(),
            });
        }
        let val = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        self.write_reg(offset, val);
        Ok(())
    }
}

/// Interrupt sink handed to devices that can raise external interrupts.
///
/// Holds a weak reference back to the controller plus the source id, so
/// device and controller never own each other.
#[derive(Clone)]
pub struct IrqLine {
    plic: Weak<RefCell<Plic>>,
    source: u32,
}

impl IrqLine {
    /// Creates a sink for `source` pointing at the given controller.
    pub fn new(plic: &Rc<RefCell<Plic>>, source: u32) -> Self {
        Self {
            plic: Rc::downgrade(plic),
            source,
        }
    }

    /// The source id this sink drives.
    pub fn source(&self) -> u32 {
        self.source
    }

    /// Drives the line high.
    pub fn raise(&self) {
        if let Some(plic) = self.plic.upgrade() {
            plic.borrow_mut().raise(self.source);
        }
    }

    /// Drives the line low.
    pub fn lower(&self) {
        if let Some(plic) = self.plic.upgrade() {
            plic.borrow_mut().lower(self.source);
        }
    }
}
