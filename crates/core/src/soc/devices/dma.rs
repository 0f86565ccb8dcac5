//! DMA engine.
//!
//! A bus-mastering copy engine. Writing START to CTRL performs a
//! synchronous bus-to-bus copy in bounded chunks; the caller observes any
//! interrupt line changes immediately.
//!
//! # Memory Map
//!
//! * `0x00` SRC_LO / `0x04` SRC_HI: source physical address (64-bit)
//! * `0x08` DST_LO / `0x0C` DST_HI: destination physical address (64-bit)
//! * `0x10` LEN: transfer length in bytes
//! * `0x14` CTRL: bit 0 START, bit 1 IRQ enable
//! * `0x18` STATUS: bit 0 BUSY, bit 1 DONE, bit 2 ERR; DONE and ERR are
//!   write-1-to-clear
//!
//! All registers take aligned 4-byte accesses. The engine holds a weak bus
//! handle; the bus owns the device, never the reverse.

use std::rc::Weak;

use crate::common::{MemError, MemResult};
use crate::config::DmaConfig;
use crate::soc::bus::Bus;
use crate::soc::devices::plic::IrqLine;
use crate::soc::devices::{Device, DeviceCaps};

const REG_SRC_LO: u64 = 0x00;
const REG_SRC_HI: u64 = 0x04;
const REG_DST_LO: u64 = 0x08;
const REG_DST_HI: u64 = 0x0C;
const REG_LEN: u64 = 0x10;
const REG_CTRL: u64 = 0x14;
const REG_STATUS: u64 = 0x18;
const REGION_SIZE: u64 = 32;

/// Control bit: start the transfer.
pub const CTRL_START: u32 = 1 << 0;
/// Control bit: raise the interrupt line on completion.
pub const CTRL_IRQ_EN: u32 = 1 << 1;
/// Status bit: a transfer is in flight.
pub const STATUS_BUSY: u32 = 1 << 0;
/// Status bit: the last transfer completed.
pub const STATUS_DONE: u32 = 1 << 1;
/// Status bit: the last transfer failed.
pub const STATUS_ERR: u32 = 1 << 2;

/// Largest single bus transfer issued per chunk.
const CHUNK_BYTES: usize = 256;

/// Bus-mastering DMA copy engine.
pub struct Dma {
    base: u64,
    bus: Weak<Bus>,
    src: u64,
    dst: u64,
    len: u32,
    ctrl: u32,
    status: u32,
    ram_only: bool,
    irq: Option<IrqLine>,
}

impl Dma {
    /// Creates a DMA engine from its configuration and a weak bus handle.
    pub fn new(config: &DmaConfig, bus: Weak<Bus>) -> Self {
        Self {
            base: config.base,
            bus,
            src: 0,
            dst: 0,
            len: 0,
            ctrl: 0,
            status: 0,
            ram_only: config.ram_only,
            irq: None,
        }
    }

    /// Attaches the interrupt sink.
    pub fn set_irq(&mut self, irq: IrqLine) {
        self.irq = Some(irq);
    }

    /// Current STATUS register value.
    pub fn status(&self) -> u32 {
        self.status
    }

    fn ranges_overlap(a_base: u64, a_len: u64, b_base: u64, b_len: u64) -> bool {
        a_len != 0
            && b_len != 0
            && a_base < b_base.saturating_add(b_len)
            && b_base < a_base.saturating_add(a_len)
    }

    /// Runs the programmed transfer synchronously.
    fn kick(&mut self) {
        self.status &= !(STATUS_DONE | STATUS_ERR);
        let len = self.len as u64;
        if len == 0 {
            self.status |= STATUS_DONE;
            self.finish();
            return;
        }
        if self.src.checked_add(len).is_none() || self.dst.checked_add(len).is_none() {
            self.status |= STATUS_ERR;
            self.finish();
            return;
        }

        let Some(bus) = self.bus.upgrade() else {
            self.status |= STATUS_ERR;
            self.finish();
            return;
        };

        // A transfer touching our own registers would re-enter this device.
        if Self::ranges_overlap(self.src, len, self.base, REGION_SIZE)
            || Self::ranges_overlap(self.dst, len, self.base, REGION_SIZE)
        {
            self.status |= STATUS_ERR;
            self.finish();
            return;
        }

        if self.ram_only
            && !(bus.range_is_ram(self.src, len as usize) && bus.range_is_ram(self.dst, len as usize))
        {
            self.status |= STATUS_ERR;
            self.finish();
            return;
        }

        self.status |= STATUS_BUSY;
        let mut moved: u64 = 0;
        while moved < len {
            let chunk = ((len - moved) as usize).min(CHUNK_BYTES);
            let copied = bus
                .read_bytes(self.src + moved, chunk)
                .and_then(|bytes| bus.write_bytes(self.dst + moved, &bytes));
            if copied.is_err() {
                self.status |= STATUS_ERR;
                break;
            }
            moved += chunk as u64;
        }
        self.status &= !STATUS_BUSY;
        if self.status & STATUS_ERR == 0 {
            self.status |= STATUS_DONE;
        }
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(irq) = &self.irq {
            if self.ctrl & CTRL_IRQ_EN != 0 && self.status & STATUS_DONE != 0 {
                irq.raise();
            } else {
                irq.lower();
            }
        }
    }

    fn constraint(&self, offset: u64, len: usize) -> MemError {
        MemError::MmioConstraint {
            name: "dma".to_string(),
            addr: offset,
            len,
        }
    }
}

impl Device for Dma {
    fn name(&self) -> &str {
        "dma"
    }

    fn region(&self) -> (u64, u64) {
        (self.base, REGION_SIZE)
    }

    fn caps(&self) -> DeviceCaps {
        DeviceCaps {
            align: 4,
            widths: Some(vec![4]),
        }
    }

    fn read(&mut self, offset: u64, count: usize) -> MemResult<Vec<u8>> {
        if count != 4 || offset % 4 != 0 {
            return Err(self.constraint(offset, count));
        }
        let val: u32 = match offset {
            REG_SRC_LO => self.src as u32,
            REG_SRC_HI => (self.src >> 32) as u32,
            REG_DST_LO => self.dst as u32,
            REG_DST_HI => (self.dst >> 32) as u32,
            REG_LEN => self.len,
            REG_CTRL => self.ctrl,
            REG_STATUS => self.status,
            _ => 0,
        };
        Ok(val.to_le_bytes().to_vec())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> MemResult<()> {
        if data.len() != 4 || offset % 4 != 0 {
            return Err(self.constraint(offset, data.len()));
        }
        let val = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        match offset {
            REG_SRC_LO => self.src = (self.src & 0xFFFF_FFFF_0000_0000) | val as u64,
            REG_SRC_HI => self.src = (self.src & 0x0000_0000_FFFF_FFFF) | ((val as u64) << 32),
            REG_DST_LO => self.dst = (self.dst & 0xFFFF_FFFF_0000_0000) | val as u64,
            REG_DST_HI => self.dst = (self.dst & 0x0000_0000_FFFF_FFFF) | ((val as u64) << 32),
            REG_LEN => self.len = val,
            REG_CTRL => {
                self.ctrl = val;
                if val & CTRL_START != 0 {
                    self.kick();
                }
            }
            REG_STATUS => {
                self.status &= !(val & (STATUS_DONE | STATUS_ERR));
                self.finish();
            }
            _ => {}
        }
        Ok(())
    }
}
