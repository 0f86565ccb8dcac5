//! Programmable compare timer.
//!
//! A 64-bit up-counter with a compare register, pending flag, and interrupt
//! line.
//!
//! # Memory Map
//!
//! * `0x00` CNT_LO / `0x04` CNT_HI: counter (64-bit)
//! * `0x08` CMP_LO / `0x0C` CMP_HI: compare (64-bit)
//! * `0x10` CTRL: bit 0 enable, bit 1 IRQ enable, bit 2 auto-reload
//! * `0x14` STATUS: bit 0 pending, write-1-to-clear
//! * `0x18` TICK: counter increment per advance step
//!
//! All registers take aligned 4-byte accesses.

use crate::common::{MemError, MemResult};
use crate::config::TimerConfig;
use crate::soc::devices::plic::IrqLine;
use crate::soc::devices::{Device, DeviceCaps};

const REG_CNT_LO: u64 = 0x00;
const REG_CNT_HI: u64 = 0x04;
const REG_CMP_LO: u64 = 0x08;
const REG_CMP_HI: u64 = 0x0C;
const REG_CTRL: u64 = 0x10;
const REG_STATUS: u64 = 0x14;
const REG_TICK: u64 = 0x18;
const REGION_SIZE: u64 = 32;

/// Control bit: the counter advances.
pub const CTRL_ENABLE: u32 = 1 << 0;
/// Control bit: pending raises the interrupt line.
pub const CTRL_IRQ_EN: u32 = 1 << 1;
/// Control bit: the counter resets to zero on a compare match.
pub const CTRL_AUTO_RELOAD: u32 = 1 << 2;
/// Status bit: a compare match has occurred.
pub const STATUS_PENDING: u32 = 1 << 0;

/// Programmable compare timer.
pub struct Timer {
    base: u64,
    counter: u64,
    compare: u64,
    ctrl: u32,
    pending: bool,
    tick: u64,
    irq: Option<IrqLine>,
}

impl Timer {
    /// Creates a timer from its configuration.
    pub fn new(config: &TimerConfig) -> Self {
        Self {
            base: config.base,
            counter: 0,
            compare: 0,
            ctrl: 0,
            pending: false,
            tick: if config.tick == 0 { 1 } else { config.tick },
            irq: None,
        }
    }

    /// Attaches the interrupt sink.
    pub fn set_irq(&mut self, irq: IrqLine) {
        self.irq = Some(irq);
    }

    /// Whether a compare match is pending.
    pub fn pending(&self) -> bool {
        self.pending
    }

    /// Advances the timer by `n` steps.
    ///
    /// Each step adds `tick` to the counter while the timer is enabled;
    /// when the compare value is non-zero and reached, the pending flag is
    /// set and, with auto-reload, the counter restarts from zero.
    pub fn advance(&mut self, n: u64) {
        if self.ctrl & CTRL_ENABLE == 0 {
            return;
        }
        for _ in 0..n {
            self.counter = self.counter.wrapping_add(self.tick);
            if self.compare != 0 && self.counter >= self.compare {
                self.pending = true;
                if self.ctrl & CTRL_AUTO_RELOAD != 0 {
                    self.counter = 0;
                }
            }
        }
        self.update_irq();
    }

    fn update_irq(&mut self) {
        if let Some(irq) = &self.irq {
            if self.pending && self.ctrl & CTRL_IRQ_EN != 0 {
                irq.raise();
            } else {
                irq.lower();
            }
        }
    }

    fn constraint(&self, offset: u64, len: usize) -> MemError {
        MemError::MmioConstraint {
            name: "timer".to_string(),
            addr: offset,
            len,
        }
    }
}

impl Device for Timer {
    fn name(&self) -> &str {
        "timer"
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
            REG_CNT_LO => self.counter as u32,
            REG_CNT_HI => (self.counter >> 32) as u32,
            REG_CMP_LO => self.compare as u32,
            REG_CMP_HI => (self.compare >> 32) as u32,
            REG_CTRL => self.ctrl,
            REG_STATUS => {
                if self.pending {
                    STATUS_PENDING
                } else {
                    0
                }
            }
            REG_TICK => self.tick as u32,
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
            REG_CNT_LO => self.counter = (self.counter & 0xFFFF_FFFF_0000_0000) | val as u64,
            REG_CNT_HI => {
                self.counter = (self.counter & 0x0000_0000_FFFF_FFFF) | ((val as u64) << 32)
            }
            REG_CMP_LO => self.compare = (self.compare & 0xFFFF_FFFF_0000_0000) | val as u64,
            REG_CMP_HI => {
                self.compare = (self.compare & 0x0000_0000_FFFF_FFFF) | ((val as u64) << 32)
            }
            REG_CTRL => {
                self.ctrl = val;
                self.update_irq();
            }
            REG_STATUS => {
                if val & STATUS_PENDING != 0 {
                    self.pending = false;
                    self.update_irq();
                }
            }
            REG_TICK => self.tick = if val == 0 { 1 } else { val as u64 },
            _ => {}
        }
        Ok(())
    }
}
