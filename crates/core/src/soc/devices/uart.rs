//! Serial port device.
//!
//! A minimal UART with an RX FIFO, a transmit hook, and one interrupt line.
//!
//! # Memory Map
//!
//! * `0x00` DATA: read pops one RX byte (or 0 when empty); write transmits
//! * `0x04` STATUS: bit 0 TX ready (always set), bit 1 RX non-empty
//! * `0x08` CTRL: bit 0 enables the RX interrupt
//!
//! DATA takes 1-byte accesses only; STATUS and CTRL take aligned 4-byte
//! accesses only. The interrupt line is high exactly while the RX interrupt
//! is enabled and the FIFO is non-empty.

use std::collections::VecDeque;
use std::io::{self, Write};

use crate::common::{MemError, MemResult};
use crate::soc::devices::plic::IrqLine;
use crate::soc::devices::{Device, DeviceCaps};

/// Data register offset.
const REG_DATA: u64 = 0x00;
/// Status register offset.
const REG_STATUS: u64 = 0x04;
/// Control register offset.
const REG_CTRL: u64 = 0x08;
/// Region size in bytes.
const REGION_SIZE: u64 = 16;

/// Status bit: transmitter can accept a byte.
const STATUS_TX_READY: u32 = 1 << 0;
/// Status bit: RX FIFO holds at least one byte.
const STATUS_RX_AVAIL: u32 = 1 << 1;
/// Control bit: raise the interrupt line while RX data is available.
const CTRL_RX_IRQ_EN: u32 = 1 << 0;

/// Serial port with RX FIFO and interrupt line.
pub struct Uart {
    base: u64,
    rx: VecDeque<u8>,
    ctrl: u32,
    tx: Box<dyn FnMut(u8)>,
    irq: Option<IrqLine>,
}

impl Uart {
    /// Creates a UART transmitting to stdout.
    pub fn new(base: u64) -> Self {
        Self {
            base,
            rx: VecDeque::new(),
            ctrl: 0,
            tx: Box::new(|byte| {
                let _ = io::stdout().write_all(&[byte]);
                let _ = io::stdout().flush();
            }),
            irq: None,
        }
    }

    /// Replaces the transmit hook (tests capture output through this).
    pub fn set_tx(&mut self, tx: Box<dyn FnMut(u8)>) {
        self.tx = tx;
    }

    /// Attaches the interrupt sink.
    pub fn set_irq(&mut self, irq: IrqLine) {
        self.irq = Some(irq);
    }

    /// Host-side injection of a received byte.
    pub fn push_rx(&mut self, byte: u8) {
        self.rx.push_back(byte);
        self.update_irq();
    }

    /// Number of bytes waiting in the RX FIFO.
    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    fn update_irq(&mut self) {
        if let Some(irq) = &self.irq {
            if self.ctrl & CTRL_RX_IRQ_EN != 0 && !self.rx.is_empty() {
                irq.raise();
            } else {
                irq.lower();
            }
        }
    }

    fn constraint(&self, offset: u64, len: usize) -> MemError {
        MemError::MmioConstraint {
            name: "uart".to_string(),
            addr: offset,
            len,
        }
    }
}

impl Device for Uart {
    fn name(&self) -> &str {
        "uart"
    }

    fn region(&self) -> (u64, u64) {
        (self.base, REGION_SIZE)
    }

    fn caps(&self) -> DeviceCaps {
        DeviceCaps {
            align: 1,
            widths: Some(vec![1, 4]),
        }
    }

    fn read(&mut self, offset: u64, count: usize) -> MemResult<Vec<u8>> {
        match offset {
            REG_DATA => {
                if count != 1 {
                    return Err(self.constraint(offset, count));
                }
                let byte = self.rx.pop_front().unwrap_or(0);
                self.update_irq();
                Ok(vec![byte])
            }
            REG_STATUS => {
                if count != 4 {
                    return Err(self.constraint(offset, count));
                }
                let mut status = STATUS_TX_READY;
                if !self.rx.is_empty() {
                    status |= STATUS_RX_AVAIL;
                }
                Ok(status.to_le_bytes().to_vec())
            }
            REG_CTRL => {
                if count != 4 {
                    return Err(self.constraint(offset, count));
                }
                Ok(self.ctrl.to_le_bytes().to_vec())
            }
            _ => Err(self.constraint(offset, count)),
        }
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> MemResult<()> {
        match offset {
            REG_DATA => {
                if data.len() != 1 {
                    return Err(self.constraint(offset, data.len()));
                }
                (self.tx)(data[0]);
                Ok(())
            }
            REG_CTRL => {
                if data.len() != 4 {
                    return Err(self.constraint(offset, data.len()));
                }
                self.ctrl = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                self.update_irq();
                Ok(())
            }
            _ => Err(self.constraint(offset, data.len())),
        }
    }
}
