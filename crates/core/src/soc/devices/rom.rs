//! Read-only memory region.
//!
//! Serves a fixed byte image. Writes fail with `ReadOnly` in strict mode
//! and are silently dropped otherwise.

use crate::common::{MemError, MemResult};
use crate::soc::devices::Device;

/// Read-only memory device.
pub struct Rom {
    base: u64,
    data: Vec<u8>,
    strict: bool,
}

impl Rom {
    /// Creates a ROM serving `data` at `base`.
    ///
    /// # Arguments
    ///
    /// * `base` - First bus address of the region.
    /// * `data` - Image; the region size equals its length.
    /// * `strict` - When true, writes fail instead of being dropped.
    pub fn new(base: u64, data: Vec<u8>, strict: bool) -> Self {
        Self { base, data, strict }
    }
}

impl Device for Rom {
    fn name(&self) -> &str {
        "rom"
    }

    fn region(&self) -> (u64, u64) {
        (self.base, self.data.len() as u64)
    }

    fn read(&mut self, offset: u64, count: usize) -> MemResult<Vec<u8>> {
        let start = offset as usize;
        match self.data.get(start..start + count) {
            Some(slice) => Ok(slice.to_vec()),
            None => Err(MemError::AccessViolation {
                addr: offset,
                len: count,
            }),
        }
    }

    fn write(&mut self, _offset: u64, _data: &[u8]) -> MemResult<()> {
        if self.strict {
            Err(MemError::ReadOnly {
                name: "rom".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
