//! Write-combining buffer.
//!
//! Coalesces stores to write-combining pages into a single burst. Bytes
//! append while they continue the current run inside one cache line; any
//! discontinuity hands the old burst back for a single bus write and seeds
//! a new run.

/// Pending write-combining state.
pub struct WriteCombining {
    base: Option<u64>,
    bytes: Vec<u8>,
    line_size: u64,
}

impl WriteCombining {
    /// Creates an empty buffer bounded by the L1D line size.
    pub fn new(line_size: u64) -> Self {
        Self {
            base: None,
            bytes: Vec::new(),
            line_size: line_size.max(1),
        }
    }

    /// Posts a store at physical address `pa`.
    ///
    /// # Returns
    ///
    /// A `(base, bytes)` burst to write to the bus when the store did not
    /// continue the current run, otherwise `None`.
    pub fn push(&mut self, pa: u64, data: &[u8]) -> Option<(u64, Vec<u8>)> {
        match self.base {
            None => {
                self.base = Some(pa);
                self.bytes.extend_from_slice(data);
                None
            }
            Some(base) => {
                let contiguous = pa == base + self.bytes.len() as u64;
                let same_line = pa / self.line_size == base / self.line_size;
                if contiguous && same_line {
                    self.bytes.extend_from_slice(data);
                    None
                } else {
                    let burst = self.take();
                    self.base = Some(pa);
                    self.bytes.extend_from_slice(data);
                    burst
                }
            }
        }
    }

    /// Drains the buffer, returning the pending burst if any.
    pub fn take(&mut self) -> Option<(u64, Vec<u8>)> {
        let base = self.base.take()?;
        Some((base, std::mem::take(&mut self.bytes)))
    }

    /// The pending burst, if any (test hook).
    pub fn pending(&self) -> Option<(u64, &[u8])> {
        self.base.map(|base| (base, self.bytes.as_slice()))
    }
}
