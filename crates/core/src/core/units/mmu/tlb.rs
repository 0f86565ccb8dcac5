//! Translation Lookaside Buffer.
//!
//! A fully associative translation cache keyed by `(ASID, VPN)`. Every hit
//! restamps the entry with a monotonic tick; when the buffer is full the
//! entry with the smallest tick is evicted.

use std::collections::HashMap;

/// A cached translation.
#[derive(Clone, Copy, Debug)]
struct TlbEntry {
    frame: u64,
    tick: u64,
}

/// Fully associative, LRU-evicting translation cache.
#[derive(Debug)]
pub struct Tlb {
    capacity: usize,
    entries: HashMap<(u16, u64), TlbEntry>,
    clock: u64,
}

impl Tlb {
    /// Creates a TLB holding up to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity.max(1)),
            clock: 0,
        }
    }

    /// Looks up `(asid, vpn)`, restamping the entry on a hit.
    pub fn lookup(&mut self, asid: u16, vpn: u64) -> Option<u64> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(&(asid, vpn)).map(|e| {
            e.tick = clock;
            e.frame
        })
    }

    /// Inserts a translation, evicting the least-recent entry when full.
    pub fn insert(&mut self, asid: u16, vpn: u64, frame: u64) {
        self.clock += 1;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&(asid, vpn)) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.tick)
                .map(|(k, _)| *k)
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            (asid, vpn),
            TlbEntry {
                frame,
                tick: self.clock,
            },
        );
    }

    /// Removes the entry for `(asid, vpn)` if cached.
    pub fn invalidate(&mut self, asid: u16, vpn: u64) {
        self.entries.remove(&(asid, vpn));
    }

    /// Removes every entry, or only those keyed by `asid` when given.
    pub fn flush(&mut self, asid: Option<u16>) {
        match asid {
            Some(asid) => self.entries.retain(|(a, _), _| *a != asid),
            None => self.entries.clear(),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
