//! Multi-level inclusive write-back cache controller.
//!
//! Four levels (L1D, L1I, L2, L3) sit between the CPU front-end and the
//! bus. The hierarchy is inclusive: a line valid in a child level is valid
//! in its parent, and parent lines carry presence bits naming which
//! children hold the block. Replacement is LRU via a monotonic counter
//! shared across levels; dirty lines are written back only on eviction or
//! flush, and child-aware victim selection prefers lines no child holds.
//!
//! Eviction recurses through the fixed-depth hierarchy by `(level, set,
//! way)` indices: an L2 victim first drains its dirty L1 children into
//! itself, an L3 victim drains its L2 child (which drains its L1s) and
//! pushes the freshest copy of the block to memory.
//!
//! The controller never raises on a miss; bus failures during fills,
//! writebacks, and prefetches surface wrapped with the level and block
//! address that triggered them.

use std::rc::Rc;

use crate::common::{MemError, MemResult};
use crate::config::{CacheHierarchyConfig, CacheLevelConfig};
use crate::soc::bus::Bus;

/// Cache level selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    /// L1 data cache.
    L1d,
    /// L1 instruction cache.
    L1i,
    /// Unified L2.
    L2,
    /// Unified last-level cache.
    L3,
}

impl Level {
    /// Short lowercase name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Level::L1d => "l1d",
            Level::L1i => "l1i",
            Level::L2 => "l2",
            Level::L3 => "l3",
        }
    }

    /// The next level toward memory, or `None` for the last level.
    pub fn next(self) -> Option<Level> {
        match self {
            Level::L1d | Level::L1i => Some(Level::L2),
            Level::L2 => Some(Level::L3),
            Level::L3 => None,
        }
    }
}

/// Monotonic per-level counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelStats {
    /// Probe hits.
    pub hits: u64,
    /// Probe misses.
    pub misses: u64,
    /// Lines installed.
    pub fills: u64,
    /// Valid victims displaced.
    pub evictions: u64,
    /// Dirty lines pushed toward memory.
    pub writebacks: u64,
    /// Lines installed by prefetch.
    pub prefetches: u64,
}

impl LevelStats {
    /// Hit rate over all probes, when any were made.
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        if total == 0 {
            None
        } else {
            Some(self.hits as f64 / total as f64)
        }
    }
}

/// One cache line slot.
#[derive(Clone)]
struct CacheLine {
    valid: bool,
    dirty: bool,
    tag: u64,
    data: Vec<u8>,
    lru: u64,
    /// Meaningful on L2 lines: an L1D child holds this block.
    present_l1d: bool,
    /// Meaningful on L2 lines: an L1I child holds this block.
    present_l1i: bool,
    /// Meaningful on L3 lines: an L2 child holds this block.
    present_l2: bool,
}

impl CacheLine {
    fn empty(line_size: usize) -> Self {
        Self {
            valid: false,
            dirty: false,
            tag: 0,
            data: vec![0; line_size],
            lru: 0,
            present_l1d: false,
            present_l1i: false,
            present_l2: false,
        }
    }
}

/// One set-associative level.
struct CacheLevel {
    line_size: u64,
    num_sets: u64,
    ways: usize,
    lines: Vec<CacheLine>,
    stats: LevelStats,
}

impl CacheLevel {
    fn new(name: &str, config: &CacheLevelConfig) -> MemResult<Self> {
        if !config.line_size.is_power_of_two() {
            return Err(MemError::BadConfig(format!(
                "{} line_size must be a power of two, got {}",
                name, config.line_size
            )));
        }
        if config.associativity == 0 {
            return Err(MemError::BadConfig(format!(
                "{} associativity must be at least 1",
                name
            )));
        }
        let per_set = config.line_size * config.associativity as u64;
        if config.size == 0 || config.size % per_set != 0 {
            return Err(MemError::BadConfig(format!(
                "{} size {} is not a positive multiple of line_size * associativity",
                name, config.size
            )));
        }
        let num_sets = config.size / per_set;
        let total = (num_sets as usize) * config.associativity;
        Ok(Self {
            line_size: config.line_size,
            num_sets,
            ways: config.associativity,
            lines: vec![CacheLine::empty(config.line_size as usize); total],
            stats: LevelStats::default(),
        })
    }

    #[inline]
    fn set_of(&self, block_addr: u64) -> u64 {
        (block_addr / self.line_size) % self.num_sets
    }

    #[inline]
    fn tag_of(&self, block_addr: u64) -> u64 {
        (block_addr / self.line_size) / self.num_sets
    }

    #[inline]
    fn idx(&self, set: u64, way: usize) -> usize {
        set as usize * self.ways + way
    }

    /// Reconstructs the block address a slot currently caches.
    fn block_addr(&self, set: u64, way: usize) -> u64 {
        let tag = self.lines[self.idx(set, way)].tag;
        (tag * self.num_sets + set) * self.line_size
    }
}

/// The four-level inclusive cache hierarchy.
pub struct CacheController {
    l1d: CacheLevel,
    l1i: CacheLevel,
    l2: CacheLevel,
    l3: CacheLevel,
    global_counter: u64,
    bus: Rc<Bus>,
}

impl CacheController {
    /// Builds the hierarchy from its configuration.
    ///
    /// # Returns
    ///
    /// `BadConfig` when any level's geometry is impossible.
    pub fn new(config: &CacheHierarchyConfig, bus: Rc<Bus>) -> MemResult<Self> {
        Ok(Self {
            l1d: CacheLevel::new("l1d", &config.l1d)?,
            l1i: CacheLevel::new("l1i", &config.l1i)?,
            l2: CacheLevel::new("l2", &config.l2)?,
            l3: CacheLevel::new("l3", &config.l3)?,
            global_counter: 0,
            bus,
        })
    }

    fn lvl(&self, lvl: Level) -> &CacheLevel {
        match lvl {
            Level::L1d => &self.l1d,
            Level::L1i => &self.l1i,
            Level::L2 => &self.l2,
            Level::L3 => &self.l3,
        }
    }

    fn lvl_mut(&mut self, lvl: Level) -> &mut CacheLevel {
        match lvl {
            Level::L1d => &mut self.l1d,
            Level::L1i => &mut self.l1i,
            Level::L2 => &mut self.l2,
            Level::L3 => &mut self.l3,
        }
    }

    fn stamp(&mut self) -> u64 {
        self.global_counter += 1;
        self.global_counter
    }

    fn wrap(lvl: Level, block: u64, source: MemError) -> MemError {
        MemError::CacheFault {
            level: lvl.name(),
            block,
            source: Box::new(source),
        }
    }

    /// Line size of a level in bytes.
    pub fn line_size(&self, lvl: Level) -> u64 {
        self.lvl(lvl).line_size
    }

    /// Snapshot of a level's counters.
    pub fn stats(&self, lvl: Level) -> LevelStats {
        self.lvl(lvl).stats
    }

    /// The line-aligned address covering `pa` at a level.
    pub fn block_address_for_level(&self, lvl: Level, pa: u64) -> u64 {
        pa - pa % self.lvl(lvl).line_size
    }

    /// Whether a level currently caches the block covering `pa` (test hook).
    pub fn contains(&self, lvl: Level, pa: u64) -> bool {
        self.find_line(lvl, self.block_address_for_level(lvl, pa))
            .is_some()
    }

    /// Whether the line covering `pa` at a level is dirty (test hook).
    pub fn line_dirty(&self, lvl: Level, pa: u64) -> Option<bool> {
        let block = self.block_address_for_level(lvl, pa);
        self.find_line(lvl, block).map(|(set, way)| {
            let level = self.lvl(lvl);
            level.lines[level.idx(set, way)].dirty
        })
    }

    /// Presence bits `(l1d, l1i, l2)` of the line covering `pa` (test hook).
    pub fn presence(&self, lvl: Level, pa: u64) -> Option<(bool, bool, bool)> {
        let block = self.block_address_for_level(lvl, pa);
        self.find_line(lvl, block).map(|(set, way)| {
            let level = self.lvl(lvl);
            let line = &level.lines[level.idx(set, way)];
            (line.present_l1d, line.present_l1i, line.present_l2)
        })
    }

    fn find_line(&self, lvl: Level, block_addr: u64) -> Option<(u64, usize)> {
        let level = self.lvl(lvl);
        let set = level.set_of(block_addr);
        let tag = level.tag_of(block_addr);
        for way in 0..level.ways {
            let line = &level.lines[level.idx(set, way)];
            if line.valid && line.tag == tag {
                return Some((set, way));
            }
        }
        None
    }

    /// Probes a level without installing.
    ///
    /// A hit restamps the line's LRU counter (and marks it dirty on a
    /// write probe); a miss changes nothing. Both outcomes count.
    fn probe(&mut self, pa: u64, lvl: Level, is_write: bool) -> Option<(u64, usize)> {
        let block = self.block_address_for_level(lvl, pa);
        match self.find_line(lvl, block) {
            Some((set, way)) => {
                let stamp = self.stamp();
                let level = self.lvl_mut(lvl);
                let idx = level.idx(set, way);
                level.lines[idx].lru = stamp;
                if is_write {
                    level.lines[idx].dirty = true;
                }
                level.stats.hits += 1;
                Some((set, way))
            }
            None => {
                self.lvl_mut(lvl).stats.misses += 1;
                None
            }
        }
    }

    /// Probes a level; returns whether it hit. Never installs.
    pub fn access(&mut self, pa: u64, lvl: Level, is_write: bool) -> bool {
        self.probe(pa, lvl, is_write).is_some()
    }

    /// Picks the way to displace in a set.
    ///
    /// Invalid lines first; then, on parent levels, lines no child holds;
    /// then the smallest LRU stamp.
    fn choose_victim(&self, lvl: Level, set: u64) -> usize {
        let level = self.lvl(lvl);
        for way in 0..level.ways {
            if !level.lines[level.idx(set, way)].valid {
                return way;
            }
        }
        let childless = |line: &CacheLine| match lvl {
            Level::L2 => !line.present_l1d && !line.present_l1i,
            Level::L3 => !line.present_l2,
            _ => true,
        };
        let mut best: Option<(usize, u64)> = None;
        for way in 0..level.ways {
            let line = &level.lines[level.idx(set, way)];
            if childless(line) && best.map_or(true, |(_, lru)| line.lru < lru) {
                best = Some((way, line.lru));
            }
        }
        if let Some((way, _)) = best {
            return way;
        }
        let mut way = 0;
        let mut min_lru = u64::MAX;
        for candidate in 0..level.ways {
            let line = &level.lines[level.idx(set, candidate)];
            if line.lru < min_lru {
                min_lru = line.lru;
                way = candidate;
            }
        }
        way
    }

    /// Installs a line at a level, evicting a victim if necessary.
    ///
    /// `data` must be exactly one line of the level. Installing into a
    /// child level sets the matching presence bit on the parent line when
    /// the parent holds the block.
    pub fn install_line(
        &mut self,
        block_addr: u64,
        lvl: Level,
        data: &[u8],
        is_write: bool,
    ) -> MemResult<()> {
        let set = self.lvl(lvl).set_of(block_addr);
        let way = match self.find_line(lvl, block_addr) {
            Some((_, way)) => way,
            None => {
                let way = self.choose_victim(lvl, set);
                if self.lvl(lvl).lines[self.lvl(lvl).idx(set, way)].valid {
                    self.handle_eviction(lvl, set, way)?;
                }
                way
            }
        };
        let stamp = self.stamp();
        let level = self.lvl_mut(lvl);
        let tag = level.tag_of(block_addr);
        let idx = level.idx(set, way);
        let line = &mut level.lines[idx];
        line.valid = true;
        line.dirty = is_write;
        line.tag = tag;
        line.data.clear();
        line.data.extend_from_slice(data);
        line.lru = stamp;
        line.present_l1d = false;
        line.present_l1i = false;
        line.present_l2 = false;
        level.stats.fills += 1;
        match lvl {
            Level::L1d | Level::L1i | Level::L2 => {
                self.set_presence(block_addr, lvl);
            }
            Level::L3 => {}
        }
        Ok(())
    }

    /// Sets the presence bit for `child` on its parent's covering line.
    fn set_presence(&mut self, block_addr: u64, child: Level) {
        let Some(parent) = child.next() else {
            return;
        };
        let pblock = self.block_address_for_level(parent, block_addr);
        if let Some((set, way)) = self.find_line(parent, pblock) {
            let level = self.lvl_mut(parent);
            let idx = level.idx(set, way);
            match child {
                Level::L1d => level.lines[idx].present_l1d = true,
                Level::L1i => level.lines[idx].present_l1i = true,
                Level::L2 => level.lines[idx].present_l2 = true,
                Level::L3 => {}
            }
        }
    }

    /// Clears the presence bit for `child` on its parent's covering line.
    fn clear_presence(&mut self, block_addr: u64, child: Level) {
        let Some(parent) = child.next() else {
            return;
        };
        let pblock = self.block_address_for_level(parent, block_addr);
        if let Some((set, way)) = self.find_line(parent, pblock) {
            let level = self.lvl_mut(parent);
            let idx = level.idx(set, way);
            match child {
                Level::L1d => level.lines[idx].present_l1d = false,
                Level::L1i => level.lines[idx].present_l1i = false,
                Level::L2 => level.lines[idx].present_l2 = false,
                Level::L3 => {}
            }
        }
    }

    /// Invalidates present L1 children of an L2 block, merging dirty child
    /// bytes into `data`.
    ///
    /// # Returns
    ///
    /// The merged data and whether any dirty child was folded in.
    fn drain_l1_children(
        &mut self,
        block: u64,
        mut data: Vec<u8>,
        present_l1d: bool,
        present_l1i: bool,
    ) -> (Vec<u8>, bool) {
        let l2_line = self.lvl(Level::L2).line_size;
        let mut merged = false;
        for (child, present) in [(Level::L1d, present_l1d), (Level::L1i, present_l1i)] {
            if !present {
                continue;
            }
            let child_line = self.lvl(child).line_size;
            let mut cb = block;
            while cb < block + l2_line {
                if let Some((set, way)) = self.find_line(child, cb) {
                    let level = self.lvl_mut(child);
                    let idx = level.idx(set, way);
                    let line = &mut level.lines[idx];
                    if line.dirty {
                        let off = (cb - block) as usize;
                        data[off..off + child_line as usize].copy_from_slice(&line.data);
                        merged = true;
                    }
                    line.valid = false;
                    line.dirty = false;
                }
                cb += child_line;
            }
        }
        (data, merged)
    }

    /// Runs the eviction protocol for a victim slot, leaving the slot's
    /// contents to be overwritten or invalidated by the caller.
    fn handle_eviction(&mut self, lvl: Level, set: u64, way: usize) -> MemResult<()> {
        let (block, dirty, data, p_l1d, p_l1i, p_l2) = {
            let level = self.lvl(lvl);
            let line = &level.lines[level.idx(set, way)];
            (
                level.block_addr(set, way),
                line.dirty,
                line.data.clone(),
                line.present_l1d,
                line.present_l1i,
                line.present_l2,
            )
        };
        self.lvl_mut(lvl).stats.evictions += 1;

        match lvl {
            Level::L1d | Level::L1i => {
                if dirty {
                    self.writeback_to_next(lvl, block, &data)?;
                }
                self.clear_presence(block, lvl);
            }
            Level::L2 => {
                let (merged, merged_dirty) = self.drain_l1_children(block, data, p_l1d, p_l1i);
                if dirty || merged_dirty {
                    self.writeback_to_next(Level::L2, block, &merged)?;
                }
                self.clear_presence(block, Level::L2);
            }
            Level::L3 => {
                if p_l2 {
                    // Parent view first: a clean L2 child over a dirty L3
                    // victim still reaches memory, and any dirty child data
                    // lands afterwards so memory ends with the freshest copy.
                    if dirty {
                        self.bus
                            .write_bytes(block, &data)
                            .map_err(|e| Self::wrap(Level::L3, block, e))?;
                        self.lvl_mut(Level::L3).stats.writebacks += 1;
                    }
                    let l3_line = self.lvl(Level::L3).line_size;
                    let l2_line = self.lvl(Level::L2).line_size;
                    let mut cb = block;
                    while cb < block + l3_line {
                        if let Some((cset, cway)) = self.find_line(Level::L2, cb) {
                            let (cdirty, cdata, cp_l1d, cp_l1i) = {
                                let level = self.lvl(Level::L2);
                                let line = &level.lines[level.idx(cset, cway)];
                                (line.dirty, line.data.clone(), line.present_l1d, line.present_l1i)
                            };
                            self.lvl_mut(Level::L2).stats.evictions += 1;
                            let (cdata, cmerged) =
                                self.drain_l1_children(cb, cdata, cp_l1d, cp_l1i);
                            if cdirty || cmerged {
                                self.bus
                                    .write_bytes(cb, &cdata)
                                    .map_err(|e| Self::wrap(Level::L2, cb, e))?;
                                self.lvl_mut(Level::L2).stats.writebacks += 1;
                            }
                            let level = self.lvl_mut(Level::L2);
                            let idx = level.idx(cset, cway);
                            level.lines[idx].valid = false;
                            level.lines[idx].dirty = false;
                            level.lines[idx].present_l1d = false;
                            level.lines[idx].present_l1i = false;
                        }
                        cb += l2_line;
                    }
                } else if dirty {
                    self.bus
                        .write_bytes(block, &data)
                        .map_err(|e| Self::wrap(Level::L3, block, e))?;
                    self.lvl_mut(Level::L3).stats.writebacks += 1;
                }
            }
        }
        Ok(())
    }

    /// Pushes a block one level toward memory.
    ///
    /// The parent line is patched in place (marked dirty, LRU touched) or
    /// installed when absent; the last level writes to the bus. Writebacks
    /// from an L1 clear that child's presence bit on the covering L2 line.
    fn writeback_to_next(&mut self, lvl: Level, block: u64, data: &[u8]) -> MemResult<()> {
        self.lvl_mut(lvl).stats.writebacks += 1;
        match lvl.next() {
            None => {
                self.bus
                    .write_bytes(block, data)
                    .map_err(|e| Self::wrap(lvl, block, e))?;
            }
            Some(parent) => {
                let pblock = self.block_address_for_level(parent, block);
                let off = (block - pblock) as usize;
                if let Some((set, way)) = self.find_line(parent, pblock) {
                    let stamp = self.stamp();
                    let level = self.lvl_mut(parent);
                    let idx = level.idx(set, way);
                    let line = &mut level.lines[idx];
                    line.data[off..off + data.len()].copy_from_slice(data);
                    line.dirty = true;
                    line.lru = stamp;
                } else {
                    let psize = self.lvl(parent).line_size as usize;
                    if data.len() == psize {
                        self.install_line(pblock, parent, data, true)?;
                    } else {
                        let mut buf = self
                            .bus
                            .read_bytes(pblock, psize)
                            .map_err(|e| Self::wrap(parent, pblock, e))?;
                        buf[off..off + data.len()].copy_from_slice(data);
                        self.install_line(pblock, parent, &buf, true)?;
                    }
                }
            }
        }
        if matches!(lvl, Level::L1d | Level::L1i) {
            self.clear_presence(block, lvl);
        }
        Ok(())
    }

    /// Demand read of the line covering `pa` into an L1.
    ///
    /// Probes `which`, then L2, then L3, filling inward on a hit; on a full
    /// miss one last-level line is fetched from the bus and installed at
    /// every level on the way in.
    ///
    /// # Arguments
    ///
    /// * `pa` - Physical address inside the wanted line.
    /// * `which` - `L1d` or `L1i`.
    ///
    /// # Returns
    ///
    /// The full line of `which` covering `pa`.
    pub fn read(&mut self, pa: u64, which: Level) -> MemResult<Vec<u8>> {
        debug_assert!(matches!(which, Level::L1d | Level::L1i));
        let wblock = self.block_address_for_level(which, pa);
        let wsize = self.lvl(which).line_size as usize;

        if let Some((set, way)) = self.probe(pa, which, false) {
            let level = self.lvl(which);
            return Ok(level.lines[level.idx(set, way)].data.clone());
        }

        if let Some((set, way)) = self.probe(pa, Level::L2, false) {
            let data = {
                let l2block = self.block_address_for_level(Level::L2, pa);
                let off = (wblock - l2block) as usize;
                let level = self.lvl(Level::L2);
                level.lines[level.idx(set, way)].data[off..off + wsize].to_vec()
            };
            self.install_line(wblock, which, &data, false)?;
            return Ok(data);
        }

        if let Some((set, way)) = self.probe(pa, Level::L3, false) {
            let l2block = self.block_address_for_level(Level::L2, pa);
            let l2size = self.lvl(Level::L2).line_size as usize;
            let l2data = {
                let l3block = self.block_address_for_level(Level::L3, pa);
                let off = (l2block - l3block) as usize;
                let level = self.lvl(Level::L3);
                level.lines[level.idx(set, way)].data[off..off + l2size].to_vec()
            };
            self.install_line(l2block, Level::L2, &l2data, false)?;
            let off = (wblock - l2block) as usize;
            let wdata = l2data[off..off + wsize].to_vec();
            self.install_line(wblock, which, &wdata, false)?;
            return Ok(wdata);
        }

        let l3block = self.block_address_for_level(Level::L3, pa);
        let l3size = self.lvl(Level::L3).line_size as usize;
        let l3data = self
            .bus
            .read_bytes(l3block, l3size)
            .map_err(|e| Self::wrap(Level::L3, l3block, e))?;
        self.install_line(l3block, Level::L3, &l3data, false)?;

        let l2block = self.block_address_for_level(Level::L2, pa);
        let l2size = self.lvl(Level::L2).line_size as usize;
        let l2off = (l2block - l3block) as usize;
        let l2data = l3data[l2off..l2off + l2size].to_vec();
        self.install_line(l2block, Level::L2, &l2data, false)?;

        let woff = (wblock - l2block) as usize;
        let wdata = l2data[woff..woff + wsize].to_vec();
        self.install_line(wblock, which, &wdata, false)?;
        Ok(wdata)
    }

    /// Writes bytes through an L1 with write-allocate.
    ///
    /// Each line-aligned chunk is made resident via the demand read path,
    /// then patched in place and marked dirty. There is no write-around.
    pub fn write_bytes(&mut self, pa: u64, data: &[u8], which: Level) -> MemResult<()> {
        debug_assert!(matches!(which, Level::L1d | Level::L1i));
        let line_size = self.lvl(which).line_size;
        let mut addr = pa;
        let mut rest = data;
        while !rest.is_empty() {
            let block = addr - addr % line_size;
            let span = (block + line_size - addr) as usize;
            let chunk = rest.len().min(span);
            self.read(addr, which)?;
            if let Some((set, way)) = self.find_line(which, block) {
                let stamp = self.stamp();
                let level = self.lvl_mut(which);
                let idx = level.idx(set, way);
                let line = &mut level.lines[idx];
                let off = (addr - block) as usize;
                line.data[off..off + chunk].copy_from_slice(&rest[..chunk]);
                line.dirty = true;
                line.lru = stamp;
            }
            addr += chunk as u64;
            rest = &rest[chunk..];
        }
        Ok(())
    }

    /// Fetches a line into a level ahead of demand.
    ///
    /// No-op when the block is already resident.
    pub fn prefetch_line(&mut self, lvl: Level, block_addr: u64) -> MemResult<()> {
        let block = self.block_address_for_level(lvl, block_addr);
        if self.find_line(lvl, block).is_some() {
            return Ok(());
        }
        let size = self.lvl(lvl).line_size as usize;
        let bytes = self
            .bus
            .read_bytes(block, size)
            .map_err(|e| Self::wrap(lvl, block, e))?;
        self.install_line(block, lvl, &bytes, false)?;
        self.lvl_mut(lvl).stats.prefetches += 1;
        Ok(())
    }

    /// Evicts and invalidates the line covering `addr` at a level.
    pub fn flush_line(&mut self, addr: u64, lvl: Level) -> MemResult<()> {
        let block = self.block_address_for_level(lvl, addr);
        if let Some((set, way)) = self.find_line(lvl, block) {
            self.handle_eviction(lvl, set, way)?;
            let level = self.lvl_mut(lvl);
            let line_size = level.line_size as usize;
            let idx = level.idx(set, way);
            level.lines[idx] = CacheLine::empty(line_size);
        }
        Ok(())
    }

    /// Evicts every valid line of a level, then reinitializes it.
    pub fn flush_all(&mut self, lvl: Level) -> MemResult<()> {
        let (num_sets, ways) = {
            let level = self.lvl(lvl);
            (level.num_sets, level.ways)
        };
        for set in 0..num_sets {
            for way in 0..ways {
                let valid = {
                    let level = self.lvl(lvl);
                    level.lines[level.idx(set, way)].valid
                };
                if valid {
                    self.handle_eviction(lvl, set, way)?;
                    let level = self.lvl_mut(lvl);
                    let line_size = level.line_size as usize;
                    let idx = level.idx(set, way);
                    level.lines[idx] = CacheLine::empty(line_size);
                }
            }
        }
        Ok(())
    }
}
