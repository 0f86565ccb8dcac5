//! Cache hierarchy unit tests.
//!
//! Small geometry (2-set L1s, 4-set L2/L3, 64-byte lines) so a handful of
//! addresses exercises fills, inclusion bookkeeping, child-aware victim
//! selection, recursive drains, and write-back ordering.

use std::cell::RefCell;
use std::rc::Rc;

use memsim_core::common::MemError;
use memsim_core::core::units::cache::{CacheController, Level};
use memsim_core::soc::{Bus, Dram};

use crate::common::harness::small_caches;

const RAM_SIZE: u64 = 0x10000;

fn rig() -> (CacheController, Rc<RefCell<Dram>>, Rc<Bus>) {
    let bus = Rc::new(Bus::new(true));
    let dram = Rc::new(RefCell::new(Dram::new(RAM_SIZE, 0)));
    bus.map_ram("ram", 0, RAM_SIZE, dram.clone(), 0).unwrap();
    let cache = CacheController::new(&small_caches(), bus.clone()).unwrap();
    (cache, dram, bus)
}

// ══════════════════════════════════════════════════════════
// 1. Probes and demand fills
// ══════════════════════════════════════════════════════════

#[test]
fn probe_never_installs() {
    let (mut cache, _, _) = rig();
    assert!(!cache.access(0x100, Level::L1d, false));
    assert!(!cache.contains(Level::L1d, 0x100));
    assert_eq!(cache.stats(Level::L1d).misses, 1);
    assert_eq!(cache.stats(Level::L1d).fills, 0);
}

#[test]
fn demand_read_installs_at_every_level() {
    let (mut cache, dram, _) = rig();
    dram.borrow_mut().write_bytes(0x40, &[0xAB; 4]).unwrap();

    let line = cache.read(0x40, Level::L1d).unwrap();
    assert_eq!(line.len(), 64);
    assert_eq!(line[0], 0xAB);
    for lvl in [Level::L1d, Level::L2, Level::L3] {
        assert!(cache.contains(lvl, 0x40), "{} holds the block", lvl.name());
    }
}

#[test]
fn demand_fill_sets_presence_bits() {
    let (mut cache, _, _) = rig();
    cache.read(0, Level::L1d).unwrap();
    assert_eq!(cache.presence(Level::L2, 0), Some((true, false, false)));
    assert_eq!(cache.presence(Level::L3, 0), Some((false, false, true)));

    cache.read(0, Level::L1i).unwrap();
    assert_eq!(cache.presence(Level::L2, 0), Some((true, true, false)));
}

#[test]
fn second_read_hits_the_l1() {
    let (mut cache, _, _) = rig();
    cache.read(0x80, Level::L1d).unwrap();
    let hits_before = cache.stats(Level::L1d).hits;
    cache.read(0x80, Level::L1d).unwrap();
    assert_eq!(cache.stats(Level::L1d).hits, hits_before + 1);
}

#[test]
fn l2_hit_fills_the_l1_back() {
    let (mut cache, _, _) = rig();
    cache.read(0, Level::L1d).unwrap();
    cache.flush_line(0, Level::L1d).unwrap();
    assert!(!cache.contains(Level::L1d, 0));
    assert!(cache.contains(Level::L2, 0));

    let misses_before = cache.stats(Level::L3).misses;
    cache.read(0, Level::L1d).unwrap();
    assert!(cache.contains(Level::L1d, 0));
    assert_eq!(
        cache.stats(Level::L3).misses,
        misses_before,
        "the L2 hit never reached L3"
    );
}

#[test]
fn bus_failure_surfaces_with_level_and_block() {
    let (mut cache, _, _) = rig();
    let err = cache.read(0x2_0000, Level::L1d).unwrap_err();
    match err {
        MemError::CacheFault {
            level,
            block,
            source,
        } => {
            assert_eq!(level, "l3");
            assert_eq!(block, 0x2_0000);
            assert!(matches!(*source, MemError::Unmapped { .. }));
        }
        other => panic!("expected a cache-tagged fault, got {other}"),
    }
}

// ══════════════════════════════════════════════════════════
// 2. Writes and write-back
// ══════════════════════════════════════════════════════════

#[test]
fn write_allocates_and_dirties_the_l1_line() {
    let (mut cache, dram, _) = rig();
    cache.write_bytes(0x10, &[0xEE; 4], Level::L1d).unwrap();
    assert_eq!(cache.line_dirty(Level::L1d, 0x10), Some(true));
    assert_eq!(
        dram.borrow().peek(0x10),
        Some(0),
        "write-back caches do not write through"
    );
}

#[test]
fn write_spanning_lines_patches_both() {
    let (mut cache, _, _) = rig();
    let data: Vec<u8> = (1..=12).collect();
    cache.write_bytes(60, &data, Level::L1d).unwrap();
    let first = cache.read(0, Level::L1d).unwrap();
    assert_eq!(&first[60..64], &[1, 2, 3, 4]);
    let second = cache.read(64, Level::L1d).unwrap();
    assert_eq!(&second[0..8], &[5, 6, 7, 8, 9, 10, 11, 12]);
}

#[test]
fn dirty_l1_eviction_writes_back_into_l2() {
    let (mut cache, _, _) = rig();
    cache.write_bytes(0, &[0xAA; 4], Level::L1d).unwrap();
    cache.read(128, Level::L1d).unwrap(); // second way of L1 set 0
    cache.read(256, Level::L1d).unwrap(); // evicts block 0 (least recent)

    assert!(!cache.contains(Level::L1d, 0));
    assert!(cache.contains(Level::L2, 0), "inclusion kept the parent");
    assert_eq!(cache.line_dirty(Level::L2, 0), Some(true));
    assert_eq!(
        cache.presence(Level::L2, 0),
        Some((false, false, false)),
        "child presence cleared after the writeback"
    );
    assert!(cache.stats(Level::L1d).evictions >= 1);
    assert!(cache.stats(Level::L1d).writebacks >= 1);
}

#[test]
fn flush_sequence_reaches_memory() {
    let (mut cache, dram, _) = rig();
    cache
        .write_bytes(0, &[0xEF, 0xBE, 0xAD, 0xDE], Level::L1d)
        .unwrap();
    cache.write_bytes(300, &[0x5A; 4], Level::L1d).unwrap();
    assert_eq!(dram.borrow().peek(0), Some(0), "nothing written yet");

    cache.flush_all(Level::L1d).unwrap();
    cache.flush_all(Level::L2).unwrap();
    cache.flush_all(Level::L3).unwrap();

    let mut dram = dram.borrow_mut();
    assert_eq!(
        dram.read_bytes(0, 4).unwrap(),
        vec![0xEF, 0xBE, 0xAD, 0xDE]
    );
    assert_eq!(dram.read_bytes(300, 4).unwrap(), vec![0x5A; 4]);
}

#[test]
fn flush_line_pushes_one_level_at_a_time() {
    let (mut cache, dram, _) = rig();
    cache.write_bytes(0x40, &[0x77; 4], Level::L1d).unwrap();

    cache.flush_line(0x40, Level::L1d).unwrap();
    assert!(!cache.contains(Level::L1d, 0x40));
    assert_eq!(cache.line_dirty(Level::L2, 0x40), Some(true));
    assert_eq!(dram.borrow().peek(0x40), Some(0));

    cache.flush_line(0x40, Level::L2).unwrap();
    assert_eq!(cache.line_dirty(Level::L3, 0x40), Some(true));

    cache.flush_line(0x40, Level::L3).unwrap();
    assert_eq!(dram.borrow().peek(0x40), Some(0x77));
}

// ══════════════════════════════════════════════════════════
// 3. Victim selection and drains
// ══════════════════════════════════════════════════════════

#[test]
fn l2_victim_prefers_lines_without_children() {
    let (mut cache, _, _) = rig();
    cache.read(0, Level::L1d).unwrap(); // L2 block 0 has an L1D child
    cache.prefetch_line(Level::L2, 256).unwrap(); // childless, same L2 set

    // Installing a third block into the full set must displace the
    // childless line even though block 0 is older.
    let line = vec![0u8; 64];
    cache.install_line(512, Level::L2, &line, false).unwrap();
    assert!(cache.contains(Level::L2, 0), "parented line survived");
    assert!(!cache.contains(Level::L2, 256), "childless line evicted");
}

#[test]
fn l2_eviction_drains_dirty_l1_children() {
    let (mut cache, _, _) = rig();
    cache.write_bytes(0, &[0xC3; 8], Level::L1d).unwrap();
    cache.read(256, Level::L1d).unwrap(); // both L2 set-0 ways now have children

    // Force an L2 eviction; the victim is block 0 and must fold the dirty
    // L1 bytes into its own data before writing back to L3.
    let line = vec![0u8; 64];
    cache.install_line(512, Level::L2, &line, false).unwrap();

    assert!(!cache.contains(Level::L1d, 0), "child invalidated");
    assert!(!cache.contains(Level::L2, 0), "victim displaced");
    assert_eq!(cache.line_dirty(Level::L3, 0), Some(true));
    let l3_line = {
        // refill from L3 and look at the merged bytes
        cache.read(0, Level::L1d).unwrap()
    };
    assert_eq!(&l3_line[0..8], &[0xC3; 8]);
}

#[test]
fn l3_flush_drains_the_whole_path_to_memory() {
    let (mut cache, dram, _) = rig();
    cache.write_bytes(0x80, &[0x99; 4], Level::L1d).unwrap();

    // Flushing only the last level must pull the dirty bytes all the way
    // from the L1 child and invalidate the inner copies.
    cache.flush_all(Level::L3).unwrap();
    assert_eq!(dram.borrow().peek(0x80), Some(0x99));
    assert!(!cache.contains(Level::L1d, 0x80));
    assert!(!cache.contains(Level::L2, 0x80));
    assert!(!cache.contains(Level::L3, 0x80));
}

// ══════════════════════════════════════════════════════════
// 4. Prefetch and statistics
// ══════════════════════════════════════════════════════════

#[test]
fn prefetch_installs_once() {
    let (mut cache, _, _) = rig();
    cache.prefetch_line(Level::L2, 0x200).unwrap();
    assert!(cache.contains(Level::L2, 0x200));
    assert_eq!(cache.stats(Level::L2).prefetches, 1);

    cache.prefetch_line(Level::L2, 0x200).unwrap();
    assert_eq!(cache.stats(Level::L2).prefetches, 1, "resident is a no-op");
}

#[test]
fn hit_rate_reflects_probe_history() {
    let (mut cache, _, _) = rig();
    assert_eq!(cache.stats(Level::L1d).hit_rate(), None);
    cache.read(0, Level::L1d).unwrap();
    cache.read(0, Level::L1d).unwrap();
    cache.read(0, Level::L1d).unwrap();
    let rate = cache.stats(Level::L1d).hit_rate().unwrap();
    assert!((rate - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn counters_are_monotonic_across_a_fault() {
    let (mut cache, _, _) = rig();
    cache.read(0, Level::L1d).unwrap();
    let before = cache.stats(Level::L1d);
    let _ = cache.read(0x2_0000, Level::L1d);
    let after = cache.stats(Level::L1d);
    assert!(after.misses > before.misses, "the failed fill still counted");
    assert_eq!(after.hits, before.hits);
}
