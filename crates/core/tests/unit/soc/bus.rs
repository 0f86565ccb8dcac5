//! System bus unit tests.
//!
//! Verifies region registration and overlap rejection, cross-region
//! transfer splitting, strict MMIO constraint enforcement, and the
//! statistics counters.

use std::cell::RefCell;
use std::rc::Rc;

use memsim_core::common::MemError;
use memsim_core::soc::devices::{DeviceCaps, Rom};
use memsim_core::soc::{Bus, Dram};

use crate::common::mocks::MockMmioDevice;

fn ram_at(bus: &Bus, base: u64, size: u64) -> Rc<RefCell<Dram>> {
    let dram = Rc::new(RefCell::new(Dram::new(size, 0)));
    bus.map_ram("ram", base, size, dram.clone(), 0).unwrap();
    dram
}

// ══════════════════════════════════════════════════════════
// 1. Region registration
// ══════════════════════════════════════════════════════════

#[test]
fn overlapping_ram_regions_are_rejected() {
    let bus = Bus::new(true);
    ram_at(&bus, 0x1000, 0x1000);
    let other = Rc::new(RefCell::new(Dram::new(0x1000, 0)));
    let err = bus
        .map_ram("clash", 0x1800, 0x1000, other, 0)
        .unwrap_err();
    assert!(
        matches!(err, MemError::Overlap { .. }),
        "intersecting region must be refused"
    );
}

#[test]
fn touching_regions_are_allowed() {
    let bus = Bus::new(true);
    ram_at(&bus, 0x0, 0x1000);
    let other = Rc::new(RefCell::new(Dram::new(0x1000, 0)));
    bus.map_ram("next", 0x1000, 0x1000, other, 0).unwrap();
    assert_eq!(bus.regions().len(), 2);
}

#[test]
fn regions_are_sorted_and_pairwise_disjoint() {
    let bus = Bus::new(true);
    ram_at(&bus, 0x8000, 0x1000);
    ram_at(&bus, 0x0, 0x1000);
    let rom = Rc::new(RefCell::new(Rom::new(0x4000, vec![0; 16], true)));
    bus.register_mmio("rom", rom).unwrap();

    let regions = bus.regions();
    for pair in regions.windows(2) {
        assert!(pair[0].base < pair[1].base, "list sorted by base");
        assert!(pair[0].end() < pair[1].base, "regions disjoint");
    }
}

#[test]
fn ram_window_must_fit_backing_dram() {
    let bus = Bus::new(true);
    let dram = Rc::new(RefCell::new(Dram::new(0x100, 0)));
    let err = bus.map_ram("big", 0, 0x200, dram, 0).unwrap_err();
    assert!(matches!(err, MemError::BadConfig(_)));
}

// ══════════════════════════════════════════════════════════
// 2. Transfer splitting
// ══════════════════════════════════════════════════════════

#[test]
fn read_splits_across_ram_and_rom_boundary() {
    let bus = Bus::new(true);
    let dram = ram_at(&bus, 0, 0x1000);
    let rom = Rc::new(RefCell::new(Rom::new(
        0x1000,
        vec![0xCC, 0xDD, 0x00, 0x00],
        true,
    )));
    bus.register_mmio("rom", rom).unwrap();

    dram.borrow_mut().write_bytes(0xFFE, &[0x11, 0x22]).unwrap();
    let bytes = bus.read_bytes(0xFFE, 4).unwrap();
    assert_eq!(bytes, vec![0x11, 0x22, 0xCC, 0xDD]);
}

#[test]
fn split_read_has_requested_length() {
    let bus = Bus::new(true);
    ram_at(&bus, 0, 0x1000);
    let other = Rc::new(RefCell::new(Dram::new(0x1000, 0x7E)));
    bus.map_ram("high", 0x1000, 0x1000, other, 0).unwrap();
    let bytes = bus.read_bytes(0xF00, 0x200).unwrap();
    assert_eq!(bytes.len(), 0x200);
    assert_eq!(bytes[0x100], 0x7E, "second region's fill byte");
}

#[test]
fn unmapped_address_is_reported() {
    let bus = Bus::new(true);
    ram_at(&bus, 0, 0x1000);
    let err = bus.read_bytes(0x2000, 4).unwrap_err();
    assert_eq!(err, MemError::Unmapped { addr: 0x2000 });
}

#[test]
fn write_commits_earlier_regions_before_faulting() {
    let bus = Bus::new(true);
    let dram = ram_at(&bus, 0, 0x1000);
    // Last two bytes fall into a hole
    let err = bus.write_bytes(0xFFE, &[0xAA, 0xBB, 0xCC, 0xDD]).unwrap_err();
    assert_eq!(err, MemError::Unmapped { addr: 0x1000 });
    assert_eq!(
        dram.borrow_mut().read_bytes(0xFFE, 2).unwrap(),
        vec![0xAA, 0xBB],
        "bytes before the fault stay committed"
    );
}

#[test]
fn range_is_ram_distinguishes_mmio() {
    let bus = Bus::new(true);
    ram_at(&bus, 0, 0x1000);
    let rom = Rc::new(RefCell::new(Rom::new(0x1000, vec![0; 16], true)));
    bus.register_mmio("rom", rom).unwrap();

    assert!(bus.range_is_ram(0x100, 0x100));
    assert!(!bus.range_is_ram(0xFFE, 4), "spills into the ROM");
    assert!(!bus.range_is_ram(0x1000, 4));
    assert!(!bus.range_is_ram(0x2000, 1), "unmapped is not RAM");
}

// ══════════════════════════════════════════════════════════
// 3. Strict MMIO constraints
// ══════════════════════════════════════════════════════════

fn mock_at(base: u64, size: u64, align: u64, widths: Option<Vec<usize>>) -> MockMmioDevice {
    let mut dev = MockMmioDevice::new();
    dev.expect_name().return_const("mock".to_string());
    dev.expect_region().return_const((base, size));
    dev.expect_caps()
        .returning(move || DeviceCaps {
            align,
            widths: widths.clone(),
        });
    dev
}

#[test]
fn misaligned_mmio_access_is_rejected_without_reaching_device() {
    let bus = Bus::new(true);
    let dev = mock_at(0x1000, 0x100, 4, Some(vec![4]));
    // No read expectation: reaching the device would panic the mock.
    bus.register_mmio("mock", Rc::new(RefCell::new(dev))).unwrap();

    let err = bus.read_bytes(0x1002, 4).unwrap_err();
    assert!(matches!(err, MemError::MmioConstraint { .. }));
    assert_eq!(bus.stats().faults, 1);
}

#[test]
fn disallowed_width_is_rejected() {
    let bus = Bus::new(true);
    let dev = mock_at(0x1000, 0x100, 1, Some(vec![4]));
    bus.register_mmio("mock", Rc::new(RefCell::new(dev))).unwrap();

    let err = bus.write_bytes(0x1000, &[1, 2]).unwrap_err();
    assert!(matches!(err, MemError::MmioConstraint { .. }));
}

#[test]
fn conforming_access_reaches_device() {
    let bus = Bus::new(true);
    let mut dev = mock_at(0x1000, 0x100, 4, Some(vec![4]));
    dev.expect_read()
        .returning(|_offset, count| Ok(vec![0x5A; count]));
    bus.register_mmio("mock", Rc::new(RefCell::new(dev))).unwrap();

    assert_eq!(bus.read_bytes(0x1004, 4).unwrap(), vec![0x5A; 4]);
}

#[test]
fn non_strict_mode_skips_cap_checks() {
    let bus = Bus::new(false);
    let mut dev = mock_at(0x1000, 0x100, 4, Some(vec![4]));
    dev.expect_read()
        .returning(|_offset, count| Ok(vec![0xA5; count]));
    bus.register_mmio("mock", Rc::new(RefCell::new(dev))).unwrap();

    // Misaligned odd-width read goes straight through
    assert_eq!(bus.read_bytes(0x1001, 3).unwrap(), vec![0xA5; 3]);
}

// ══════════════════════════════════════════════════════════
// 4. Statistics
// ══════════════════════════════════════════════════════════

#[test]
fn counters_track_operations_and_bytes() {
    let bus = Bus::new(true);
    ram_at(&bus, 0, 0x1000);
    bus.write_bytes(0, &[1, 2, 3]).unwrap();
    bus.read_bytes(0, 3).unwrap();
    bus.read_bytes(0x10, 5).unwrap();

    let stats = bus.stats();
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.reads, 2);
    assert_eq!(stats.write_bytes, 3);
    assert_eq!(stats.read_bytes, 8);
    assert_eq!(stats.faults, 0);
}

#[test]
fn failed_operations_count_faults_but_never_roll_back() {
    let bus = Bus::new(true);
    ram_at(&bus, 0, 0x1000);
    bus.read_bytes(0, 4).unwrap();
    let before = bus.stats();
    let _ = bus.read_bytes(0x5000, 4);
    let after = bus.stats();
    assert_eq!(after.faults, before.faults + 1);
    assert!(after.reads > before.reads);
    assert_eq!(after.read_bytes, before.read_bytes);
}
