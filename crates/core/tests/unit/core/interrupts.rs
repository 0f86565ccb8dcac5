//! CSR block and interrupt delivery tests.
//!
//! Verifies delivery priority, trap entry/return, CLINT and PLIC
//! aggregation into the pending bits, and the claim/complete poll helper.

use memsim_core::common::{MemError, MemResult};
use memsim_core::core::cpu::csr::{
    Csr, CAUSE_MACHINE_EXTERNAL, CAUSE_MACHINE_SOFTWARE, CAUSE_MACHINE_TIMER,
};
use memsim_core::soc::System;

use crate::common::harness::{build_system, region_base};

// ══════════════════════════════════════════════════════════
// 1. CSR block
// ══════════════════════════════════════════════════════════

#[test]
fn delivery_priority_is_external_timer_software() {
    let mut csr = Csr {
        mstatus_mie: true,
        msie: true,
        mtie: true,
        meie: true,
        msip: true,
        mtip: true,
        meip: true,
        ..Csr::default()
    };
    assert_eq!(csr.should_take_interrupt(), Some(CAUSE_MACHINE_EXTERNAL));
    csr.meip = false;
    assert_eq!(csr.should_take_interrupt(), Some(CAUSE_MACHINE_TIMER));
    csr.mtip = false;
    assert_eq!(csr.should_take_interrupt(), Some(CAUSE_MACHINE_SOFTWARE));
    csr.msip = false;
    assert_eq!(csr.should_take_interrupt(), None);
}

#[test]
fn global_disable_masks_everything() {
    let csr = Csr {
        mstatus_mie: false,
        meie: true,
        meip: true,
        ..Csr::default()
    };
    assert_eq!(csr.should_take_interrupt(), None);
}

#[test]
fn disabled_bits_mask_their_source() {
    let csr = Csr {
        mstatus_mie: true,
        meie: false,
        meip: true,
        mtie: true,
        mtip: false,
        ..Csr::default()
    };
    assert_eq!(csr.should_take_interrupt(), None);
}

#[test]
fn trap_enter_stashes_and_masks() {
    let mut csr = Csr {
        mstatus_mie: true,
        ..Csr::default()
    };
    csr.trap_enter(CAUSE_MACHINE_TIMER, true);
    assert!(!csr.mstatus_mie, "interrupts masked in the handler");
    assert!(csr.mstatus_mpie, "previous enable stashed");
    assert_eq!(csr.mcause, CAUSE_MACHINE_TIMER);
    assert!(csr.mcause_is_interrupt);

    csr.mret();
    assert!(csr.mstatus_mie, "enable restored");
    assert_eq!(csr.mcause, 0);
    assert!(!csr.mcause_is_interrupt);
}

// ══════════════════════════════════════════════════════════
// 2. CLINT aggregation
// ══════════════════════════════════════════════════════════

#[test]
fn msip_write_delivers_a_software_interrupt() {
    let mut system = build_system();
    let clint_base = region_base(&system, "clint");
    system
        .bus
        .write_bytes(clint_base, &1u32.to_le_bytes())
        .unwrap();

    system.cpu.csr.mstatus_mie = true;
    system.cpu.csr.msie = true;
    system.cpu.sample_irqs();
    assert!(system.cpu.csr.msip);
    assert_eq!(
        system.cpu.maybe_take_interrupt(),
        Some(CAUSE_MACHINE_SOFTWARE)
    );
    assert_eq!(system.cpu.traps_taken(), 1);
}

#[test]
fn mtip_edge_appears_exactly_at_compare() {
    let mut system = build_system();
    let clint_base = region_base(&system, "clint");
    system
        .bus
        .write_bytes(clint_base + 0x4000, &100u64.to_le_bytes())
        .unwrap();

    system.advance(99);
    assert!(!system.cpu.csr.mtip, "one step short of the compare value");
    system.advance(1);
    assert!(system.cpu.csr.mtip, "reached the compare value");
}

// ══════════════════════════════════════════════════════════
// 3. PLIC aggregation and polling
// ══════════════════════════════════════════════════════════

/// Arms the system PLIC for the given source on the CPU's context.
fn arm_plic(system: &System, source: u32) {
    let plic_base = region_base(system, "plic");
    system
        .bus
        .write_bytes(plic_base + 4 * (source as u64 - 1), &1u32.to_le_bytes())
        .unwrap();
    let enable_off = system.plic.borrow().claim_offset(0) - 12;
    system
        .bus
        .write_bytes(
            plic_base + enable_off,
            &(1u32 << (source - 1)).to_le_bytes(),
        )
        .unwrap();
}

#[test]
fn uart_rx_delivers_an_external_interrupt_end_to_end() {
    let mut system = build_system();
    let uart_base = region_base(&system, "uart");
    let uart_irq = 10;
    arm_plic(&system, uart_irq);

    // RX interrupt enable, then a received byte
    system
        .bus
        .write_bytes(uart_base + 0x08, &1u32.to_le_bytes())
        .unwrap();
    system.uart.borrow_mut().push_rx(b'z');

    system.cpu.csr.mstatus_mie = true;
    system.cpu.csr.meie = true;
    system.cpu.sample_irqs();
    assert!(system.cpu.csr.meip);
    assert_eq!(
        system.cpu.maybe_take_interrupt(),
        Some(CAUSE_MACHINE_EXTERNAL)
    );

    // Service: drain the FIFO from inside the handler
    let bus = system.bus.clone();
    let drained = std::rc::Rc::new(std::cell::Cell::new(0u32));
    let seen = drained.clone();
    let mut handler = move |id: u32| -> MemResult<()> {
        seen.set(id);
        bus.read_bytes(uart_base, 1).map(|_| ())
    };
    let id = system.cpu.poll_interrupts(0, Some(&mut handler)).unwrap();
    assert_eq!(id, uart_irq);
    assert_eq!(drained.get(), uart_irq);

    system.cpu.complete_trap();
    system.cpu.sample_irqs();
    assert!(!system.cpu.csr.meip, "drained FIFO lowered the line");
    assert_eq!(system.cpu.maybe_take_interrupt(), None);
}

#[test]
fn poll_with_nothing_pending_returns_zero() {
    let mut system = build_system();
    assert_eq!(system.cpu.poll_interrupts(0, None).unwrap(), 0);
}

#[test]
fn handler_errors_are_swallowed_and_the_claim_completes() {
    let mut system = build_system();
    arm_plic(&system, 3);
    system.plic.borrow_mut().raise(3);

    let mut handler = |_id: u32| -> MemResult<()> {
        Err(MemError::DeviceError {
            name: "isr".to_string(),
            reason: "deliberate".to_string(),
        })
    };
    let id = system.cpu.poll_interrupts(0, Some(&mut handler)).unwrap();
    assert_eq!(id, 3, "the claim was still served");
    assert_eq!(system.plic.borrow().claims_served(), 1);
}

#[test]
fn timer_through_plic_reaches_mcause() {
    let mut system = build_system();
    let timer_base = region_base(&system, "timer");
    arm_plic(&system, 3);

    system
        .bus
        .write_bytes(timer_base + 0x08, &2u32.to_le_bytes())
        .unwrap();
    system
        .bus
        .write_bytes(timer_base + 0x10, &3u32.to_le_bytes())
        .unwrap();

    system.cpu.csr.mstatus_mie = true;
    system.cpu.csr.meie = true;
    system.advance(2);
    assert_eq!(
        system.cpu.maybe_take_interrupt(),
        Some(CAUSE_MACHINE_EXTERNAL)
    );
    assert_eq!(system.cpu.csr.mcause, CAUSE_MACHINE_EXTERNAL);
    assert!(system.cpu.csr.mcause_is_interrupt);
}
