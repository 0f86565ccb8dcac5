//! PLIC priority arbitration tests.
//!
//! Verifies priority-ordered claims, threshold filtering, tie-breaking,
//! enable gating, and per-context independence (level mode).

use memsim_core::config::{PlicConfig, PlicMode};
use memsim_core::soc::devices::Plic;

fn plic(sources: usize, contexts: usize) -> Plic {
    Plic::new(&PlicConfig {
        sources,
        contexts,
        mode: PlicMode::Level,
        cpu_context: 0,
        ..PlicConfig::default()
    })
    .unwrap()
}

/// Sets priority, enables the source for a context, leaves threshold 0.
fn arm(plic: &mut Plic, ctx: usize, source: u32, priority: u32) {
    plic.set_priority_for_test(source, priority);
    plic.enable_for_test(ctx, source);
}

// Direct state helpers keep these tests layout-independent; register
// decoding is covered in `claiming`.
trait PlicTestExt {
    fn set_priority_for_test(&mut self, source: u32, priority: u32);
    fn enable_for_test(&mut self, ctx: usize, source: u32);
    fn set_threshold_for_test(&mut self, ctx: usize, threshold: u32);
}

impl PlicTestExt for Plic {
    fn set_priority_for_test(&mut self, source: u32, priority: u32) {
        use memsim_core::soc::devices::Device;
        self.write(4 * (source as u64 - 1), &priority.to_le_bytes())
            .unwrap();
    }

    fn enable_for_test(&mut self, ctx: usize, source: u32) {
        use memsim_core::soc::devices::Device;
        let enable_lo = self.claim_offset(ctx) - 12;
        let (word_off, bit) = if source <= 32 {
            (enable_lo, source - 1)
        } else {
            (enable_lo + 4, source - 33)
        };
        let current = u32::from_le_bytes(self.read(word_off, 4).unwrap().try_into().unwrap());
        self.write(word_off, &(current | (1 << bit)).to_le_bytes())
            .unwrap();
    }

    fn set_threshold_for_test(&mut self, ctx: usize, threshold: u32) {
        use memsim_core::soc::devices::Device;
        let off = self.claim_offset(ctx) - 4;
        self.write(off, &threshold.to_le_bytes()).unwrap();
    }
}

// ══════════════════════════════════════════════════════════
// 1. Priority ordering
// ══════════════════════════════════════════════════════════

#[test]
fn claim_returns_highest_priority_then_next() {
    let mut plic = plic(8, 1);
    for (source, priority) in [(1, 1), (2, 2), (3, 3)] {
        arm(&mut plic, 0, source, priority);
    }
    plic.raise(2);
    plic.raise(3);

    assert_eq!(plic.claim(0), 3, "highest priority wins");
    plic.complete(0, 3);
    plic.lower(3);
    assert_eq!(plic.claim(0), 2, "next claim serves the remaining source");
}

#[test]
fn equal_priorities_tie_break_to_lowest_id() {
    let mut plic = plic(8, 1);
    arm(&mut plic, 0, 5, 7);
    arm(&mut plic, 0, 2, 7);
    plic.raise(5);
    plic.raise(2);
    assert_eq!(plic.claim(0), 2);
}

#[test]
fn claim_with_nothing_pending_returns_zero() {
    let mut plic = plic(8, 1);
    arm(&mut plic, 0, 1, 3);
    assert_eq!(plic.claim(0), 0);
}

#[test]
fn zero_priority_source_never_wins() {
    let mut plic = plic(8, 1);
    arm(&mut plic, 0, 1, 0);
    plic.raise(1);
    assert_eq!(plic.claim(0), 0);
    assert!(!plic.get_context_irq(0));
}

// ══════════════════════════════════════════════════════════
// 2. Threshold filtering
// ══════════════════════════════════════════════════════════

#[test]
fn priority_at_or_below_threshold_is_filtered() {
    let mut plic = plic(8, 1);
    arm(&mut plic, 0, 1, 5);
    plic.set_threshold_for_test(0, 5);
    plic.raise(1);
    assert_eq!(plic.claim(0), 0, "equal to threshold is filtered");

    plic.set_threshold_for_test(0, 4);
    assert_eq!(plic.claim(0), 1, "strictly above threshold is served");
}

#[test]
fn threshold_is_per_context() {
    let mut plic = plic(8, 2);
    arm(&mut plic, 0, 1, 2);
    arm(&mut plic, 1, 1, 2);
    plic.set_threshold_for_test(0, 5);
    plic.raise(1);
    assert_eq!(plic.claim(0), 0, "context 0 is gated by its threshold");
    assert_eq!(plic.claim(1), 1, "context 1 is not");
}

// ══════════════════════════════════════════════════════════
// 3. Enable gating
// ══════════════════════════════════════════════════════════

#[test]
fn disabled_source_is_invisible() {
    let mut plic = plic(8, 1);
    plic.set_priority_for_test(1, 7);
    plic.raise(1);
    assert_eq!(plic.claim(0), 0);
    assert!(!plic.get_context_irq(0));
}

#[test]
fn enables_are_per_context() {
    let mut plic = plic(8, 2);
    arm(&mut plic, 1, 3, 4);
    plic.set_priority_for_test(3, 4);
    plic.raise(3);
    assert_eq!(plic.claim(0), 0);
    assert_eq!(plic.claim(1), 3);
}

#[test]
fn high_sources_use_the_upper_enable_word() {
    let mut plic = plic(64, 1);
    arm(&mut plic, 0, 40, 2);
    plic.raise(40);
    assert_eq!(plic.claim(0), 40);
}

// ══════════════════════════════════════════════════════════
// 4. Level-mode pending
// ══════════════════════════════════════════════════════════

#[test]
fn level_mode_pending_tracks_the_line() {
    let mut plic = plic(8, 1);
    arm(&mut plic, 0, 1, 1);
    plic.raise(1);
    assert!(plic.get_context_irq(0));

    // Claims do not clear a level-mode pending bit
    assert_eq!(plic.claim(0), 1);
    assert!(plic.get_context_irq(0), "line still high");

    plic.lower(1);
    assert!(!plic.get_context_irq(0), "lowering the line clears pending");
}

#[test]
fn context_irq_matches_claim_visibility() {
    let mut plic = plic(8, 2);
    arm(&mut plic, 0, 2, 3);
    assert!(!plic.get_context_irq(0));
    plic.raise(2);
    assert!(plic.get_context_irq(0));
    assert!(!plic.get_context_irq(1), "not enabled there");
}
