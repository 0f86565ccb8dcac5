//! Simulation statistics collection and reporting.
//!
//! Snapshots the monotonic counters scattered across the system into one
//! structure and prints them as selectable report sections:
//! 1. **summary:** headline operation and fault counts.
//! 2. **bus:** operations, bytes moved, faults.
//! 3. **cache:** per-level hits, misses, fills, evictions, writebacks.
//! 4. **mmu:** TLB hits/misses and page faults.
//! 5. **interrupts:** traps taken and PLIC claims served.

use crate::core::units::cache::{Level, LevelStats};
use crate::core::units::mmu::MmuStats;
use crate::soc::bus::BusStats;
use crate::soc::System;

/// Valid section names for [`SimStats::print_sections`].
pub const STATS_SECTIONS: &[&str] = &["summary", "bus", "cache", "mmu", "interrupts"];

/// A point-in-time snapshot of every simulator counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimStats {
    /// Bus counters.
    pub bus: BusStats,
    /// L1 data cache counters.
    pub l1d: LevelStats,
    /// L1 instruction cache counters.
    pub l1i: LevelStats,
    /// L2 counters.
    pub l2: LevelStats,
    /// L3 counters.
    pub l3: LevelStats,
    /// MMU counters.
    pub mmu: MmuStats,
    /// DRAM bounds violations.
    pub dram_faults: u64,
    /// Interrupts taken by the CPU.
    pub traps_taken: u64,
    /// Claims served by the PLIC.
    pub plic_claims: u64,
}

impl SimStats {
    /// Snapshots all counters from a system.
    pub fn collect(system: &System) -> Self {
        let cache = system.cpu.cache();
        Self {
            bus: system.bus.stats(),
            l1d: cache.stats(Level::L1d),
            l1i: cache.stats(Level::L1i),
            l2: cache.stats(Level::L2),
            l3: cache.stats(Level::L3),
            mmu: system.cpu.mmu().stats(),
            dram_faults: system.dram.borrow().fault_count(),
            traps_taken: system.cpu.traps_taken(),
            plic_claims: system.plic.borrow().claims_served(),
        }
    }

    /// Prints every report section to stdout.
    pub fn print(&self) {
        self.print_sections(&[]);
    }

    /// Prints only the requested sections; an empty slice prints all.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);

        if want("summary") {
            println!("=== Summary ===");
            println!(
                "bus ops: {} reads, {} writes",
                self.bus.reads, self.bus.writes
            );
            println!(
                "faults: {} bus, {} dram, {} page",
                self.bus.faults, self.dram_faults, self.mmu.page_faults
            );
            println!("interrupts taken: {}", self.traps_taken);
        }

        if want("bus") {
            println!("=== Bus ===");
            println!("reads:       {:>12}", self.bus.reads);
            println!("writes:      {:>12}", self.bus.writes);
            println!("bytes read:  {:>12}", self.bus.read_bytes);
            println!("bytes write: {:>12}", self.bus.write_bytes);
            println!("faults:      {:>12}", self.bus.faults);
        }

        if want("cache") {
            println!("=== Cache ===");
            for (name, stats) in [
                ("l1d", &self.l1d),
                ("l1i", &self.l1i),
                ("l2", &self.l2),
                ("l3", &self.l3),
            ] {
                let rate = stats
                    .hit_rate()
                    .map(|r| format!("{:.1}%", r * 100.0))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<4} hits {:>10} misses {:>10} fills {:>8} evict {:>8} wb {:>8} hit-rate {}",
                    name,
                    stats.hits,
                    stats.misses,
                    stats.fills,
                    stats.evictions,
                    stats.writebacks,
                    rate
                );
            }
        }

        if want("mmu") {
            println!("=== MMU ===");
            println!("tlb hits:    {:>12}", self.mmu.tlb_hits);
            println!("tlb misses:  {:>12}", self.mmu.tlb_misses);
            println!("page faults: {:>12}", self.mmu.page_faults);
        }

        if want("interrupts") {
            println!("=== Interrupts ===");
            println!("traps taken:  {:>11}", self.traps_taken);
            println!("plic claims:  {:>11}", self.plic_claims);
        }
    }
}
