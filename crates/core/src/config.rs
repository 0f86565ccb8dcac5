//! Configuration system for the memory and interrupt subsystem simulator.
//!
//! This module defines all configuration structures and enums used to
//! parameterize the simulator. It provides:
//! 1. **Defaults:** Baseline hardware constants (memory map, cache geometry,
//!    MMU parameters, interrupt controller shape).
//! 2. **Structures:** Hierarchical config for the system memory map, MMU,
//!    cache hierarchy, and prefetch policy.
//! 3. **Validation:** `Config::validate` rejects impossible geometry before
//!    any component is constructed.
//!
//! Configuration is supplied as JSON (see the CLI) or via `Config::default()`.

use serde::Deserialize;

use crate::common::{Endianness, MemError, MemResult};

/// Default configuration constants for the simulator.
mod defaults {
    /// Base physical address of main RAM (2 GiB).
    pub const RAM_BASE: u64 = 0x8000_0000;

    /// Size of main RAM (128 MiB).
    pub const RAM_SIZE: u64 = 128 * 1024 * 1024;

    /// Value returned for DRAM offsets that were never written.
    pub const FILL_BYTE: u8 = 0x00;

    /// Base address of the UART MMIO region.
    pub const UART_BASE: u64 = 0x1000_0000;

    /// PLIC interrupt source wired to the UART RX line.
    pub const UART_IRQ: u32 = 10;

    /// Base address of the PLIC MMIO region.
    pub const PLIC_BASE: u64 = 0x0C00_0000;

    /// Number of PLIC interrupt sources (1 to 64).
    pub const PLIC_SOURCES: usize = 32;

    /// Number of PLIC contexts (1 to 8).
    pub const PLIC_CONTEXTS: usize = 2;

    /// Base address of the CLINT MMIO region.
    pub const CLINT_BASE: u64 = 0x0200_0000;

    /// Number of harts served by the CLINT.
    pub const CLINT_HARTS: usize = 1;

    /// Amount added to `mtime` per advance step.
    pub const CLINT_TICK: u64 = 1;

    /// Base address of the programmable timer MMIO region.
    pub const TIMER_BASE: u64 = 0x1001_0000;

    /// PLIC interrupt source wired to the timer.
    pub const TIMER_IRQ: u32 = 3;

    /// Amount added to the timer counter per advance step.
    pub const TIMER_TICK: u64 = 1;

    /// Base address of the DMA engine MMIO region.
    pub const DMA_BASE: u64 = 0x1002_0000;

    /// PLIC interrupt source wired to the DMA completion line.
    pub const DMA_IRQ: u32 = 4;

    /// Page size in bytes (power of two).
    pub const PAGE_SIZE: u64 = 4096;

    /// Number of TLB entries.
    pub const TLB_ENTRIES: usize = 64;

    /// Size of the MMU's allocatable frame pool.
    pub const MAX_FRAMES: u64 = 16384;

    /// L1 cache size in bytes (32 KiB).
    pub const L1_SIZE: u64 = 32 * 1024;

    /// L2 cache size in bytes (256 KiB).
    pub const L2_SIZE: u64 = 256 * 1024;

    /// L3 cache size in bytes (8 MiB).
    pub const L3_SIZE: u64 = 8 * 1024 * 1024;

    /// Cache line size in bytes, all levels.
    pub const LINE_SIZE: u64 = 64;

    /// L1/L2 associativity (ways per set).
    pub const L1_WAYS: usize = 8;

    /// L3 associativity (ways per set).
    pub const L3_WAYS: usize = 16;
}

/// PLIC register layout.
///
/// Governs where the per-context register blocks live relative to the
/// device base; the priority and pending blocks shift accordingly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlicLayout {
    /// Dense layout: pending at 0x100, contexts at 0x180 with stride 0x20.
    Compact,
    /// Sparse layout: pending at 0x1000, contexts at 0x2000 with stride 0x1000.
    #[default]
    Canonical,
}

/// PLIC pending-bit semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlicMode {
    /// Pending mirrors the interrupt line; lowering the line clears pending.
    #[default]
    Level,
    /// Pending latches on a low-to-high line transition and survives until
    /// claimed; complete re-latches it if the line is still high.
    Latched,
}

/// Cache level a hardware prefetch lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchTarget {
    /// Prefetch into the L1 data cache.
    L1d,
    /// Prefetch into the unified L2 cache (the default).
    #[default]
    L2,
    /// Prefetch into the last-level cache.
    L3,
}

/// Root configuration structure containing all simulator settings.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use memsim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.cache.l1d.size, 32 * 1024);
/// assert_eq!(config.mmu.page_size, 4096);
/// config.validate().unwrap();
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use memsim_core::config::{Config, PlicMode};
///
/// let json = r#"{
///     "system": {
///         "ram_base": 0,
///         "ram_size": 65536,
///         "plic": { "sources": 8, "contexts": 1, "mode": "latched" }
///     },
///     "mmu": { "tlb_entries": 4 },
///     "cache": {
///         "l1d": { "size": 1024, "line_size": 64, "associativity": 2 }
///     }
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.system.ram_size, 65536);
/// assert_eq!(config.system.plic.mode, PlicMode::Latched);
/// assert_eq!(config.cache.l1d.associativity, 2);
/// assert_eq!(config.mmu.tlb_entries, 4);
/// config.validate().unwrap();
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Memory map, devices, and bus behavior.
    #[serde(default)]
    pub system: SystemConfig,
    /// MMU page size, TLB capacity, and frame pool.
    #[serde(default)]
    pub mmu: MmuConfig,
    /// Cache hierarchy geometry.
    #[serde(default)]
    pub cache: CacheHierarchyConfig,
    /// Hardware prefetch policy.
    #[serde(default)]
    pub prefetch: PrefetchConfig,
}

impl Config {
    /// Validates the configuration before wiring.
    ///
    /// # Returns
    ///
    /// `Ok(())`, or `BadConfig` naming the first offending parameter.
    pub fn validate(&self) -> MemResult<()> {
        self.mmu.validate()?;
        self.cache.validate()?;
        self.system.validate()
    }
}

/// System memory map, devices, and bus behavior.
#[derive(Clone, Debug, Deserialize)]
pub struct SystemConfig {
    /// Main RAM base address.
    #[serde(default = "SystemConfig::default_ram_base")]
    pub ram_base: u64,

    /// Main RAM size in bytes.
    #[serde(default = "SystemConfig::default_ram_size")]
    pub ram_size: u64,

    /// Byte value read from never-written DRAM offsets.
    #[serde(default = "SystemConfig::default_fill_byte")]
    pub fill_byte: u8,

    /// When true (default), MMIO accesses must honor device caps.
    #[serde(default = "SystemConfig::default_strict_mmio")]
    pub strict_mmio: bool,

    /// Endianness of the simulated target.
    #[serde(default)]
    pub endianness: Endianness,

    /// UART device placement.
    #[serde(default)]
    pub uart: UartConfig,

    /// PLIC shape and placement.
    #[serde(default)]
    pub plic: PlicConfig,

    /// CLINT shape and placement.
    #[serde(default)]
    pub clint: ClintConfig,

    /// Programmable timer placement.
    #[serde(default)]
    pub timer: TimerConfig,

    /// DMA engine placement and policy.
    #[serde(default)]
    pub dma: DmaConfig,

    /// Optional boot ROM.
    #[serde(default)]
    pub rom: Option<RomConfig>,
}

impl SystemConfig {
    fn default_ram_base() -> u64 {
        defaults::RAM_BASE
    }
    fn default_ram_size() -> u64 {
        defaults::RAM_SIZE
    }
    fn default_fill_byte() -> u8 {
        defaults::FILL_BYTE
    }
    fn default_strict_mmio() -> bool {
        true
    }

    fn validate(&self) -> MemResult<()> {
        if self.ram_size == 0 {
            return Err(MemError::BadConfig("ram_size must be non-zero".into()));
        }
        self.plic.validate()?;
        if self.clint.harts == 0 {
            return Err(MemError::BadConfig("clint.harts must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ram_base: defaults::RAM_BASE,
            ram_size: defaults::RAM_SIZE,
            fill_byte: defaults::FILL_BYTE,
            strict_mmio: true,
            endianness: Endianness::default(),
            uart: UartConfig::default(),
            plic: PlicConfig::default(),
            clint: ClintConfig::default(),
            timer: TimerConfig::default(),
            dma: DmaConfig::default(),
            rom: None,
        }
    }
}

/// UART device placement.
#[derive(Clone, Debug, Deserialize)]
pub struct UartConfig {
    /// Base address of the 16-byte register block.
    #[serde(default = "UartConfig::default_base")]
    pub base: u64,
    /// PLIC source wired to the RX interrupt line.
    #[serde(default = "UartConfig::default_irq")]
    pub irq: u32,
}

impl UartConfig {
    fn default_base() -> u64 {
        defaults::UART_BASE
    }
    fn default_irq() -> u32 {
        defaults::UART_IRQ
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            base: defaults::UART_BASE,
            irq: defaults::UART_IRQ,
        }
    }
}

/// PLIC shape and placement.
#[derive(Clone, Debug, Deserialize)]
pub struct PlicConfig {
    /// Base address of the register block.
    #[serde(default = "PlicConfig::default_base")]
    pub base: u64,
    /// Number of interrupt sources (1 to 64).
    #[serde(default = "PlicConfig::default_sources")]
    pub sources: usize,
    /// Number of contexts (1 to 8).
    #[serde(default = "PlicConfig::default_contexts")]
    pub contexts: usize,
    /// Register layout.
    #[serde(default)]
    pub layout: PlicLayout,
    /// Pending-bit semantics.
    #[serde(default)]
    pub mode: PlicMode,
    /// Context the CPU front-end samples MEIP from.
    #[serde(default)]
    pub cpu_context: usize,
}

impl PlicConfig {
    fn default_base() -> u64 {
        defaults::PLIC_BASE
    }
    fn default_sources() -> usize {
        defaults::PLIC_SOURCES
    }
    fn default_contexts() -> usize {
        defaults::PLIC_CONTEXTS
    }

    fn validate(&self) -> MemResult<()> {
        if !(1..=64).contains(&self.sources) {
            return Err(MemError::BadConfig(format!(
                "plic.sources must be in 1..=64, got {}",
                self.sources
            )));
        }
        if !(1..=8).contains(&self.contexts) {
            return Err(MemError::BadConfig(format!(
                "plic.contexts must be in 1..=8, got {}",
                self.contexts
            )));
        }
        if self.cpu_context >= self.contexts {
            return Err(MemError::BadConfig(format!(
                "plic.cpu_context {} out of range for {} contexts",
                self.cpu_context, self.contexts
            )));
        }
        Ok(())
    }
}

impl Default for PlicConfig {
    fn default() -> Self {
        Self {
            base: defaults::PLIC_BASE,
            sources: defaults::PLIC_SOURCES,
            contexts: defaults::PLIC_CONTEXTS,
            layout: PlicLayout::default(),
            mode: PlicMode::default(),
            cpu_context: 0,
        }
    }
}

/// CLINT shape and placement.
#[derive(Clone, Debug, Deserialize)]
pub struct ClintConfig {
    /// Base address of the 0xC000-byte register block.
    #[serde(default = "ClintConfig::default_base")]
    pub base: u64,
    /// Number of harts with MSIP/MTIMECMP registers.
    #[serde(default = "ClintConfig::default_harts")]
    pub harts: usize,
    /// Amount added to `mtime` per advance step.
    #[serde(default = "ClintConfig::default_tick")]
    pub tick: u64,
    /// Hart whose interrupt lines the CPU front-end samples.
    #[serde(default)]
    pub cpu_hart: usize,
}

impl ClintConfig {
    fn default_base() -> u64 {
        defaults::CLINT_BASE
    }
    fn default_harts() -> usize {
        defaults::CLINT_HARTS
    }
    fn default_tick() -> u64 {
        defaults::CLINT_TICK
    }
}

impl Default for ClintConfig {
    fn default() -> Self {
        Self {
            base: defaults::CLINT_BASE,
            harts: defaults::CLINT_HARTS,
            tick: defaults::CLINT_TICK,
            cpu_hart: 0,
        }
    }
}

/// Programmable timer placement.
#[derive(Clone, Debug, Deserialize)]
pub struct TimerConfig {
    /// Base address of the 32-byte register block.
    #[serde(default = "TimerConfig::default_base")]
    pub base: u64,
    /// PLIC source wired to the timer's interrupt line.
    #[serde(default = "TimerConfig::default_irq")]
    pub irq: u32,
    /// Amount added to the counter per advance step.
    #[serde(default = "TimerConfig::default_tick")]
    pub tick: u64,
}

impl TimerConfig {
    fn default_base() -> u64 {
        defaults::TIMER_BASE
    }
    fn default_irq() -> u32 {
        defaults::TIMER_IRQ
    }
    fn default_tick() -> u64 {
        defaults::TIMER_TICK
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            base: defaults::TIMER_BASE,
            irq: defaults::TIMER_IRQ,
            tick: defaults::TIMER_TICK,
        }
    }
}

/// DMA engine placement and policy.
#[derive(Clone, Debug, Deserialize)]
pub struct DmaConfig {
    /// Base address of the 32-byte register block.
    #[serde(default = "DmaConfig::default_base")]
    pub base: u64,
    /// PLIC source wired to the completion line.
    #[serde(default = "DmaConfig::default_irq")]
    pub irq: u32,
    /// When true (default), source and destination ranges must cover RAM only.
    #[serde(default = "DmaConfig::default_ram_only")]
    pub ram_only: bool,
}

impl DmaConfig {
    fn default_base() -> u64 {
        defaults::DMA_BASE
    }
    fn default_irq() -> u32 {
        defaults::DMA_IRQ
    }
    fn default_ram_only() -> bool {
        true
    }
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self {
            base: defaults::DMA_BASE,
            irq: defaults::DMA_IRQ,
            ram_only: true,
        }
    }
}

/// Boot ROM placement and contents.
#[derive(Clone, Debug, Deserialize)]
pub struct RomConfig {
    /// Base address of the ROM region.
    pub base: u64,
    /// Size of the region in bytes (image is zero-padded to this).
    pub size: u64,
    /// Optional path to an image file loaded at construction.
    #[serde(default)]
    pub image: Option<String>,
    /// When true (default), writes fail instead of being dropped.
    #[serde(default = "RomConfig::default_strict")]
    pub strict: bool,
}

impl RomConfig {
    fn default_strict() -> bool {
        true
    }
}

/// MMU page size, TLB capacity, and frame pool.
#[derive(Clone, Debug, Deserialize)]
pub struct MmuConfig {
    /// Page size in bytes; must be a power of two.
    #[serde(default = "MmuConfig::default_page_size")]
    pub page_size: u64,
    /// Number of TLB entries.
    #[serde(default = "MmuConfig::default_tlb_entries")]
    pub tlb_entries: usize,
    /// Size of the allocatable physical frame pool.
    #[serde(default = "MmuConfig::default_max_frames")]
    pub max_frames: u64,
}

impl MmuConfig {
    fn default_page_size() -> u64 {
        defaults::PAGE_SIZE
    }
    fn default_tlb_entries() -> usize {
        defaults::TLB_ENTRIES
    }
    fn default_max_frames() -> u64 {
        defaults::MAX_FRAMES
    }

    fn validate(&self) -> MemResult<()> {
        if !self.page_size.is_power_of_two() {
            return Err(MemError::BadConfig(format!(
                "page_size must be a power of two, got {}",
                self.page_size
            )));
        }
        if self.tlb_entries == 0 {
            return Err(MemError::BadConfig("tlb_entries must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for MmuConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::PAGE_SIZE,
            tlb_entries: defaults::TLB_ENTRIES,
            max_frames: defaults::MAX_FRAMES,
        }
    }
}

/// Cache hierarchy geometry.
#[derive(Clone, Debug, Deserialize)]
pub struct CacheHierarchyConfig {
    /// L1 data cache.
    #[serde(default = "CacheLevelConfig::l1_default")]
    pub l1d: CacheLevelConfig,
    /// L1 instruction cache.
    #[serde(default = "CacheLevelConfig::l1_default")]
    pub l1i: CacheLevelConfig,
    /// Unified L2 cache.
    #[serde(default = "CacheLevelConfig::l2_default")]
    pub l2: CacheLevelConfig,
    /// Unified L3 cache.
    #[serde(default = "CacheLevelConfig::l3_default")]
    pub l3: CacheLevelConfig,
}

impl CacheHierarchyConfig {
    fn validate(&self) -> MemResult<()> {
        self.l1d.validate("l1d")?;
        self.l1i.validate("l1i")?;
        self.l2.validate("l2")?;
        self.l3.validate("l3")
    }
}

impl Default for CacheHierarchyConfig {
    fn default() -> Self {
        Self {
            l1d: CacheLevelConfig::l1_default(),
            l1i: CacheLevelConfig::l1_default(),
            l2: CacheLevelConfig::l2_default(),
            l3: CacheLevelConfig::l3_default(),
        }
    }
}

/// Geometry of a single cache level.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct CacheLevelConfig {
    /// Total size in bytes.
    pub size: u64,
    /// Line size in bytes; must be a power of two.
    #[serde(default = "CacheLevelConfig::default_line_size")]
    pub line_size: u64,
    /// Ways per set.
    #[serde(default = "CacheLevelConfig::default_ways")]
    pub associativity: usize,
}

impl CacheLevelConfig {
    fn default_line_size() -> u64 {
        defaults::LINE_SIZE
    }
    fn default_ways() -> usize {
        defaults::L1_WAYS
    }

    /// Default L1 geometry: 32 KiB, 64-byte lines, 8-way.
    pub fn l1_default() -> Self {
        Self {
            size: defaults::L1_SIZE,
            line_size: defaults::LINE_SIZE,
            associativity: defaults::L1_WAYS,
        }
    }

    /// Default L2 geometry: 256 KiB, 64-byte lines, 8-way.
    pub fn l2_default() -> Self {
        Self {
            size: defaults::L2_SIZE,
            line_size: defaults::LINE_SIZE,
            associativity: defaults::L1_WAYS,
        }
    }

    /// Default L3 geometry: 8 MiB, 64-byte lines, 16-way.
    pub fn l3_default() -> Self {
        Self {
            size: defaults::L3_SIZE,
            line_size: defaults::LINE_SIZE,
            associativity: defaults::L3_WAYS,
        }
    }

    /// Number of sets implied by the geometry.
    pub fn num_sets(&self) -> u64 {
        self.size / (self.line_size * self.associativity as u64)
    }

    fn validate(&self, name: &str) -> MemResult<()> {
        if !self.line_size.is_power_of_two() {
            return Err(MemError::BadConfig(format!(
                "{}.line_size must be a power of two, got {}",
                name, self.line_size
            )));
        }
        if self.associativity == 0 {
            return Err(MemError::BadConfig(format!(
                "{}.associativity must be at least 1",
                name
            )));
        }
        let per_set = self.line_size * self.associativity as u64;
        if self.size == 0 || self.size % per_set != 0 {
            return Err(MemError::BadConfig(format!(
                "{}.size {} is not a positive multiple of line_size * associativity",
                name, self.size
            )));
        }
        Ok(())
    }
}

/// Hardware prefetch policy for the CPU front-end.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct PrefetchConfig {
    /// Enables next-line prefetch on cached accesses.
    #[serde(default)]
    pub enable: bool,
    /// Level the prefetched line lands in.
    #[serde(default)]
    pub to: PrefetchTarget,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enable: false,
            to: PrefetchTarget::default(),
        }
    }
}
