//! Memory and interrupt subsystem simulator CLI.
//!
//! Thin driver over `memsim-core`. The `run` subcommand wires a system
//! from an optional JSON config and exercises it end to end: paged cached
//! memory, device-memtype MMIO stores, a timer interrupt delivered through
//! the PLIC into the CPU's CSRs, and a DMA copy. It then prints the
//! statistics report.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use memsim_core::common::MemResult;
use memsim_core::config::Config;
use memsim_core::core::units::mmu::{MemType, PageAttrs};
use memsim_core::soc::devices::timer;
use memsim_core::stats::SimStats;
use memsim_core::System;

#[derive(Parser, Debug)]
#[command(
    name = "memsim",
    version,
    about = "Memory and interrupt subsystem simulator",
    long_about = "Wire a simulated memory fabric (DRAM, bus, MMU, caches, PLIC/CLINT, DMA)\nand drive a smoke workload through it.\n\nExamples:\n  memsim run\n  memsim run --config system.json --stats cache --stats bus"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wire a system, drive the smoke workload, and print statistics.
    Run {
        /// JSON configuration file (defaults apply when omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Statistics sections to print (summary, bus, cache, mmu, interrupts).
        #[arg(long)]
        stats: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { config, stats } => run(config, stats),
    };
    if let Err(err) = result {
        eprintln!("memsim: {}", err);
        process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, String> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
        }
        None => Ok(Config::default()),
    }
}

fn run(config: Option<PathBuf>, stats: Vec<String>) -> Result<(), String> {
    let config = load_config(config)?;
    let mut system = System::new(&config).map_err(|e| e.to_string())?;
    workload(&mut system, &config).map_err(|e| e.to_string())?;
    SimStats::collect(&system).print_sections(&stats);
    Ok(())
}

/// Returns the base address of a named bus region, or zero.
fn region_base(system: &System, name: &str) -> u64 {
    system
        .bus
        .regions()
        .iter()
        .find(|r| r.name == name)
        .map(|r| r.base)
        .unwrap_or(0)
}

/// Drives every core path once: cached stores, device MMIO, an interrupt
/// round trip, and a DMA copy.
fn workload(system: &mut System, config: &Config) -> MemResult<()> {
    let page_shift = system.cpu.mmu().page_shift();

    // Cached memory: map a page onto an allocated frame and round-trip a word.
    let data_pa = system.allocator.alloc_page()?;
    let data_va: u64 = 0x0010_0000;
    system.cpu.map_page(
        data_va >> page_shift,
        Some(data_pa >> page_shift),
        PageAttrs::default(),
        None,
    )?;
    system.cpu.store(data_va, 4, 0xDEAD_BEEF, false)?;
    let value = system.cpu.load(data_va, 4, false)?;
    println!("cached round-trip: {:#010x}", value);

    system.cpu.flush_dcache()?;
    system.cpu.flush_l2()?;
    system.cpu.flush_l3()?;
    let dram_off = data_pa - system.bus.ram_regions()[0].0;
    println!(
        "after flush, dram byte: {:#04x}",
        system.dram.borrow().peek(dram_off).unwrap_or(0)
    );

    // Device memtype: drive the UART through stores on a device page.
    let uart_base = region_base(system, "uart");
    let device_page = PageAttrs {
        memtype: MemType::Device,
        ..PageAttrs::default()
    };
    system.cpu.map_page(
        uart_base >> page_shift,
        Some(uart_base >> page_shift),
        device_page,
        None,
    )?;
    for byte in b"memsim: uart ok\n" {
        system.cpu.store(uart_base, 1, *byte as u64, false)?;
    }

    // Interrupt round trip: timer -> PLIC -> CSR -> claim/complete.
    let timer_base = region_base(system, "timer");
    let plic_base = region_base(system, "plic");

    // PLIC: priority 3 for the timer source, enabled for context 0.
    let timer_irq = config.system.timer.irq;
    system.bus.write_bytes(
        plic_base + 4 * (timer_irq as u64 - 1),
        &3u32.to_le_bytes(),
    )?;
    let enable_off = system.plic.borrow().claim_offset(0) - 12;
    system.bus.write_bytes(
        plic_base + enable_off,
        &(1u32 << (timer_irq - 1)).to_le_bytes(),
    )?;

    // Timer: compare 5, enabled with interrupts.
    system.cpu.map_page(
        timer_base >> page_shift,
        Some(timer_base >> page_shift),
        device_page,
        None,
    )?;
    system.cpu.store(timer_base + 0x08, 4, 5, false)?;
    system.cpu.store(
        timer_base + 0x10,
        4,
        (timer::CTRL_ENABLE | timer::CTRL_IRQ_EN) as u64,
        false,
    )?;

    system.cpu.csr.mstatus_mie = true;
    system.cpu.csr.meie = true;
    system.advance(5);

    if let Some(cause) = system.cpu.maybe_take_interrupt() {
        println!("interrupt taken, mcause {}", cause);
        let timer_status = timer_base + 0x14;
        let bus = system.bus.clone();
        let mut handler = move |id: u32| {
            println!("servicing source {}", id);
            bus.write_bytes(timer_status, &1u32.to_le_bytes())
        };
        let id = system.cpu.poll_interrupts(0, Some(&mut handler))?;
        println!("claimed source {}", id);
        system.cpu.complete_trap();
    }

    // DMA: copy a pattern between two RAM buffers.
    let ram_base = system.bus.ram_regions()[0].0;
    let src = ram_base + 0x1_0000;
    let dst = ram_base + 0x2_0000;
    let pattern: Vec<u8> = (0..64u8).collect();
    system.load_image(src, &pattern)?;
    let dma_base = region_base(system, "dma");
    system
        .bus
        .write_bytes(dma_base, &(src as u32).to_le_bytes())?;
    system
        .bus
        .write_bytes(dma_base + 0x04, &((src >> 32) as u32).to_le_bytes())?;
    system
        .bus
        .write_bytes(dma_base + 0x08, &(dst as u32).to_le_bytes())?;
    system
        .bus
        .write_bytes(dma_base + 0x0C, &((dst >> 32) as u32).to_le_bytes())?;
    system
        .bus
        .write_bytes(dma_base + 0x10, &(pattern.len() as u32).to_le_bytes())?;
    system
        .bus
        .write_bytes(dma_base + 0x14, &1u32.to_le_bytes())?;
    let copied = system.bus.read_bytes(dst, pattern.len())?;
    println!("dma copy ok: {}", copied == pattern);

    Ok(())
}
