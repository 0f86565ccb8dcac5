//! System construction and the top-level `System` type.
//!
//! Builds the complete simulator object graph from configuration, exactly
//! once: DRAM behind the bus, the interrupt controllers, the peripherals
//! with their interrupt sinks, the CPU front-end, and the firmware
//! services. There is no process-wide state; the `System` is passed
//! explicitly to callers.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use crate::common::{MemError, MemResult};
use crate::config::Config;
use crate::core::cpu::Cpu;
use crate::fw::{BootAllocator, VarStore, WallClock};
use crate::soc::bus::Bus;
use crate::soc::devices::{Clint, Dma, IrqLine, Plic, Rom, Timer, Uart};
use crate::soc::dram::Dram;

/// Top-level simulator instance.
///
/// Handles to every component are public so drivers and tests can reach
/// past the CPU front-end when they need to observe or inject state.
pub struct System {
    /// CPU front-end (MMU, caches, CSRs, write-combining buffer).
    pub cpu: Cpu,
    /// System bus.
    pub bus: Rc<Bus>,
    /// Main memory backing store.
    pub dram: Rc<RefCell<Dram>>,
    /// External interrupt controller.
    pub plic: Rc<RefCell<Plic>>,
    /// Core-local interruptor.
    pub clint: Rc<RefCell<Clint>>,
    /// Serial port.
    pub uart: Rc<RefCell<Uart>>,
    /// Programmable timer.
    pub timer: Rc<RefCell<Timer>>,
    /// DMA engine.
    pub dma: Rc<RefCell<Dma>>,
    /// Boot ROM, when configured.
    pub rom: Option<Rc<RefCell<Rom>>>,
    /// Boot-time page allocator over the RAM regions.
    pub allocator: BootAllocator,
    /// Runtime variable store.
    pub vars: VarStore,
    /// Wall-clock service.
    pub clock: WallClock,
}

impl System {
    /// Wires a complete system from configuration.
    ///
    /// # Returns
    ///
    /// `BadConfig` for impossible geometry, `Overlap` if the configured
    /// memory map collides.
    pub fn new(config: &Config) -> MemResult<Self> {
        config.validate()?;
        let sys = &config.system;

        let bus = Rc::new(Bus::new(sys.strict_mmio));
        let dram = Rc::new(RefCell::new(Dram::new(sys.ram_size, sys.fill_byte)));
        bus.map_ram("ram0", sys.ram_base, sys.ram_size, dram.clone(), 0)?;

        let plic = Rc::new(RefCell::new(Plic::new(&sys.plic)?));
        bus.register_mmio("plic", plic.clone())?;

        let clint = Rc::new(RefCell::new(Clint::new(&sys.clint)));
        bus.register_mmio("clint", clint.clone())?;

        let uart = Rc::new(RefCell::new(Uart::new(sys.uart.base)));
        uart.borrow_mut().set_irq(IrqLine::new(&plic, sys.uart.irq));
        bus.register_mmio("uart", uart.clone())?;

        let timer = Rc::new(RefCell::new(Timer::new(&sys.timer)));
        timer
            .borrow_mut()
            .set_irq(IrqLine::new(&plic, sys.timer.irq));
        bus.register_mmio("timer", timer.clone())?;

        let dma = Rc::new(RefCell::new(Dma::new(&sys.dma, Rc::downgrade(&bus))));
        dma.borrow_mut().set_irq(IrqLine::new(&plic, sys.dma.irq));
        bus.register_mmio("dma", dma.clone())?;

        let rom = match &sys.rom {
            Some(rom_cfg) => {
                let mut data = match &rom_cfg.image {
                    Some(path) => fs::read(path).map_err(|e| {
                        MemError::BadConfig(format!("rom image '{}': {}", path, e))
                    })?,
                    None => Vec::new(),
                };
                data.resize(rom_cfg.size as usize, 0);
                let rom = Rc::new(RefCell::new(Rom::new(rom_cfg.base, data, rom_cfg.strict)));
                bus.register_mmio("rom", rom.clone())?;
                Some(rom)
            }
            None => None,
        };

        let mut cpu = Cpu::new(bus.clone(), config)?;
        cpu.attach_plic(plic.clone(), sys.plic.base, sys.plic.cpu_context);
        cpu.attach_clint(clint.clone(), sys.clint.cpu_hart);

        let allocator = BootAllocator::new(&bus, config.mmu.page_size);

        Ok(Self {
            cpu,
            bus,
            dram,
            plic,
            clint,
            uart,
            timer,
            dma,
            rom,
            allocator,
            vars: VarStore::new(),
            clock: WallClock::new(),
        })
    }

    /// Loads a byte image at a physical address through the bus.
    pub fn load_image(&self, pa: u64, image: &[u8]) -> MemResult<()> {
        self.bus.write_bytes(pa, image)
    }

    /// Advances cooperative time by `n` steps.
    ///
    /// Drives the CLINT and timer, then re-samples the CPU's interrupt
    /// pending bits so line changes are visible immediately.
    pub fn advance(&mut self, n: u64) {
        self.clint.borrow_mut().advance(n);
        self.timer.borrow_mut().advance(n);
        self.cpu.sample_irqs();
    }
}
