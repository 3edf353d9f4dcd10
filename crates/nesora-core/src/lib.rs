//! nesora-core: a cycle-driven NES (2A03 + RP2C02) emulation core.
//!
//! The [`Nes`] owner holds every subsystem (CPU, PPU, RAM, cartridge) and a
//! 64-bit master clock. Each master tick clocks the PPU once; every third
//! tick clocks the CPU, giving the canonical 1:3 NTSC ratio. All cross-
//! component traffic flows through short-lived borrowed bus views built per
//! tick, so no component ever holds a reference to another.

#![forbid(unsafe_code)]

use std::path::Path;

use crate::{
    bus::CpuBus,
    cartridge::Cartridge,
    cpu::{Cpu, CpuSnapshot, opcode_meta},
    error::Error,
    ppu::{Frame, FrameSink, PatternBus, Ppu, PpuPosition},
    ram::cpu as cpu_ram,
};

pub mod bus;
pub mod cartridge;
pub mod cpu;
pub mod error;
pub mod memory;
pub mod ppu;
pub mod ram;

pub use cpu::addressing::Addressing;

/// The console: every subsystem plus the master-clock scheduler.
pub struct Nes {
    cpu: Cpu,
    ppu: Ppu,
    ram: cpu_ram::Ram,
    cartridge: Option<Cartridge>,
    /// Monotonic master clock in PPU dots.
    master_clock: u64,
    frame_sink: Option<FrameSink>,
}

impl std::fmt::Debug for Nes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nes")
            .field("cpu", &self.cpu)
            .field("ppu", &self.ppu)
            .field("master_clock", &self.master_clock)
            .field("cartridge", &self.cartridge)
            .finish_non_exhaustive()
    }
}

impl Nes {
    /// Creates a console with no cartridge inserted. The CPU holds its
    /// pre-reset state until a cartridge arrives; inserting one applies a
    /// full power-on reset.
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            ppu: Ppu::new(),
            ram: cpu_ram::Ram::new(),
            cartridge: None,
            master_clock: 0,
            frame_sink: None,
        }
    }

    /// Loads a cartridge from disk, inserts it, and performs a reset.
    pub fn load_cartridge_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let cartridge = Cartridge::from_file(path)?;
        self.insert_cartridge(cartridge);
        Ok(())
    }

    /// Parses a cartridge from an in-memory ROM image and inserts it.
    pub fn load_cartridge_from_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let cartridge = Cartridge::new(bytes)?;
        self.insert_cartridge(cartridge);
        Ok(())
    }

    /// Inserts an already-constructed cartridge. Treated as a power cycle.
    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
        self.reset();
    }

    /// Ejects the cartridge and power-cycles the console.
    pub fn eject_cartridge(&mut self) {
        self.cartridge = None;
        self.reset();
    }

    /// The currently inserted cartridge, if any.
    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    /// Applies the deterministic power-on/reset sequence to every subsystem.
    /// Applying it twice leaves the machine in the same state as once.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.ppu.reset();
        let mut bus = CpuBus::new(&mut self.ram, &mut self.ppu, self.cartridge.as_mut());
        self.cpu.reset(&mut bus);
        self.master_clock = 0;
    }

    /// Advances the machine by one master-clock cycle: the PPU is clocked
    /// every tick, the CPU on every third. Returns `true` when this tick
    /// completed a CPU instruction.
    pub fn tick(&mut self) -> bool {
        self.master_clock = self.master_clock.wrapping_add(1);

        let mut pattern = PatternBus::new(self.cartridge.as_mut());
        self.ppu.clock(&mut pattern);

        if self.ppu.take_frame_ready() {
            if let Some(sink) = self.frame_sink.as_mut() {
                sink(self.ppu.frame());
            }
        }

        let mut instruction_done = false;
        if self.master_clock % 3 == 0 {
            // The PPU's NMI edge is sampled at the CPU clock edge, landing
            // within one CPU cycle of the VBlank transition.
            if self.ppu.take_nmi_edge() {
                self.cpu.request_nmi();
            }
            let mut bus = CpuBus::new(&mut self.ram, &mut self.ppu, self.cartridge.as_mut());
            instruction_done = self.cpu.clock(&mut bus);
        }
        instruction_done
    }

    /// Runs master-clock ticks until the CPU completes one instruction.
    pub fn step_instruction(&mut self) {
        while !self.tick() {}
    }

    /// Runs master-clock ticks until the PPU finishes the current frame
    /// (arrives at scanline 241, dot 0), then returns the completed frame.
    pub fn run_frame(&mut self) -> &Frame {
        loop {
            self.tick();
            let position = self.ppu.position();
            if position.scanline == 241 && position.dot == 0 {
                break;
            }
        }
        self.ppu.frame()
    }

    /// Installs (or clears) the callback receiving each completed frame.
    pub fn set_frame_sink(&mut self, sink: Option<FrameSink>) {
        self.frame_sink = sink;
    }

    /// The last completed frame (valid from VBlank until the next VBlank).
    pub fn frame(&self) -> &Frame {
        self.ppu.frame()
    }

    /// Master clock value in PPU dots.
    pub fn master_clock(&self) -> u64 {
        self.master_clock
    }

    /// CPU cycles executed since the last reset.
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu.total_cycles()
    }

    /// Requests a maskable interrupt, delivered at the next instruction
    /// boundary unless the I flag is set. Nothing in the core raises IRQs
    /// (the APU is stubbed and NROM has no IRQ source); hosts and debuggers
    /// can inject one here.
    pub fn request_irq(&mut self) {
        self.cpu.request_irq();
    }

    /// Snapshot of the CPU registers for tracing/debugging.
    pub fn cpu_snapshot(&self) -> CpuSnapshot {
        self.cpu.snapshot()
    }

    /// Seeds the CPU registers, e.g. to start nestest at `$C000`.
    pub fn set_cpu_snapshot(&mut self, snapshot: CpuSnapshot) {
        self.cpu.load_snapshot(snapshot);
    }

    /// Current PPU timing position.
    pub fn ppu_position(&self) -> PpuPosition {
        self.ppu.position()
    }

    /// Reads a CPU-visible byte without side effects. The PPU register
    /// window reads as its open-bus latch, since a real register read
    /// mutates PPU state.
    pub fn peek_cpu(&self, addr: u16) -> u8 {
        use crate::memory::cpu as cpu_mem;
        match addr {
            cpu_mem::INTERNAL_RAM_START..=cpu_mem::INTERNAL_RAM_MIRROR_END => {
                self.ram[(addr & cpu_mem::INTERNAL_RAM_MASK) as usize]
            }
            cpu_mem::PPU_REGISTER_BASE..=cpu_mem::PPU_REGISTER_MIRROR_END => self.ppu.bus_latch(),
            cpu_mem::CARTRIDGE_SPACE_BASE..=cpu_mem::CPU_ADDR_END => self
                .cartridge
                .as_ref()
                .and_then(|cart| cart.cpu_read(addr))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Reads a PPU-visible byte without side effects.
    pub fn peek_ppu(&self, addr: u16) -> u8 {
        self.ppu.peek(self.cartridge.as_ref(), addr)
    }

    /// Disassembles the instruction at `addr` into a trace-style string:
    /// the three-letter mnemonic followed by its operand.
    pub fn disassemble(&self, addr: u16) -> String {
        let opcode = self.peek_cpu(addr);
        let meta = opcode_meta(opcode);
        let lo = self.peek_cpu(addr.wrapping_add(1));
        let hi = self.peek_cpu(addr.wrapping_add(2));
        let word = u16::from_le_bytes([lo, hi]);

        use Addressing::*;
        let operand = match meta.addressing {
            Implied => String::new(),
            Accumulator => "A".to_string(),
            Immediate => format!("#${lo:02X}"),
            ZeroPage => format!("${lo:02X}"),
            ZeroPageX => format!("${lo:02X},X"),
            ZeroPageY => format!("${lo:02X},Y"),
            Relative => {
                let target = addr.wrapping_add(2).wrapping_add(lo as i8 as u16);
                format!("${target:04X}")
            }
            Absolute => format!("${word:04X}"),
            AbsoluteX => format!("${word:04X},X"),
            AbsoluteY => format!("${word:04X},Y"),
            Indirect => format!("(${word:04X})"),
            IndirectX => format!("(${lo:02X},X)"),
            IndirectY => format!("(${lo:02X}),Y"),
        };

        let mnemonic = meta.mnemonic.to_string();
        if operand.is_empty() {
            mnemonic
        } else {
            format!("{mnemonic} {operand}")
        }
    }
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}
