//! CPU-visible memory bus.
//!
//! [`CpuBus`] is a short-lived borrowed view assembled by the console owner
//! for each CPU clock, routing every access to internal RAM, the PPU register
//! window, the APU/IO stubs, or the cartridge. Keeping it borrow-based means
//! all subsystem state stays in one owner and no component holds a reference
//! to another.

use tracing::{debug, warn};

use crate::{
    cartridge::Cartridge,
    memory::cpu as cpu_mem,
    ppu::{PatternBus, Ppu},
    ram::cpu as cpu_ram,
};

/// Byte-level bus interface the CPU core executes against.
///
/// The console provides [`CpuBus`]; tests substitute flat memory.
pub trait Bus {
    fn read(&mut self, addr: u16) -> u8;

    fn write(&mut self, addr: u16, data: u8);
}

/// The NES CPU bus: 2 KiB internal RAM (mirrored to `$1FFF`), the PPU
/// register file (mirrored every 8 bytes to `$3FFF`), stubbed APU/IO
/// registers, and the cartridge from `$4020` up.
pub struct CpuBus<'a> {
    pub(crate) ram: &'a mut cpu_ram::Ram,
    pub(crate) ppu: &'a mut Ppu,
    pub(crate) cartridge: Option<&'a mut Cartridge>,
}

impl<'a> CpuBus<'a> {
    pub fn new(
        ram: &'a mut cpu_ram::Ram,
        ppu: &'a mut Ppu,
        cartridge: Option<&'a mut Cartridge>,
    ) -> Self {
        Self {
            ram,
            ppu,
            cartridge,
        }
    }

    fn read_cartridge(&mut self, addr: u16) -> u8 {
        match self.cartridge.as_deref() {
            Some(cart) => match cart.cpu_read(addr) {
                Some(value) => value,
                None => {
                    warn!("unhandled bus read at {addr:04X}");
                    0
                }
            },
            None => 0,
        }
    }

    fn write_cartridge(&mut self, addr: u16, value: u8) {
        match self.cartridge.as_deref_mut() {
            Some(cart) => {
                if !cart.cpu_write(addr, value) {
                    warn!("unhandled bus write at {addr:04X}");
                }
            }
            None => {}
        }
    }
}

impl Bus for CpuBus<'_> {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            cpu_mem::INTERNAL_RAM_START..=cpu_mem::INTERNAL_RAM_MIRROR_END => {
                self.ram[(addr & cpu_mem::INTERNAL_RAM_MASK) as usize]
            }
            cpu_mem::PPU_REGISTER_BASE..=cpu_mem::PPU_REGISTER_MIRROR_END => {
                let mut pattern = PatternBus::new(self.cartridge.as_deref_mut());
                self.ppu.cpu_read(addr, &mut pattern)
            }
            // APU, OAM DMA, and controller ports are stubbed: reads are 0.
            cpu_mem::APU_IO_BASE..=cpu_mem::APU_IO_END => {
                debug!("APU/IO read stub at {addr:04X}");
                0
            }
            cpu_mem::TEST_MODE_BASE..=cpu_mem::TEST_MODE_END => 0,
            cpu_mem::CARTRIDGE_SPACE_BASE..=cpu_mem::CPU_ADDR_END => self.read_cartridge(addr),
        }
    }

    fn write(&mut self, addr: u16, data: u8) {
        match addr {
            cpu_mem::INTERNAL_RAM_START..=cpu_mem::INTERNAL_RAM_MIRROR_END => {
                self.ram[(addr & cpu_mem::INTERNAL_RAM_MASK) as usize] = data;
            }
            cpu_mem::PPU_REGISTER_BASE..=cpu_mem::PPU_REGISTER_MIRROR_END => {
                let mut pattern = PatternBus::new(self.cartridge.as_deref_mut());
                self.ppu.cpu_write(addr, data, &mut pattern);
            }
            cpu_mem::APU_IO_BASE..=cpu_mem::APU_IO_END => {
                debug!("APU/IO write stub at {addr:04X}");
            }
            cpu_mem::TEST_MODE_BASE..=cpu_mem::TEST_MODE_END => {}
            cpu_mem::CARTRIDGE_SPACE_BASE..=cpu_mem::CPU_ADDR_END => {
                self.write_cartridge(addr, data)
            }
        }
    }
}
