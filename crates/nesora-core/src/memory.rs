//! Shared definitions for the NES memory map.
//!
//! Centralizing address-related constants keeps the hardware layout in one
//! location and makes it easier to reference the console documentation while
//! reading the decode paths.

/// CPU memory map details.
pub mod cpu {
    /// Internal RAM size (2 KiB, mirrored through `$1FFF`).
    pub const INTERNAL_RAM_SIZE: usize = 0x0800;
    /// First address of the internal RAM window.
    pub const INTERNAL_RAM_START: u16 = 0x0000;
    /// Last address (inclusive) of the internal RAM mirror region.
    pub const INTERNAL_RAM_MIRROR_END: u16 = 0x1FFF;
    /// Mask applied to fold RAM mirrors (`addr & 0x07FF`).
    pub const INTERNAL_RAM_MASK: u16 = 0x07FF;

    /// First CPU-visible PPU register address.
    pub const PPU_REGISTER_BASE: u16 = 0x2000;
    /// Last address of the mirrored PPU register window.
    pub const PPU_REGISTER_MIRROR_END: u16 = 0x3FFF;

    /// Start of the CPU-mapped APU/IO register range.
    pub const APU_IO_BASE: u16 = 0x4000;
    /// End of the CPU-mapped APU/IO register range.
    pub const APU_IO_END: u16 = 0x4017;
    /// OAM DMA register (`$4014`), accepted and ignored by this core.
    pub const OAM_DMA: u16 = 0x4014;
    /// APU status register (`$4015`).
    pub const APU_STATUS: u16 = 0x4015;
    /// Controller port 1 (`$4016`).
    pub const CONTROLLER_PORT_1: u16 = 0x4016;
    /// Controller port 2 / frame counter (`$4017`).
    pub const CONTROLLER_PORT_2: u16 = 0x4017;

    /// Normally-disabled APU/IO test region.
    pub const TEST_MODE_BASE: u16 = 0x4018;
    pub const TEST_MODE_END: u16 = 0x401F;

    /// First address routed to the cartridge.
    pub const CARTRIDGE_SPACE_BASE: u16 = 0x4020;
    /// PRG RAM window serviced by most boards.
    pub const PRG_RAM_START: u16 = 0x6000;
    pub const PRG_RAM_END: u16 = 0x7FFF;
    /// PRG ROM window.
    pub const PRG_ROM_START: u16 = 0x8000;
    /// Last CPU address.
    pub const CPU_ADDR_END: u16 = 0xFFFF;

    /// First address of the hardware stack page.
    pub const STACK_PAGE_START: u16 = 0x0100;

    /// NMI vector (`$FFFA/$FFFB`).
    pub const NMI_VECTOR_LO: u16 = 0xFFFA;
    pub const NMI_VECTOR_HI: u16 = 0xFFFB;
    /// Reset vector (`$FFFC/$FFFD`).
    pub const RESET_VECTOR_LO: u16 = 0xFFFC;
    pub const RESET_VECTOR_HI: u16 = 0xFFFD;
    /// IRQ/BRK vector (`$FFFE/$FFFF`).
    pub const IRQ_VECTOR_LO: u16 = 0xFFFE;
    pub const IRQ_VECTOR_HI: u16 = 0xFFFF;
}

/// PPU register layout and VRAM mirror rules.
pub mod ppu {
    /// Mask for decoding register mirrors (`addr & 0x0007`).
    pub const REGISTER_SELECT_MASK: u16 = 0x0007;

    /// Address mask applied to every PPU bus access (14-bit space).
    pub const VRAM_MIRROR_MASK: u16 = 0x3FFF;

    /// End of the pattern table range (mapper-owned CHR).
    pub const PATTERN_TABLE_END: u16 = 0x1FFF;

    /// Base address of nametable 0.
    pub const NAMETABLE_BASE: u16 = 0x2000;
    /// Size of a single nametable in bytes.
    pub const NAMETABLE_SIZE: u16 = 0x0400;
    /// Core-owned VRAM backing the two physical nametable pages.
    pub const VRAM_SIZE: usize = 0x0800;
    /// Last address of the nametable range before palette space.
    pub const NAMETABLE_MIRROR_END: u16 = 0x3EFF;

    /// Palette RAM base address (`$3F00`).
    pub const PALETTE_BASE: u16 = 0x3F00;
    /// Palette RAM byte count (32 bytes mirrored every 32 bytes).
    pub const PALETTE_RAM_SIZE: usize = 0x20;

    /// Primary OAM size in bytes.
    pub const OAM_RAM_SIZE: usize = 256;

    /// CPU-visible PPU register identifiers.
    #[repr(u16)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Register {
        /// `$2000` - PPUCTRL
        Control = 0x2000,
        /// `$2001` - PPUMASK
        Mask = 0x2001,
        /// `$2002` - PPUSTATUS
        Status = 0x2002,
        /// `$2003` - OAMADDR
        OamAddr = 0x2003,
        /// `$2004` - OAMDATA
        OamData = 0x2004,
        /// `$2005` - PPUSCROLL
        Scroll = 0x2005,
        /// `$2006` - PPUADDR
        Addr = 0x2006,
        /// `$2007` - PPUDATA
        Data = 0x2007,
    }

    impl Register {
        /// Raw address backing the register.
        pub const fn addr(self) -> u16 {
            self as u16
        }

        /// Resolves the canonical register for a CPU address in `$2000-$3FFF`.
        pub const fn from_cpu_addr(addr: u16) -> Self {
            match addr & REGISTER_SELECT_MASK {
                0 => Self::Control,
                1 => Self::Mask,
                2 => Self::Status,
                3 => Self::OamAddr,
                4 => Self::OamData,
                5 => Self::Scroll,
                6 => Self::Addr,
                7 => Self::Data,
                _ => unreachable!(),
            }
        }
    }
}
