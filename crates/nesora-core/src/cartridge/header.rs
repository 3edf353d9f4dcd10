//! iNES / NES 2.0 header parsing.
//!
//! The first 16 bytes of every `.nes` ROM describe how much PRG/CHR data the
//! cartridge exposes, which mapper it needs, and a handful of compatibility
//! flags. Modern dumps may use the extended NES 2.0 flavour, which reuses the
//! same 16 bytes but reinterprets bytes 8..=15; the parser understands both
//! and flattens them into a single [`Header`] value.
//!
//! # Reference
//! - [iNES on NESdev Wiki](https://www.nesdev.org/wiki/INES)
//! - [NES 2.0 on NESdev Wiki](https://www.nesdev.org/wiki/NES_2.0)

use bitflags::bitflags;

use crate::error::{Error, Region};

const NES_MAGIC: &[u8; 4] = b"NES\x1A";

/// Size of the fixed iNES header in bytes.
pub const NES_HEADER_LEN: usize = 16;

/// Size of the optional trainer block between the header and PRG data.
pub const TRAINER_LEN: usize = 512;

bitflags! {
    /// iNES flags byte 6.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags6: u8 {
        const MIRRORING       = 0b0000_0001;
        const BATTERY         = 0b0000_0010;
        const TRAINER         = 0b0000_0100;
        const FOUR_SCREEN     = 0b0000_1000;
        const MAPPER_LOW_MASK = 0b1111_0000;
    }
}

bitflags! {
    /// iNES flags byte 7.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags7: u8 {
        const VS_UNISYSTEM     = 0b0000_0001;
        const PLAYCHOICE_10    = 0b0000_0010;
        const NES2_DETECTION   = 0b0000_1100;
        const MAPPER_HIGH_MASK = 0b1111_0000;
    }
}

/// Layout mirroring type for the PPU nametables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mirroring {
    /// `$2000/$2400` share page 0, `$2800/$2C00` share page 1.
    Horizontal,
    /// `$2000/$2800` share page 0, `$2400/$2C00` share page 1.
    Vertical,
    /// Cartridge supplies its own four nametables.
    FourScreen,
    /// Single-screen mirroring using the first VRAM page.
    SingleScreenLower,
    /// Single-screen mirroring using the second VRAM page.
    SingleScreenUpper,
}

/// Identifies the header flavour encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RomFormat {
    /// The original iNES 1.0 specification.
    INes,
    /// NES 2.0 with extended sizing and metadata fields.
    Nes20,
    /// Rare prototypes that pre-date the iNES standard.
    Archaic,
}

impl RomFormat {
    fn from_flags7(flags7: Flags7) -> Self {
        match (flags7.bits() >> 2) & 0b11 {
            0b10 => Self::Nes20,
            0b00 => Self::INes,
            _ => Self::Archaic,
        }
    }
}

/// Console type advertised by flags 7 bits 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleType {
    /// Standard NES/Famicom cartridge.
    NesFamicom,
    /// Vs. System arcade hardware.
    VsSystem,
    /// PlayChoice-10 hardware.
    PlayChoice10,
    /// NES 2.0 extended console type.
    Extended,
}

impl ConsoleType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::NesFamicom,
            1 => Self::VsSystem,
            2 => Self::PlayChoice10,
            _ => Self::Extended,
        }
    }
}

/// CPU/PPU timing mode. iNES 1.0 only distinguishes NTSC/PAL hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingMode {
    /// RP2C02, 60 Hz NTSC timing.
    Ntsc,
    /// RP2C07, 50 Hz PAL timing.
    Pal,
    /// Region free.
    MultipleRegion,
    /// UA6538 famiclone timing.
    Dendy,
}

impl TimingMode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Ntsc,
            1 => Self::Pal,
            2 => Self::MultipleRegion,
            _ => Self::Dendy,
        }
    }
}

/// Parsed cartridge header, flattened across the iNES 1.0 / NES 2.0 split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    /// Which header flavour the fields were decoded from.
    pub format: RomFormat,
    /// 12-bit mapper id (0 == NROM, 1 == MMC1, ...).
    pub mapper: u16,
    /// NES 2.0 submapper value. Always 0 for legacy iNES files.
    pub submapper: u8,
    /// Hardwired nametable arrangement.
    pub mirroring: Mirroring,
    /// Cartridge keeps RAM contents when powered off.
    pub battery: bool,
    /// 512-byte trainer block present between header and PRG data.
    pub trainer_present: bool,
    /// PRG ROM size in bytes.
    pub prg_rom_size: usize,
    /// CHR ROM size in bytes. Zero means the board carries CHR RAM.
    pub chr_rom_size: usize,
    /// Volatile PRG RAM size in bytes.
    pub prg_ram_size: usize,
    /// Volatile CHR RAM size in bytes.
    pub chr_ram_size: usize,
    /// Console type advertised by flags 7.
    pub console_type: ConsoleType,
    /// CPU/PPU timing mode.
    pub timing: TimingMode,
}

impl Header {
    /// Parse a header from the first 16 bytes of a ROM image.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < NES_HEADER_LEN {
            return Err(Error::ShortRead {
                region: Region::Header,
                needed: NES_HEADER_LEN,
                available: bytes.len(),
            });
        }
        if &bytes[0..4] != NES_MAGIC {
            return Err(Error::BadMagic);
        }

        let prg_lsb = bytes[4];
        let chr_lsb = bytes[5];
        let flags6 = Flags6::from_bits_retain(bytes[6]);
        let flags7 = Flags7::from_bits_retain(bytes[7]);

        let format = RomFormat::from_flags7(flags7);
        if format == RomFormat::Archaic {
            return Err(Error::UnsupportedFormat(format));
        }

        let mirroring = resolve_mirroring(flags6);
        let console_type = ConsoleType::from_bits(flags7.bits());

        let header = match format {
            RomFormat::INes => {
                let prg_ram_units = bytes[8];
                Header {
                    format,
                    mapper: combine_mapper(flags6, flags7, 0),
                    submapper: 0,
                    mirroring,
                    battery: flags6.contains(Flags6::BATTERY),
                    trainer_present: flags6.contains(Flags6::TRAINER),
                    prg_rom_size: prg_lsb as usize * 16 * 1024,
                    chr_rom_size: chr_lsb as usize * 8 * 1024,
                    // Legacy dumps store 0 for "assume 8 KiB".
                    prg_ram_size: prg_ram_units.max(1) as usize * 8 * 1024,
                    chr_ram_size: if chr_lsb == 0 { 8 * 1024 } else { 0 },
                    console_type,
                    timing: if bytes[9] & 0b1 == 0 {
                        TimingMode::Ntsc
                    } else {
                        TimingMode::Pal
                    },
                }
            }
            RomFormat::Nes20 => {
                let mapper_msb = bytes[8] & 0x0F;
                let submapper = bytes[8] >> 4;
                let prg_msb = bytes[9] & 0x0F;
                let chr_msb = (bytes[9] >> 4) & 0x0F;
                Header {
                    format,
                    mapper: combine_mapper(flags6, flags7, mapper_msb),
                    submapper,
                    mirroring,
                    battery: flags6.contains(Flags6::BATTERY),
                    trainer_present: flags6.contains(Flags6::TRAINER),
                    prg_rom_size: decode_nes2_rom_size(prg_lsb, prg_msb, 16 * 1024),
                    chr_rom_size: decode_nes2_rom_size(chr_lsb, chr_msb, 8 * 1024),
                    prg_ram_size: decode_nes2_ram_size(bytes[10] & 0x0F),
                    chr_ram_size: decode_nes2_ram_size(bytes[11] & 0x0F),
                    console_type,
                    timing: TimingMode::from_bits(bytes[12]),
                }
            }
            RomFormat::Archaic => unreachable!("rejected above"),
        };

        Ok(header)
    }
}

fn resolve_mirroring(flags6: Flags6) -> Mirroring {
    if flags6.contains(Flags6::FOUR_SCREEN) {
        Mirroring::FourScreen
    } else if flags6.contains(Flags6::MIRRORING) {
        Mirroring::Vertical
    } else {
        Mirroring::Horizontal
    }
}

fn combine_mapper(flags6: Flags6, flags7: Flags7, upper: u8) -> u16 {
    let lower = (flags6.bits() >> 4) as u16;
    let middle = (flags7.bits() & 0xF0) as u16;
    let upper = (upper as u16) << 8;
    lower | middle | upper
}

/// Decodes a NES 2.0 PRG/CHR ROM size. When the MSB nibble is `$F` the LSB
/// byte switches to exponent notation: size = 2^E * (MM * 2 + 1).
fn decode_nes2_rom_size(lower: u8, upper_nibble: u8, unit: usize) -> usize {
    if upper_nibble != 0x0F {
        (((upper_nibble as usize) << 8) | lower as usize).saturating_mul(unit)
    } else {
        let exponent = (lower >> 2) as u32;
        let multiplier = (lower & 0b11) as usize * 2 + 1;
        let base = 1usize.checked_shl(exponent).unwrap_or(usize::MAX);
        base.saturating_mul(multiplier)
    }
}

/// Decodes a NES 2.0 RAM shift nibble: 0 means none, otherwise 64 << shift.
fn decode_nes2_ram_size(nibble: u8) -> usize {
    if nibble == 0 { 0 } else { 64usize << nibble }
}
