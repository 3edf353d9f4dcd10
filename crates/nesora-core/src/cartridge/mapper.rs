//! Cartridge board abstraction.
//!
//! The core never touches PRG/CHR storage directly; every cartridge-range
//! access goes through a [`Mapper`] trait object that owns the ROM sections,
//! any work RAM, and whatever bank registers the board carries. The trait also
//! answers the nametable-mirroring question for the PPU bus, since mirroring
//! is wired (or switched) on the cartridge side of the connector.

use std::borrow::Cow;
use std::fmt::Debug;

use dyn_clone::DynClone;

use crate::{
    cartridge::header::{Header, Mirroring},
    error::Error,
};

mod mapper0;

pub use mapper0::Mapper0;

/// Resolved nametable location: which of the two core-owned 1 KiB VRAM pages
/// services an address, and the offset within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NametableTarget {
    /// VRAM page index (0 or 1).
    pub index: u8,
    /// Offset inside the page (0..1024).
    pub offset: u16,
}

/// Contract between the core and a cartridge board.
///
/// `cpu_read`/`cpu_write` receive the full 16-bit CPU address but are only
/// invoked for `$4020-$FFFF`; the `Option`/`bool` results report whether the
/// board serviced the access. `ppu_read`/`ppu_write` receive the 14-bit PPU
/// address; the pattern range `$0000-$1FFF` is always board-owned, while a
/// `None`/`false` answer for the nametable range defers to core VRAM through
/// [`Mapper::nametable_mirror`]. Boards with their own nametable memory
/// (four-screen) claim those accesses instead.
pub trait Mapper: DynClone + Debug {
    fn cpu_read(&self, addr: u16) -> Option<u8>;

    fn cpu_write(&mut self, addr: u16, data: u8) -> bool;

    fn ppu_read(&self, addr: u16) -> Option<u8>;

    fn ppu_write(&mut self, addr: u16, data: u8) -> bool;

    /// Resolves a nametable-range address (`$2000-$3EFF`, already masked to
    /// `$2xxx`) to one of the two VRAM pages per the board's mirroring.
    fn nametable_mirror(&self, addr: u16) -> NametableTarget {
        mirror_nametable(self.mirroring(), addr)
    }

    /// Hardwired (or currently selected) mirroring mode.
    fn mirroring(&self) -> Mirroring;

    /// The board's mapper number.
    fn mapper_id(&self) -> u16;

    /// Human-readable board name for logs and debuggers.
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("mapper {}", self.mapper_id()))
    }
}

dyn_clone::clone_trait_object!(Mapper);

/// Standard mirroring policies, shared by boards without nametable memory.
pub(crate) fn mirror_nametable(mirroring: Mirroring, addr: u16) -> NametableTarget {
    let offset = addr & 0x03FF;
    let index = match mirroring {
        Mirroring::Vertical => ((addr >> 10) & 1) as u8,
        Mirroring::Horizontal => ((addr >> 11) & 1) as u8,
        Mirroring::SingleScreenLower => 0,
        Mirroring::SingleScreenUpper => 1,
        // Four-screen boards answer ppu_read/ppu_write themselves; falling
        // through here only happens for the first 2 KiB, which maps linearly.
        Mirroring::FourScreen => ((addr >> 10) & 1) as u8,
    };
    NametableTarget { index, offset }
}

/// Instantiates the board matching the header's mapper id.
pub fn build_mapper(
    header: &Header,
    prg_rom: Vec<u8>,
    chr_rom: Vec<u8>,
    trainer: Option<&[u8]>,
) -> Result<Box<dyn Mapper>, Error> {
    match header.mapper {
        0 => Ok(Box::new(Mapper0::new(header, prg_rom, chr_rom, trainer))),
        mapper => Err(Error::UnknownMapper { mapper }),
    }
}
