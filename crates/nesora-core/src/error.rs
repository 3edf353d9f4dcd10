use std::{fmt, io};

use crate::cartridge::header::RomFormat;

/// Region of a ROM image being decoded when a failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Header,
    Trainer,
    PrgRom,
    ChrRom,
}

impl Region {
    const fn describe(self) -> &'static str {
        match self {
            Region::Header => "header",
            Region::Trainer => "trainer",
            Region::PrgRom => "PRG ROM",
            Region::ChrRom => "CHR ROM",
        }
    }
}

/// Why a cartridge failed to load. Construction of the console never
/// proceeds past a load failure, so every variant is surfaced to the caller
/// before any emulation state exists.
#[derive(Debug)]
pub enum Error {
    /// The image does not begin with the iNES magic bytes.
    BadMagic,
    /// The header announces a layout this core does not decode.
    UnsupportedFormat(RomFormat),
    /// The image ended inside `region`: the header promised more data.
    ShortRead {
        region: Region,
        needed: usize,
        available: usize,
    },
    /// No board implementation is registered for this mapper number.
    UnknownMapper { mapper: u16 },
    /// The board is known but needs a capability the core does not model.
    UnsupportedMapperFeature { mapper: u16, feature: &'static str },
    /// Reading the image from disk failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => f.write_str("not an iNES image (magic bytes missing)"),
            Self::UnsupportedFormat(format) => {
                write!(f, "cannot decode {format:?} ROM headers")
            }
            Self::ShortRead {
                region,
                needed,
                available,
            } => write!(
                f,
                "ROM image truncated in {}: {needed} bytes promised, {available} present",
                region.describe()
            ),
            Self::UnknownMapper { mapper } => {
                write!(f, "mapper {mapper} has no board implementation")
            }
            Self::UnsupportedMapperFeature { mapper, feature } => {
                write!(f, "mapper {mapper} needs unsupported capability: {feature}")
            }
            Self::Io(err) => write!(f, "reading ROM image failed: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::Io(err) = self {
            Some(err)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
