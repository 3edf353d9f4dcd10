#![allow(dead_code)]

use nesora_core::Nes;

pub const PRG_BANK: usize = 16 * 1024;
pub const CHR_BANK: usize = 8 * 1024;

/// Entry point all built ROMs use.
pub const ENTRY: u16 = 0x8000;

/// Builds a minimal NROM image: one 16 KiB PRG bank (mirrored into both CPU
/// windows) holding `program` at `$8000`, one 8 KiB CHR bank, vertical
/// mirroring. The reset vector points at the program; `nmi` optionally wires
/// the NMI vector to a handler address.
pub fn build_rom(program: &[u8], nmi: Option<u16>) -> Vec<u8> {
    assert!(program.len() <= PRG_BANK - 6, "program too large");

    let mut prg = vec![0u8; PRG_BANK];
    prg[..program.len()].copy_from_slice(program);

    // Vectors live at the top of the bank ($FFFA-$FFFF maps to $3FFA-$3FFF).
    if let Some(nmi) = nmi {
        prg[0x3FFA] = nmi as u8;
        prg[0x3FFB] = (nmi >> 8) as u8;
    }
    prg[0x3FFC] = ENTRY as u8;
    prg[0x3FFD] = (ENTRY >> 8) as u8;

    let mut rom = vec![
        b'N', b'E', b'S', 0x1A, 1, 1, 0b0000_0001, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ];
    rom.extend_from_slice(&prg);
    rom.extend_from_slice(&vec![0u8; CHR_BANK]);
    rom
}

/// Boots a console with the given program installed.
pub fn boot(program: &[u8]) -> Nes {
    boot_with_nmi(program, None)
}

pub fn boot_with_nmi(program: &[u8], nmi: Option<u16>) -> Nes {
    let mut nes = Nes::new();
    nes.load_cartridge_from_bytes(&build_rom(program, nmi))
        .expect("test ROM should parse");
    nes
}

/// Steps until the reset stall has drained and `count` further instructions
/// have completed.
pub fn step_instructions(nes: &mut Nes, count: usize) {
    for _ in 0..count {
        nes.step_instruction();
    }
}
