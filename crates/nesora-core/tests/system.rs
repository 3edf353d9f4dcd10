//! End-to-end scheduler, bus, and PPU-register behavior through the public
//! console API.

mod common;

use common::{boot, boot_with_nmi, step_instructions};
use ctor::ctor;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DOTS_PER_FRAME: u64 = 341 * 262;

#[ctor]
fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// `JMP $8000`: the smallest busy loop.
const SPIN: &[u8] = &[0x4C, 0x00, 0x80];

#[test]
fn cpu_runs_every_third_master_tick() {
    let mut nes = boot(SPIN);
    for _ in 0..1000 {
        nes.tick();
    }
    assert_eq!(nes.master_clock(), 1000);
    assert_eq!(nes.cpu_cycles(), 1000 / 3);

    for _ in 0..2 {
        nes.tick();
    }
    assert_eq!(nes.cpu_cycles(), 334);
}

#[test]
fn reset_is_idempotent() {
    let mut nes = boot(SPIN);
    step_instructions(&mut nes, 25);
    nes.run_frame();

    nes.reset();
    let once = (nes.cpu_snapshot(), nes.ppu_position(), nes.master_clock());
    nes.reset();
    let twice = (nes.cpu_snapshot(), nes.ppu_position(), nes.master_clock());
    assert_eq!(once, twice);

    // And the machine still runs after a double reset.
    step_instructions(&mut nes, 3);
    assert_eq!(nes.cpu_snapshot().pc, 0x8000);
}

#[test]
fn frames_have_the_canonical_dot_count_when_rendering_is_off() {
    let mut nes = boot(SPIN);
    nes.run_frame();
    let first = nes.master_clock();
    nes.run_frame();
    let second = nes.master_clock();
    nes.run_frame();
    let third = nes.master_clock();

    assert_eq!(second - first, DOTS_PER_FRAME);
    assert_eq!(third - second, DOTS_PER_FRAME);
}

#[test]
fn odd_frames_skip_one_dot_while_background_rendering() {
    // LDA #$08; STA $2001 (show background); JMP spin.
    let program = &[0xA9, 0x08, 0x8D, 0x01, 0x20, 0x4C, 0x05, 0x80];
    let mut nes = boot(program);

    // Let the enable write land before measuring.
    step_instructions(&mut nes, 3);

    nes.run_frame();
    let first = nes.master_clock();
    nes.run_frame();
    let second = nes.master_clock();
    nes.run_frame();
    let third = nes.master_clock();

    let deltas = [second - first, third - second];
    assert!(
        deltas.contains(&DOTS_PER_FRAME) && deltas.contains(&(DOTS_PER_FRAME - 1)),
        "expected alternating {} / {} dot frames, got {deltas:?}",
        DOTS_PER_FRAME,
        DOTS_PER_FRAME - 1,
    );
}

#[test]
fn vblank_starts_at_the_documented_dot() {
    // VBlank is raised while the PPU processes (241, 1); counting the
    // pre-render line, that dot is processed on master tick 341 * 242 + 2.
    let mut nes = boot(SPIN);
    let mut ticks = 0u64;
    loop {
        nes.tick();
        ticks += 1;
        let position = nes.ppu_position();
        if position.scanline == 241 && position.dot == 2 {
            break;
        }
    }
    assert_eq!(ticks, 341 * 242 + 2);
}

#[test]
fn nmi_reaches_the_cpu_when_enabled() {
    // Handler at $9000 increments $0000 and returns.
    // Entry: LDA #$80; STA $2000 (enable NMI); JMP spin.
    let mut program = vec![0u8; 0x1100];
    let entry = [0xA9, 0x80, 0x8D, 0x00, 0x20, 0x4C, 0x05, 0x80];
    program[..entry.len()].copy_from_slice(&entry);
    // $9000 - $8000 = $1000: INC $00; RTI.
    program[0x1000..0x1004].copy_from_slice(&[0xE6, 0x00, 0x40, 0x00]);

    let mut nes = boot_with_nmi(&program, Some(0x9000));
    assert_eq!(nes.peek_cpu(0x0000), 0);

    nes.run_frame();
    // The NMI edge rises at (241, 1), one dot after run_frame returns; give
    // the CPU a handful of instructions to take it and run the handler.
    step_instructions(&mut nes, 8);
    assert_eq!(nes.peek_cpu(0x0000), 1);

    // One NMI per frame.
    nes.run_frame();
    step_instructions(&mut nes, 8);
    assert_eq!(nes.peek_cpu(0x0000), 2);
}

#[test]
fn ppuaddr_ppudata_round_trip_through_the_cpu() {
    // LDA #$23; STA $2006; LDA #$45; STA $2006; LDA #$99; STA $2007;
    // LDA #$23; STA $2006; LDA #$45; STA $2006;
    // LDA $2007 (prime buffer); LDA $2007; STA $10; JMP spin.
    let program = &[
        0xA9, 0x23, 0x8D, 0x06, 0x20, // LDA/STA $2006 high
        0xA9, 0x45, 0x8D, 0x06, 0x20, // LDA/STA $2006 low
        0xA9, 0x99, 0x8D, 0x07, 0x20, // LDA/STA $2007
        0xA9, 0x23, 0x8D, 0x06, 0x20, // re-seed the address
        0xA9, 0x45, 0x8D, 0x06, 0x20, //
        0xAD, 0x07, 0x20, // LDA $2007 (stale buffer)
        0xAD, 0x07, 0x20, // LDA $2007 (real data)
        0x85, 0x10, // STA $10
        0x4C, 0x21, 0x80, // spin
    ];
    let mut nes = boot(program);
    step_instructions(&mut nes, 16);

    assert_eq!(nes.peek_ppu(0x2345), 0x99);
    assert_eq!(nes.peek_cpu(0x0010), 0x99);
}

#[test]
fn ram_aliases_through_the_cartridge_program() {
    // LDA #$5A; STA $0002; LDA $0802; STA $0010; JMP spin.
    let program = &[
        0xA9, 0x5A, 0x8D, 0x02, 0x00, 0xAD, 0x02, 0x08, 0x8D, 0x10, 0x00, 0x4C, 0x0B, 0x80,
    ];
    let mut nes = boot(program);
    step_instructions(&mut nes, 5);

    assert_eq!(nes.peek_cpu(0x0002), 0x5A);
    assert_eq!(nes.peek_cpu(0x1802), 0x5A);
    assert_eq!(nes.peek_cpu(0x0010), 0x5A);
}

#[test]
fn palette_writes_reach_the_backdrop_mirrors() {
    // Write $21 to $3F10 via PPUADDR/PPUDATA; the backdrop at $3F00 must see it.
    let program = &[
        0xA9, 0x3F, 0x8D, 0x06, 0x20, // $2006 <- $3F
        0xA9, 0x10, 0x8D, 0x06, 0x20, // $2006 <- $10
        0xA9, 0x21, 0x8D, 0x07, 0x20, // $2007 <- $21
        0x4C, 0x0F, 0x80, // spin
    ];
    let mut nes = boot(program);
    step_instructions(&mut nes, 7);

    assert_eq!(nes.peek_ppu(0x3F00), 0x21);
    assert_eq!(nes.peek_ppu(0x3F10), 0x21);
}

#[test]
fn backdrop_color_fills_the_frame_when_rendering_is_off() {
    // Set the universal background to palette index $21 (a light blue) and
    // let a frame render with the background disabled.
    let program = &[
        0xA9, 0x3F, 0x8D, 0x06, 0x20, // $2006 <- $3F
        0xA9, 0x00, 0x8D, 0x06, 0x20, // $2006 <- $00
        0xA9, 0x21, 0x8D, 0x07, 0x20, // $2007 <- $21
        0x4C, 0x0F, 0x80, // spin
    ];
    let mut nes = boot(program);
    step_instructions(&mut nes, 7);

    nes.run_frame();
    let frame = nes.run_frame();
    let expected = nesora_core::ppu::PALETTE_MAP[0x21];
    assert!(frame.pixels().iter().all(|&pixel| pixel == expected));
}

#[test]
fn step_instruction_advances_exactly_one_instruction() {
    let mut nes = boot(SPIN);
    // Drain the 8-cycle reset stall.
    nes.step_instruction();
    let pc_before = nes.cpu_snapshot().pc;
    let cycles_before = nes.cpu_cycles();

    nes.step_instruction();
    assert_eq!(nes.cpu_snapshot().pc, pc_before);
    // JMP absolute costs three CPU cycles.
    assert_eq!(nes.cpu_cycles() - cycles_before, 3);
}
