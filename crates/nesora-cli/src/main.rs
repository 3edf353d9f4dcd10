//! Headless host for the nesora core.
//!
//! Three ways to exercise a ROM without a window:
//! - run N frames and print a color report, proving the pipeline drew pixels;
//! - dump the final frame as a binary PPM;
//! - step instructions against a nestest-style log and report the first
//!   divergence.

use std::{collections::HashMap, fs, io::Write, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use nesora_core::{
    Nes,
    cpu::CpuSnapshot,
    ppu::{Rgb, SCREEN_HEIGHT, SCREEN_WIDTH},
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "nesora", about = "Headless NES emulation core driver")]
struct Args {
    /// Path to an iNES / NES 2.0 ROM image.
    rom: PathBuf,

    /// Number of frames to run before reporting.
    #[arg(long, default_value_t = 60)]
    frames: usize,

    /// Compare per-instruction CPU state against a nestest-style log.
    #[arg(long)]
    trace_log: Option<PathBuf>,

    /// Override the start PC before tracing (hex, e.g. C000).
    #[arg(long)]
    start_pc: Option<String>,

    /// Write the final frame as a binary PPM.
    #[arg(long)]
    dump_ppm: Option<PathBuf>,

    /// Log at debug level instead of warn.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("installing tracing subscriber")?;

    let mut nes = Nes::new();
    nes.load_cartridge_from_file(&args.rom)
        .with_context(|| format!("loading {}", args.rom.display()))?;

    if let Some(cart) = nes.cartridge() {
        eprintln!(
            "loaded {} ({}, PRG {} KiB, CHR {} KiB)",
            args.rom.display(),
            cart.board_name(),
            cart.header().prg_rom_size / 1024,
            cart.header().chr_rom_size / 1024,
        );
    }

    if let Some(log_path) = &args.trace_log {
        return run_trace(&mut nes, log_path, args.start_pc.as_deref());
    }

    for _ in 0..args.frames {
        nes.run_frame();
    }
    print_frame_report(&nes, args.frames);

    if let Some(path) = &args.dump_ppm {
        dump_ppm(&nes, path)?;
        eprintln!("wrote {}", path.display());
    }

    Ok(())
}

/// One parsed log line: the register state expected *before* an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TraceRow {
    pc: u16,
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    sp: u8,
}

impl From<TraceRow> for CpuSnapshot {
    fn from(row: TraceRow) -> Self {
        CpuSnapshot {
            pc: row.pc,
            a: row.a,
            x: row.x,
            y: row.y,
            s: row.sp,
            p: row.p,
        }
    }
}

impl From<CpuSnapshot> for TraceRow {
    fn from(snapshot: CpuSnapshot) -> Self {
        TraceRow {
            pc: snapshot.pc,
            a: snapshot.a,
            x: snapshot.x,
            y: snapshot.y,
            p: snapshot.p,
            sp: snapshot.s,
        }
    }
}

fn parse_trace_line(line: &str) -> Option<TraceRow> {
    let pc = u16::from_str_radix(line.split_whitespace().next()?, 16).ok()?;

    let mut a = None;
    let mut x = None;
    let mut y = None;
    let mut p = None;
    let mut sp = None;
    for token in line.split_whitespace() {
        if let Some(value) = token.strip_prefix("A:") {
            a = u8::from_str_radix(value, 16).ok();
        } else if let Some(value) = token.strip_prefix("X:") {
            x = u8::from_str_radix(value, 16).ok();
        } else if let Some(value) = token.strip_prefix("Y:") {
            y = u8::from_str_radix(value, 16).ok();
        } else if let Some(value) = token.strip_prefix("P:") {
            p = u8::from_str_radix(value, 16).ok();
        } else if let Some(value) = token.strip_prefix("SP:") {
            sp = u8::from_str_radix(value, 16).ok();
        }
    }

    Some(TraceRow {
        pc,
        a: a?,
        x: x?,
        y: y?,
        p: p?,
        sp: sp?,
    })
}

fn run_trace(nes: &mut Nes, log_path: &PathBuf, start_pc: Option<&str>) -> Result<()> {
    let log = fs::read_to_string(log_path)
        .with_context(|| format!("reading trace log {}", log_path.display()))?;
    let rows: Vec<TraceRow> = log.lines().filter_map(parse_trace_line).collect();
    if rows.is_empty() {
        return Err(anyhow!("trace log appears empty or unparsable"));
    }

    // Seed the CPU to the first log entry (nestest expects a manual $C000
    // start); an explicit --start-pc overrides the logged one.
    let mut first = rows[0];
    if let Some(pc) = start_pc {
        let pc = pc.trim_start_matches("0x");
        first.pc = u16::from_str_radix(pc, 16)
            .map_err(|_| anyhow!("--start-pc expects a hex address, got {pc}"))?;
    }
    nes.set_cpu_snapshot(first.into());

    for (index, expected) in rows.iter().enumerate() {
        let actual: TraceRow = nes.cpu_snapshot().into();
        if actual != *expected {
            println!("Mismatch at instruction {index}");
            println!(
                "Expected PC:{:04X} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}",
                expected.pc, expected.a, expected.x, expected.y, expected.p, expected.sp
            );
            println!(
                "Actual   PC:{:04X} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}  ({})",
                actual.pc,
                actual.a,
                actual.x,
                actual.y,
                actual.p,
                actual.sp,
                nes.disassemble(actual.pc),
            );
            if let Some(line) = log.lines().nth(index) {
                println!("Source log line: {line}");
            }
            return Err(anyhow!("trace diverged after {index} instructions"));
        }

        nes.step_instruction();
    }

    println!(
        "Trace matched all {} log entries ({} CPU cycles)",
        rows.len(),
        nes.cpu_cycles()
    );
    Ok(())
}

fn print_frame_report(nes: &Nes, frames: usize) {
    let mut counts: HashMap<Rgb, usize> = HashMap::new();
    for &pixel in nes.frame().pixels() {
        *counts.entry(pixel).or_default() += 1;
    }

    let mut entries: Vec<(Rgb, usize)> = counts.into_iter().collect();
    entries.sort_by_key(|&(_, count)| std::cmp::Reverse(count));

    println!("Frame report after {frames} frame(s):");
    for (rank, (color, count)) in entries.iter().take(8).enumerate() {
        println!(
            "{:>2}. rgb({:3},{:3},{:3}) count {}",
            rank + 1,
            color.r,
            color.g,
            color.b,
            count
        );
    }
    if let Some((color, count)) = entries.first() {
        let total = SCREEN_WIDTH * SCREEN_HEIGHT;
        let percent = *count as f64 / total as f64 * 100.0;
        println!(
            "Dominant color rgb({},{},{}): {count} pixels ({percent:.2}%)",
            color.r, color.g, color.b
        );
    }
}

fn dump_ppm(nes: &Nes, path: &PathBuf) -> Result<()> {
    let mut out = Vec::with_capacity(SCREEN_WIDTH * SCREEN_HEIGHT * 3 + 32);
    write!(out, "P6\n{SCREEN_WIDTH} {SCREEN_HEIGHT}\n255\n")?;
    for pixel in nes.frame().pixels() {
        out.extend_from_slice(&[pixel.r, pixel.g, pixel.b]);
    }
    fs::write(path, out).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
