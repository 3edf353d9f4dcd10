//! RP2C02 Picture Processing Unit with dot-level timing.
//!
//! **Quick primer**
//! - The PPU draws 262 scanlines per frame. Scanline `-1` is the *pre-render*
//!   line, `0..=239` are visible, `240` is post-render, and `241..=260` are
//!   vblank. Each scanline has 341 dots.
//! - The CPU sees eight registers at `$2000-$2007` (mirrored to `$3FFF`).
//!   Most PPU state lives in small internal latches (`v/t/x/w`) and shift
//!   registers; mirroring that structure is what makes the code look odd in
//!   places.
//! - Background fetch hardware works in 8-dot tile slots: nametable byte,
//!   attribute byte, two pattern bitplanes, then a coarse-X increment. At
//!   every tile boundary the fetched bytes reload the background shifters.
//! - Odd frames drop dot 0 of the pre-render line while rendering is on,
//!   which keeps NTSC timing aligned with the master clock.
//!
//! Sprite evaluation and rendering are not modeled; OAM exists only as a
//! register-visible byte array so `$2003/$2004` behave.

pub mod palette;

mod background_pipeline;
mod frame;
mod registers;

pub use frame::{Frame, FrameSink, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use palette::{PALETTE_MAP, Rgb};

use tracing::warn;

use crate::{
    cartridge::{Cartridge, mapper::NametableTarget},
    memory::ppu::{self as ppu_mem, Register as PpuRegister},
    ppu::{
        background_pipeline::{BgPipeline, FetchLatches},
        palette::PaletteRam,
        registers::{Mask, Registers, Status},
    },
    ram::ppu::Vram,
};

const DOTS_PER_SCANLINE: u16 = 341;
const PRERENDER_SCANLINE: i16 = -1;
const LAST_SCANLINE: i16 = 260;
const VBLANK_SCANLINE: i16 = 241;

/// Minimal PPU timing snapshot for debuggers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PpuPosition {
    pub scanline: i16,
    pub dot: u16,
    pub frame: u64,
}

/// Temporary view that lets the PPU reach the cartridge without storing a
/// back-reference. The owner builds one per call, so lifetimes stay explicit
/// and borrow-checked.
#[derive(Default)]
pub struct PatternBus<'a> {
    cartridge: Option<&'a mut Cartridge>,
}

impl<'a> PatternBus<'a> {
    pub fn new(cartridge: Option<&'a mut Cartridge>) -> Self {
        Self { cartridge }
    }

    fn read(&mut self, addr: u16) -> Option<u8> {
        self.cartridge.as_deref_mut().and_then(|cart| cart.ppu_read(addr))
    }

    fn write(&mut self, addr: u16, value: u8) -> bool {
        self.cartridge
            .as_deref_mut()
            .map(|cart| cart.ppu_write(addr, value))
            .unwrap_or(false)
    }

    fn nametable_mirror(&self, addr: u16) -> NametableTarget {
        match self.cartridge.as_deref() {
            Some(cart) => cart.nametable_mirror(addr),
            // No cartridge: fall back to a fixed page so the bus stays total.
            None => NametableTarget {
                index: 0,
                offset: addr & 0x03FF,
            },
        }
    }
}

/// The 2C02 core: register file, VRAM, palette, and the dot state machine.
#[derive(Debug, Clone)]
pub struct Ppu {
    /// CPU-visible registers and the internal `v/t/x/w` latches.
    registers: Registers,
    /// Core-owned VRAM: the two physical 1 KiB nametable pages.
    vram: Vram,
    /// Dedicated palette RAM behind `$3F00-$3FFF`.
    palette_ram: PaletteRam,
    /// Current dot (0..=340) within the active scanline.
    dot: u16,
    /// Current scanline. `-1` is the pre-render line.
    pub(crate) scanline: i16,
    /// Total number of frames produced so far.
    frame_count: u64,
    /// Whether the current frame is odd, for the skipped-dot rule.
    odd_frame: bool,
    /// Background shifters.
    bg: BgPipeline,
    /// Fetch latches filled across each 8-dot tile slot.
    latches: FetchLatches,
    /// Current level of the NMI output line (VBlank && enable).
    nmi_output: bool,
    /// Rising edge on the NMI line, consumed by the scheduler.
    nmi_edge: bool,
    /// Set at (241, 1) when the frame below is complete.
    frame_ready: bool,
    /// Last value that crossed the register file, for open-bus reads.
    bus_latch: u8,
    /// The frame being rendered / last completed frame.
    frame: Frame,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            registers: Registers::new(),
            vram: Vram::new(),
            palette_ram: PaletteRam::new(),
            dot: 0,
            scanline: PRERENDER_SCANLINE,
            frame_count: 0,
            odd_frame: false,
            bg: BgPipeline::new(),
            latches: FetchLatches::default(),
            nmi_output: false,
            nmi_edge: false,
            frame_ready: false,
            bus_latch: 0,
            frame: Frame::new(),
        }
    }

    /// Restores the device to its power-on state.
    pub fn reset(&mut self) {
        self.registers.reset();
        self.vram.fill(0);
        self.palette_ram.reset();
        self.dot = 0;
        self.scanline = PRERENDER_SCANLINE;
        self.frame_count = 0;
        self.odd_frame = false;
        self.bg.clear();
        self.latches = FetchLatches::default();
        self.nmi_output = false;
        self.nmi_edge = false;
        self.frame_ready = false;
        self.bus_latch = 0;
        self.frame.clear();
    }

    /// Current timing position.
    pub fn position(&self) -> PpuPosition {
        PpuPosition {
            scanline: self.scanline,
            dot: self.dot,
            frame: self.frame_count,
        }
    }

    pub fn scanline(&self) -> i16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    /// Frame counter (increments when the scanline wraps back to -1).
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The frame surface. Complete from (241, 1) until the next frame's
    /// first visible dot overwrites it.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Last value seen on the register-file bus, i.e. what open-bus reads
    /// of write-only registers return.
    pub(crate) fn bus_latch(&self) -> u8 {
        self.bus_latch
    }

    /// Side-effect-free view of the PPU address space for debuggers.
    pub(crate) fn peek(&self, cartridge: Option<&Cartridge>, addr: u16) -> u8 {
        let addr = addr & ppu_mem::VRAM_MIRROR_MASK;
        if addr >= ppu_mem::PALETTE_BASE {
            return self.palette_ram.read(addr);
        }
        if addr <= ppu_mem::PATTERN_TABLE_END {
            return cartridge.and_then(|cart| cart.ppu_read(addr)).unwrap_or(0);
        }

        let addr = ppu_mem::NAMETABLE_BASE | (addr & 0x0FFF);
        match cartridge {
            Some(cart) => match cart.ppu_read(addr) {
                Some(value) => value,
                None => self.vram[vram_index(cart.nametable_mirror(addr))],
            },
            None => self.vram[(addr & 0x03FF) as usize],
        }
    }

    /// Consumes the pending NMI edge, if any.
    pub(crate) fn take_nmi_edge(&mut self) -> bool {
        std::mem::take(&mut self.nmi_edge)
    }

    /// Consumes the frame-complete signal raised at (241, 1).
    pub(crate) fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    /// Advances the PPU by a single dot.
    ///
    /// This is the main timing entry: it runs the background fetch/shift
    /// pipeline, maintains the scroll registers, renders pixels on visible
    /// scanlines, and manages VBlank/NMI. Call three times per CPU clock.
    pub fn clock(&mut self, pattern: &mut PatternBus<'_>) {
        let rendering = self
            .registers
            .mask
            .contains(Mask::SHOW_BACKGROUND);
        let prev_output = self.nmi_output;

        // Odd frames drop dot 0 of the pre-render line while rendering is
        // enabled: process dot 1 in its place.
        if self.scanline == PRERENDER_SCANLINE && self.dot == 0 && self.odd_frame && rendering {
            self.dot = 1;
        }

        if self.scanline == PRERENDER_SCANLINE && self.dot == 1 {
            // VBlank and sprite flags drop at dot 1 of the pre-render line.
            self.registers.status.remove(
                Status::VERTICAL_BLANK | Status::SPRITE_ZERO_HIT | Status::SPRITE_OVERFLOW,
            );
        }

        let on_render_line = self.scanline == PRERENDER_SCANLINE || self.visible_scanline();
        if on_render_line {
            if self.visible_scanline() && (1..=256).contains(&self.dot) {
                self.render_pixel();
            }

            if rendering {
                match self.dot {
                    1..=256 => {
                        self.bg.shift();
                        self.background_fetch_step(pattern);
                    }
                    257 => {
                        let t = self.registers.vram.t;
                        self.registers.vram.v.copy_horizontal_from(t);
                    }
                    280..=304 if self.scanline == PRERENDER_SCANLINE => {
                        let t = self.registers.vram.t;
                        self.registers.vram.v.copy_vertical_from(t);
                    }
                    // Prefetch of the next line's first two tiles. Dot 337
                    // only reloads; the shifters do not advance there.
                    321..=337 => {
                        if self.dot <= 336 {
                            self.bg.shift();
                        }
                        self.background_fetch_step(pattern);
                    }
                    _ => {}
                }
            }
        }

        if self.scanline == VBLANK_SCANLINE && self.dot == 1 {
            self.registers.status.insert(Status::VERTICAL_BLANK);
            self.frame_ready = true;
        }

        self.update_nmi_output(prev_output);
        self.advance_dot();
    }

    /// One step of the 8-dot background fetch cadence.
    ///
    /// Dot phase within the slot: 1 = reload + NT, 3 = AT, 5 = pattern low,
    /// 7 = pattern high, 0 = scroll increment. The reload is skipped at the
    /// very first fetch dots (1 and 321) because the latches still hold the
    /// previous slot's bytes.
    fn background_fetch_step(&mut self, pattern: &mut PatternBus<'_>) {
        let v = self.registers.vram.v;
        match self.dot % 8 {
            1 => {
                if self.dot != 1 && self.dot != 321 {
                    self.bg.reload(&self.latches);
                }
                self.latches.nametable = self.read_vram(pattern, v.tile_addr());
            }
            3 => {
                let attribute = self.read_vram(pattern, v.attribute_addr());
                let quadrant = ((v.raw() >> 4) & 0b100) | (v.raw() & 0b010);
                self.latches.set_attribute((attribute >> quadrant) & 0b11);
            }
            5 => {
                self.latches.pattern_low = self.read_vram(pattern, self.pattern_addr(v));
            }
            7 => {
                self.latches.pattern_high = self.read_vram(pattern, self.pattern_addr(v) | 8);
            }
            0 => {
                if self.dot == 256 {
                    self.registers.vram.v.increment_fine_y();
                } else {
                    self.registers.vram.v.increment_coarse_x();
                }
            }
            _ => {}
        }
    }

    /// Pattern table address of the current tile row.
    fn pattern_addr(&self, v: registers::VramAddr) -> u16 {
        self.registers.control.background_pattern_table()
            | ((self.latches.nametable as u16) << 4)
            | v.fine_y() as u16
    }

    /// Emits one pixel from the shifters into the frame.
    fn render_pixel(&mut self) {
        let x = (self.dot - 1) as usize;
        let y = self.scanline as usize;

        let mask = self.registers.mask;
        let bg_visible = mask.contains(Mask::SHOW_BACKGROUND)
            && (x >= 8 || mask.contains(Mask::SHOW_BACKGROUND_LEFT));

        let (palette_bits, pattern_bits) = if bg_visible {
            self.bg.sample(self.registers.vram.x)
        } else {
            (0, 0)
        };

        // Pattern value 0 always resolves to the universal background color.
        let palette_addr = if pattern_bits == 0 {
            ppu_mem::PALETTE_BASE
        } else {
            ppu_mem::PALETTE_BASE | ((palette_bits as u16) << 2) | pattern_bits as u16
        };
        let color_index = self.palette_ram.read(palette_addr) & 0x3F;
        self.frame.set_pixel(x, y, PALETTE_MAP[color_index as usize]);
    }

    /// Advances to the next dot / scanline / frame.
    fn advance_dot(&mut self) {
        self.dot += 1;
        if self.dot >= DOTS_PER_SCANLINE {
            self.dot = 0;
            self.scanline += 1;

            if self.scanline > LAST_SCANLINE {
                self.scanline = PRERENDER_SCANLINE;
                self.frame_count = self.frame_count.wrapping_add(1);
                self.odd_frame = !self.odd_frame;
            }
        }
    }

    /// Recomputes the NMI output line (VBlank && enable), latching an edge
    /// for the scheduler on every rising transition. Covers both the (241, 1)
    /// VBlank set and PPUCTRL enabling NMI while VBlank is already high.
    fn update_nmi_output(&mut self, prev_output: bool) {
        self.nmi_output = self.registers.status.contains(Status::VERTICAL_BLANK)
            && self.registers.control.nmi_enabled();
        if self.nmi_output && !prev_output {
            self.nmi_edge = true;
        }
    }

    fn visible_scanline(&self) -> bool {
        (0..=239).contains(&self.scanline)
    }

    /// Handles CPU writes to the mirrored PPU register space (`$2000-$3FFF`).
    pub fn cpu_write(&mut self, addr: u16, value: u8, pattern: &mut PatternBus<'_>) {
        self.bus_latch = value;
        match PpuRegister::from_cpu_addr(addr) {
            PpuRegister::Control => {
                let prev_output = self.nmi_output;
                self.registers.write_control(value);
                self.update_nmi_output(prev_output);
            }
            PpuRegister::Mask => self.registers.mask = Mask::from_bits_retain(value),
            PpuRegister::Status => {} // read-only
            PpuRegister::OamAddr => self.registers.oam_addr = value,
            PpuRegister::OamData => {
                let idx = self.registers.oam_addr as usize;
                self.registers.oam[idx] = value;
                self.registers.oam_addr = self.registers.oam_addr.wrapping_add(1);
            }
            PpuRegister::Scroll => self.registers.vram.write_scroll(value),
            PpuRegister::Addr => self.registers.vram.write_addr(value),
            PpuRegister::Data => {
                let target = self.registers.vram.v.raw() & ppu_mem::VRAM_MIRROR_MASK;
                self.write_vram(pattern, target, value);
                let step = self.registers.control.vram_increment();
                self.registers.vram.v.increment(step);
            }
        }
    }

    /// Handles CPU reads from the mirrored PPU register space.
    ///
    /// Write-only registers return the last value seen on the register file
    /// bus, approximating open-bus behavior.
    pub fn cpu_read(&mut self, addr: u16, pattern: &mut PatternBus<'_>) -> u8 {
        let value = match PpuRegister::from_cpu_addr(addr) {
            PpuRegister::Status => self.read_status(),
            PpuRegister::OamData => {
                let idx = self.registers.oam_addr as usize;
                self.registers.oam[idx]
            }
            PpuRegister::Data => self.read_data(pattern),
            _ => self.bus_latch,
        };
        self.bus_latch = value;
        value
    }

    /// `$2002`: the three status bits over the open-bus low bits; clears
    /// VBlank and the `w` write toggle.
    fn read_status(&mut self) -> u8 {
        let prev_output = self.nmi_output;
        let value = (self.registers.status.bits() & 0xE0) | (self.bus_latch & 0x1F);
        self.registers.status.remove(Status::VERTICAL_BLANK);
        self.registers.vram.reset_latch();
        self.update_nmi_output(prev_output);
        value
    }

    /// `$2007`: buffered VRAM read with the palette bypass.
    fn read_data(&mut self, pattern: &mut PatternBus<'_>) -> u8 {
        let addr = self.registers.vram.v.raw() & ppu_mem::VRAM_MIRROR_MASK;
        let value = if addr >= ppu_mem::PALETTE_BASE {
            // Palette reads return directly; the buffer picks up the
            // nametable byte hiding beneath the palette window.
            let buffered = self.read_vram(pattern, addr & 0x2FFF);
            let value = self.palette_ram.read(addr);
            self.registers.read_buffer = buffered;
            value
        } else {
            let buffered = self.registers.read_buffer;
            self.registers.read_buffer = self.read_vram(pattern, addr);
            buffered
        };

        let step = self.registers.control.vram_increment();
        self.registers.vram.v.increment(step);
        value
    }

    /// PPU-bus read: pattern tables to the mapper, nametables through the
    /// mirroring policy into VRAM, palette range to palette RAM.
    fn read_vram(&mut self, pattern: &mut PatternBus<'_>, addr: u16) -> u8 {
        let addr = addr & ppu_mem::VRAM_MIRROR_MASK;
        if addr >= ppu_mem::PALETTE_BASE {
            return self.palette_ram.read(addr);
        }
        if addr <= ppu_mem::PATTERN_TABLE_END {
            return match pattern.read(addr) {
                Some(value) => value,
                None => {
                    warn!("unhandled PPU bus read at {addr:04X}");
                    0
                }
            };
        }

        // $3000-$3EFF aliases $2000-$2EFF.
        let addr = ppu_mem::NAMETABLE_BASE | (addr & 0x0FFF);
        match pattern.read(addr) {
            // Boards with their own nametable memory (four-screen) claim these.
            Some(value) => value,
            None => {
                let target = pattern.nametable_mirror(addr);
                self.vram[vram_index(target)]
            }
        }
    }

    /// PPU-bus write counterpart of [`Ppu::read_vram`].
    fn write_vram(&mut self, pattern: &mut PatternBus<'_>, addr: u16, value: u8) {
        let addr = addr & ppu_mem::VRAM_MIRROR_MASK;
        if addr >= ppu_mem::PALETTE_BASE {
            self.palette_ram.write(addr, value);
            return;
        }
        if addr <= ppu_mem::PATTERN_TABLE_END {
            if !pattern.write(addr, value) {
                warn!("unhandled PPU bus write at {addr:04X}");
            }
            return;
        }

        let addr = ppu_mem::NAMETABLE_BASE | (addr & 0x0FFF);
        if !pattern.write(addr, value) {
            let target = pattern.nametable_mirror(addr);
            self.vram[vram_index(target)] = value;
        }
    }
}

fn vram_index(target: NametableTarget) -> usize {
    (target.index as usize) * ppu_mem::NAMETABLE_SIZE as usize + (target.offset & 0x03FF) as usize
}
