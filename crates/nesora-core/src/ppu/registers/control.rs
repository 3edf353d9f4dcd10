use bitflags::bitflags;

bitflags! {
    /// PPU control register (`$2000`).
    ///
    /// Bit layout:
    /// ```text
    /// 7 6 5 4 3 2 1 0
    /// V P H B S I N N
    /// ```
    /// - `N N`: base nametable select
    /// - `I`: VRAM increment (0=+1, 1=+32)
    /// - `S`: sprite pattern table (8x8)
    /// - `B`: background pattern table
    /// - `H`: sprite size (0=8x8, 1=8x16)
    /// - `P`: master/slave select
    /// - `V`: generate NMI at VBlank start
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct Control: u8 {
        /// Selects the base nametable address (bits 0 and 1).
        const NAMETABLE = 0b0000_0011;

        /// Controls the VRAM address increment unit (bit 2).
        /// `0` increments by 1 (across), `1` by 32 (down).
        const INCREMENT_32 = 0b0000_0100;

        /// Selects the sprite pattern table for 8x8 sprites (bit 3).
        const SPRITE_TABLE = 0b0000_1000;

        /// Selects the background pattern table (bit 4).
        /// `0` uses `$0000`, `1` uses `$1000`.
        const BACKGROUND_TABLE = 0b0001_0000;

        /// Chooses the sprite size (bit 5).
        const SPRITE_SIZE_16 = 0b0010_0000;

        /// Master/slave select (bit 6).
        const MASTER_SLAVE = 0b0100_0000;

        /// Enables NMI generation at the start of VBlank (bit 7).
        const GENERATE_NMI = 0b1000_0000;
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::empty()
    }
}

impl Control {
    /// Returns the nametable select bits (0..3).
    pub(crate) fn nametable_index(self) -> u8 {
        self.bits() & 0b11
    }

    /// Returns the VRAM increment amount (1 or 32) based on bit 2.
    pub(crate) fn vram_increment(self) -> u16 {
        if self.contains(Control::INCREMENT_32) {
            32
        } else {
            1
        }
    }

    /// Returns the background pattern table base address.
    pub(crate) fn background_pattern_table(self) -> u16 {
        if self.contains(Control::BACKGROUND_TABLE) {
            0x1000
        } else {
            0x0000
        }
    }

    /// Indicates whether the PPU should fire an NMI during VBlank.
    pub(crate) fn nmi_enabled(self) -> bool {
        self.contains(Control::GENERATE_NMI)
    }
}
