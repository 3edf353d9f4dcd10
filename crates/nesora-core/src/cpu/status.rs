use bitflags::bitflags;

bitflags! {
    /// The 8-bit processor status register (P).
    ///
    /// Bit layout:
    /// 7 6 5 4 3 2 1 0
    /// N V U B D I Z C
    ///
    /// Bit 5 ("U") is not a real flag; it reads back as 1. Bit 4 ("B") only
    /// exists in the copies pushed to the stack, distinguishing BRK/PHP from
    /// hardware interrupts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        /// Carry flag (C).
        const CARRY     = 0b0000_0001;

        /// Zero flag (Z).
        const ZERO      = 0b0000_0010;

        /// Interrupt disable flag (I); masks IRQ while set.
        const INTERRUPT = 0b0000_0100;

        /// Decimal mode flag (D); stored but ignored by the 2A03.
        const DECIMAL   = 0b0000_1000;

        /// Break scratch bit (B); set in copies pushed by BRK/PHP.
        const BREAK     = 0b0001_0000;

        /// Unused bit; always reads as 1.
        const UNUSED    = 0b0010_0000;

        /// Overflow flag (V); signed arithmetic overflow.
        const OVERFLOW  = 0b0100_0000;

        /// Negative flag (N); bit 7 of the last result.
        const NEGATIVE  = 0b1000_0000;
    }
}

impl Status {
    /// Set or clear the Zero flag based on a value.
    #[inline]
    pub fn update_zero(&mut self, value: u8) {
        self.set(Status::ZERO, value == 0);
    }

    /// Set or clear the Negative flag based on bit 7 of a value.
    #[inline]
    pub fn update_negative(&mut self, value: u8) {
        self.set(Status::NEGATIVE, value & 0x80 != 0);
    }

    /// Update Z and N together, the common epilogue of most instructions.
    #[inline]
    pub fn set_zn(&mut self, value: u8) {
        self.update_zero(value);
        self.update_negative(value);
    }

    /// Restore flags from a stack byte: bit 5 is forced on, bit 4 forced off.
    #[inline]
    pub fn restore_from_stack(byte: u8) -> Self {
        let mut status = Status::from_bits_retain(byte);
        status.insert(Status::UNUSED);
        status.remove(Status::BREAK);
        status
    }
}
