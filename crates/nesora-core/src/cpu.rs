//! 2A03 CPU core: a 6502 without decimal mode.
//!
//! The interpreter is driven one clock at a time. When the remaining-cycle
//! counter hits zero the next instruction is fetched, decoded through the
//! 256-entry [`lookup::OPCODE_TABLE`], addressed, and executed in full; the
//! counter is then charged with the instruction's cycle cost (base plus any
//! page-cross or branch extras) and burned down on subsequent clocks. This
//! gives instruction-accurate timing with a single commit point per
//! instruction.
//!
//! Interrupts are modeled as pending flags sampled at instruction
//! boundaries, which matches the hardware's delivery granularity without any
//! back-reference from the interrupt sources to the CPU.

use std::fmt::{self, Debug};

use tracing::{debug, warn};

use crate::bus::Bus;
use crate::cpu::addressing::Addressing;
use crate::cpu::lookup::{Instruction, OPCODE_TABLE};
use crate::cpu::mnemonic::Mnemonic;
use crate::cpu::status::Status;
use crate::memory::cpu::{
    APU_IO_BASE, APU_STATUS, CONTROLLER_PORT_2, IRQ_VECTOR_HI, IRQ_VECTOR_LO, NMI_VECTOR_HI,
    NMI_VECTOR_LO, RESET_VECTOR_HI, RESET_VECTOR_LO, STACK_PAGE_START,
};

pub mod addressing;
pub mod lookup;
pub mod mnemonic;
pub mod status;

/// Lightweight CPU register snapshot used for tracing/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuSnapshot {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: u8,
}

/// Minimal opcode metadata for debugging / disassembly helpers.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeMeta {
    pub mnemonic: Mnemonic,
    pub addressing: Addressing,
}

/// Returns the mnemonic and addressing mode for a raw opcode byte.
pub fn opcode_meta(opcode: u8) -> OpcodeMeta {
    let instr = &OPCODE_TABLE[opcode as usize];
    OpcodeMeta {
        mnemonic: instr.mnemonic,
        addressing: instr.addressing,
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cpu {
    pub(crate) a: u8,     // Accumulator
    pub(crate) x: u8,     // X index register
    pub(crate) y: u8,     // Y index register
    pub(crate) s: u8,     // Stack pointer into $0100-$01FF
    pub(crate) p: Status, // Processor status
    pub(crate) pc: u16,   // Program counter

    /// Remaining cycles of the instruction in flight.
    cycles_left: u8,
    /// Total CPU cycles since reset, for traces and tests.
    total_cycles: u64,

    // Per-instruction scratch.
    opcode: u8,
    operand: u8,
    effective_addr: u16,
    page_crossed: bool,

    nmi_pending: bool,
    irq_pending: bool,
}

impl Cpu {
    /// Creates a CPU in its pre-reset state. Call [`Cpu::reset`] before
    /// clocking; the program counter is only valid after the vector fetch.
    pub(crate) fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0xFD,
            p: Status::from_bits_retain(0x34),
            pc: 0,
            cycles_left: 0,
            total_cycles: 0,
            opcode: 0,
            operand: 0,
            effective_addr: 0,
            page_crossed: false,
            nmi_pending: false,
            irq_pending: false,
        }
    }

    /// Applies the power-on/reset sequence: registers to their documented
    /// power-up values, the APU register block cleared through the bus, PC
    /// loaded from `$FFFC/$FFFD`, and 8 cycles charged before the first
    /// instruction executes.
    pub(crate) fn reset<B: Bus>(&mut self, bus: &mut B) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        // Power-up leaves S at 0; the reset sequence then decrements it by 3
        // without pushing, landing on $FD.
        self.s = 0u8.wrapping_sub(3);
        self.p = Status::from_bits_retain(0x34);

        bus.write(APU_STATUS, 0); // all channels disabled
        bus.write(CONTROLLER_PORT_2, 0); // frame IRQ disabled
        for addr in APU_IO_BASE..=0x4013 {
            bus.write(addr, 0);
        }

        let lo = bus.read(RESET_VECTOR_LO);
        let hi = bus.read(RESET_VECTOR_HI);
        self.pc = u16::from_le_bytes([lo, hi]);

        self.opcode = 0;
        self.operand = 0;
        self.effective_addr = 0;
        self.page_crossed = false;
        self.nmi_pending = false;
        self.irq_pending = false;
        self.total_cycles = 0;
        self.cycles_left = 8;
    }

    /// Advances the CPU by one clock. Returns `true` when the tick completed
    /// an instruction (or interrupt sequence), i.e. the next clock will fetch.
    pub(crate) fn clock<B: Bus>(&mut self, bus: &mut B) -> bool {
        if self.cycles_left == 0 {
            self.begin_instruction(bus);
        }
        self.cycles_left -= 1;
        self.total_cycles += 1;
        self.cycles_left == 0
    }

    /// Latches a pending NMI, consumed at the next instruction boundary.
    pub(crate) fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Latches a pending IRQ; delivered at the next boundary unless masked.
    pub(crate) fn request_irq(&mut self) {
        self.irq_pending = true;
    }

    /// Captures the current CPU registers for tracing/debugging.
    pub(crate) fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            pc: self.pc,
            a: self.a,
            x: self.x,
            y: self.y,
            s: self.s,
            p: self.p.bits(),
        }
    }

    /// Overwrites the register file from a snapshot and clears any
    /// instruction in flight. Used by trace harnesses that seed a start PC.
    pub(crate) fn load_snapshot(&mut self, snapshot: CpuSnapshot) {
        self.a = snapshot.a;
        self.x = snapshot.x;
        self.y = snapshot.y;
        self.s = snapshot.s;
        self.p = Status::from_bits_retain(snapshot.p) | Status::UNUSED;
        self.pc = snapshot.pc;
        self.cycles_left = 0;
    }

    /// Total CPU cycles executed since reset.
    pub(crate) fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    fn begin_instruction<B: Bus>(&mut self, bus: &mut B) {
        if self.nmi_pending {
            self.nmi_pending = false;
            self.interrupt(bus, NMI_VECTOR_LO, NMI_VECTOR_HI);
            self.cycles_left = 7;
            return;
        }
        if self.irq_pending {
            self.irq_pending = false;
            if !self.p.contains(Status::INTERRUPT) {
                self.interrupt(bus, IRQ_VECTOR_LO, IRQ_VECTOR_HI);
                self.cycles_left = 7;
                return;
            }
        }

        let pc = self.pc;
        let opcode = bus.read(pc);
        self.pc = self.pc.wrapping_add(1);
        self.opcode = opcode;

        let instr = &OPCODE_TABLE[opcode as usize];
        match instr.mnemonic {
            Mnemonic::JAM => {
                warn!("illegal opcode {opcode:02X} at {pc:04X}, treated as NOP");
            }
            mnemonic if !mnemonic.is_official() => {
                debug!("undocumented opcode {opcode:02X} at {pc:04X}");
            }
            _ => {}
        }

        self.page_crossed = self.run_addressing(bus, instr.addressing);
        let op_extra = self.execute(bus, instr);
        self.cycles_left = instr.cycle.total(self.page_crossed, op_extra);
    }

    /// Resolves the effective address for the instruction in flight.
    /// Returns whether indexing crossed a page boundary.
    fn run_addressing<B: Bus>(&mut self, bus: &mut B, addressing: Addressing) -> bool {
        match addressing {
            Addressing::Implied | Addressing::Accumulator => false,
            Addressing::Immediate => {
                self.effective_addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                false
            }
            Addressing::Relative => {
                self.operand = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                false
            }
            Addressing::ZeroPage => {
                self.effective_addr = bus.read(self.pc) as u16;
                self.pc = self.pc.wrapping_add(1);
                false
            }
            Addressing::ZeroPageX => {
                let base = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.effective_addr = base.wrapping_add(self.x) as u16;
                false
            }
            Addressing::ZeroPageY => {
                let base = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.effective_addr = base.wrapping_add(self.y) as u16;
                false
            }
            Addressing::Absolute => {
                self.effective_addr = self.read_operand_word(bus);
                false
            }
            Addressing::AbsoluteX => {
                let base = self.read_operand_word(bus);
                self.effective_addr = base.wrapping_add(self.x as u16);
                crossed_page(base, self.effective_addr)
            }
            Addressing::AbsoluteY => {
                let base = self.read_operand_word(bus);
                self.effective_addr = base.wrapping_add(self.y as u16);
                crossed_page(base, self.effective_addr)
            }
            Addressing::Indirect => {
                let ptr = self.read_operand_word(bus);
                let lo = bus.read(ptr);
                // Hardware bug: the pointer's high byte is fetched from the
                // start of the same page when the low byte is $FF.
                let hi = bus.read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF));
                self.effective_addr = u16::from_le_bytes([lo, hi]);
                false
            }
            Addressing::IndirectX => {
                let zp = bus.read(self.pc).wrapping_add(self.x);
                self.pc = self.pc.wrapping_add(1);
                let lo = bus.read(zp as u16);
                let hi = bus.read(zp.wrapping_add(1) as u16);
                self.effective_addr = u16::from_le_bytes([lo, hi]);
                false
            }
            Addressing::IndirectY => {
                let zp = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let lo = bus.read(zp as u16);
                let hi = bus.read(zp.wrapping_add(1) as u16);
                let base = u16::from_le_bytes([lo, hi]);
                self.effective_addr = base.wrapping_add(self.y as u16);
                crossed_page(base, self.effective_addr)
            }
        }
    }

    fn read_operand_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read(self.pc);
        let hi = bus.read(self.pc.wrapping_add(1));
        self.pc = self.pc.wrapping_add(2);
        u16::from_le_bytes([lo, hi])
    }

    /// Reads the value the instruction operates on. Only called by operations
    /// that consume data, so pure stores never touch the effective address
    /// (reads of PPU registers have side effects).
    fn fetch<B: Bus>(&mut self, bus: &mut B, addressing: Addressing) -> u8 {
        match addressing {
            Addressing::Accumulator | Addressing::Implied => self.a,
            _ => bus.read(self.effective_addr),
        }
    }

    fn write_back<B: Bus>(&mut self, bus: &mut B, addressing: Addressing, value: u8) {
        match addressing {
            Addressing::Accumulator => self.a = value,
            _ => bus.write(self.effective_addr, value),
        }
    }

    fn push<B: Bus>(&mut self, bus: &mut B, data: u8) {
        bus.write(STACK_PAGE_START | self.s as u16, data);
        self.s = self.s.wrapping_sub(1);
    }

    fn pull<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.s = self.s.wrapping_add(1);
        bus.read(STACK_PAGE_START | self.s as u16)
    }

    /// Shared NMI/IRQ entry: push PC and status (B clear, U set), mask IRQs,
    /// load the handler address from the vector.
    fn interrupt<B: Bus>(&mut self, bus: &mut B, vector_lo: u16, vector_hi: u16) {
        self.push(bus, (self.pc >> 8) as u8);
        self.push(bus, self.pc as u8);
        let pushed = (self.p | Status::UNUSED) & !Status::BREAK;
        self.push(bus, pushed.bits());
        self.p.insert(Status::INTERRUPT);

        let lo = bus.read(vector_lo);
        let hi = bus.read(vector_hi);
        self.pc = u16::from_le_bytes([lo, hi]);
    }

    /// ADC core, shared by ADC, SBC (operand inverted), and RRA/ISC.
    fn add_with_carry(&mut self, value: u8) {
        let carry_in = self.p.contains(Status::CARRY) as u16;
        let result = self.a as u16 + value as u16 + carry_in;

        self.p.set(Status::CARRY, result > 0xFF);
        self.p.set(
            Status::OVERFLOW,
            (!(self.a ^ value) & (self.a ^ result as u8)) & 0x80 != 0,
        );
        self.a = result as u8;
        self.p.set_zn(self.a);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.p.set(Status::CARRY, register >= value);
        self.p.set(Status::ZERO, register == value);
        self.p
            .set(Status::NEGATIVE, register.wrapping_sub(value) & 0x80 != 0);
    }

    /// Takes the branch when `condition` holds. Returns the extra cycles:
    /// one for a taken branch, two when the target lies in another page.
    fn branch(&mut self, condition: bool) -> u8 {
        if !condition {
            return 0;
        }
        let from = self.pc;
        self.pc = from.wrapping_add(self.operand as i8 as u16);
        if crossed_page(from, self.pc) { 2 } else { 1 }
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.p.set(Status::CARRY, value & 0x80 != 0);
        let result = value << 1;
        self.p.set_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.p.set(Status::CARRY, value & 0x01 != 0);
        let result = value >> 1;
        self.p.set_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.p.contains(Status::CARRY) as u8;
        self.p.set(Status::CARRY, value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.p.set_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = (self.p.contains(Status::CARRY) as u8) << 7;
        self.p.set(Status::CARRY, value & 0x01 != 0);
        let result = (value >> 1) | carry_in;
        self.p.set_zn(result);
        result
    }

    /// Executes the operation. Returns extra cycles beyond the base count
    /// (only branches report any).
    fn execute<B: Bus>(&mut self, bus: &mut B, instr: &Instruction) -> u8 {
        let addressing = instr.addressing;
        match instr.mnemonic {
            // Loads and stores.
            Mnemonic::LDA => {
                self.a = self.fetch(bus, addressing);
                self.p.set_zn(self.a);
            }
            Mnemonic::LDX => {
                self.x = self.fetch(bus, addressing);
                self.p.set_zn(self.x);
            }
            Mnemonic::LDY => {
                self.y = self.fetch(bus, addressing);
                self.p.set_zn(self.y);
            }
            Mnemonic::STA => bus.write(self.effective_addr, self.a),
            Mnemonic::STX => bus.write(self.effective_addr, self.x),
            Mnemonic::STY => bus.write(self.effective_addr, self.y),

            // Transfers.
            Mnemonic::TAX => {
                self.x = self.a;
                self.p.set_zn(self.x);
            }
            Mnemonic::TAY => {
                self.y = self.a;
                self.p.set_zn(self.y);
            }
            Mnemonic::TSX => {
                self.x = self.s;
                self.p.set_zn(self.x);
            }
            Mnemonic::TXA => {
                self.a = self.x;
                self.p.set_zn(self.a);
            }
            // TXS touches no flags.
            Mnemonic::TXS => self.s = self.x,
            Mnemonic::TYA => {
                self.a = self.y;
                self.p.set_zn(self.a);
            }

            // Stack.
            Mnemonic::PHA => self.push(bus, self.a),
            Mnemonic::PHP => {
                // PHP pushes with both B and U set.
                let pushed = self.p | Status::BREAK | Status::UNUSED;
                self.push(bus, pushed.bits());
            }
            Mnemonic::PLA => {
                self.a = self.pull(bus);
                self.p.set_zn(self.a);
            }
            Mnemonic::PLP => {
                let byte = self.pull(bus);
                self.p = Status::restore_from_stack(byte);
            }

            // Shifts and rotates.
            Mnemonic::ASL => {
                let value = self.fetch(bus, addressing);
                let result = self.asl(value);
                self.write_back(bus, addressing, result);
            }
            Mnemonic::LSR => {
                let value = self.fetch(bus, addressing);
                let result = self.lsr(value);
                self.write_back(bus, addressing, result);
            }
            Mnemonic::ROL => {
                let value = self.fetch(bus, addressing);
                let result = self.rol(value);
                self.write_back(bus, addressing, result);
            }
            Mnemonic::ROR => {
                let value = self.fetch(bus, addressing);
                let result = self.ror(value);
                self.write_back(bus, addressing, result);
            }

            // Logic.
            Mnemonic::AND => {
                self.a &= self.fetch(bus, addressing);
                self.p.set_zn(self.a);
            }
            Mnemonic::EOR => {
                self.a ^= self.fetch(bus, addressing);
                self.p.set_zn(self.a);
            }
            Mnemonic::ORA => {
                self.a |= self.fetch(bus, addressing);
                self.p.set_zn(self.a);
            }
            Mnemonic::BIT => {
                let value = self.fetch(bus, addressing);
                self.p.set(Status::ZERO, self.a & value == 0);
                self.p.set(Status::OVERFLOW, value & 0x40 != 0);
                self.p.set(Status::NEGATIVE, value & 0x80 != 0);
            }

            // Arithmetic.
            Mnemonic::ADC => {
                let value = self.fetch(bus, addressing);
                self.add_with_carry(value);
            }
            Mnemonic::SBC => {
                let value = self.fetch(bus, addressing);
                self.add_with_carry(!value);
            }
            Mnemonic::CMP => {
                let value = self.fetch(bus, addressing);
                self.compare(self.a, value);
            }
            Mnemonic::CPX => {
                let value = self.fetch(bus, addressing);
                self.compare(self.x, value);
            }
            Mnemonic::CPY => {
                let value = self.fetch(bus, addressing);
                self.compare(self.y, value);
            }

            // Increment / decrement.
            Mnemonic::DEC => {
                let result = self.fetch(bus, addressing).wrapping_sub(1);
                self.write_back(bus, addressing, result);
                self.p.set_zn(result);
            }
            Mnemonic::DEX => {
                self.x = self.x.wrapping_sub(1);
                self.p.set_zn(self.x);
            }
            Mnemonic::DEY => {
                self.y = self.y.wrapping_sub(1);
                self.p.set_zn(self.y);
            }
            Mnemonic::INC => {
                let result = self.fetch(bus, addressing).wrapping_add(1);
                self.write_back(bus, addressing, result);
                self.p.set_zn(result);
            }
            Mnemonic::INX => {
                self.x = self.x.wrapping_add(1);
                self.p.set_zn(self.x);
            }
            Mnemonic::INY => {
                self.y = self.y.wrapping_add(1);
                self.p.set_zn(self.y);
            }

            // Control flow.
            Mnemonic::BRK => {
                // The byte after BRK is a padding byte the sequence skips.
                self.pc = self.pc.wrapping_add(1);
                self.push(bus, (self.pc >> 8) as u8);
                self.push(bus, self.pc as u8);
                let pushed = self.p | Status::BREAK | Status::UNUSED;
                self.push(bus, pushed.bits());
                self.p.insert(Status::INTERRUPT);

                let lo = bus.read(IRQ_VECTOR_LO);
                let hi = bus.read(IRQ_VECTOR_HI);
                self.pc = u16::from_le_bytes([lo, hi]);
            }
            Mnemonic::JMP => self.pc = self.effective_addr,
            Mnemonic::JSR => {
                let return_addr = self.pc.wrapping_sub(1);
                self.push(bus, (return_addr >> 8) as u8);
                self.push(bus, return_addr as u8);
                self.pc = self.effective_addr;
            }
            Mnemonic::RTS => {
                let lo = self.pull(bus);
                let hi = self.pull(bus);
                self.pc = u16::from_le_bytes([lo, hi]).wrapping_add(1);
            }
            Mnemonic::RTI => {
                let byte = self.pull(bus);
                self.p = Status::restore_from_stack(byte);
                let lo = self.pull(bus);
                let hi = self.pull(bus);
                self.pc = u16::from_le_bytes([lo, hi]);
            }

            // Branches.
            Mnemonic::BCC => return self.branch(!self.p.contains(Status::CARRY)),
            Mnemonic::BCS => return self.branch(self.p.contains(Status::CARRY)),
            Mnemonic::BEQ => return self.branch(self.p.contains(Status::ZERO)),
            Mnemonic::BMI => return self.branch(self.p.contains(Status::NEGATIVE)),
            Mnemonic::BNE => return self.branch(!self.p.contains(Status::ZERO)),
            Mnemonic::BPL => return self.branch(!self.p.contains(Status::NEGATIVE)),
            Mnemonic::BVC => return self.branch(!self.p.contains(Status::OVERFLOW)),
            Mnemonic::BVS => return self.branch(self.p.contains(Status::OVERFLOW)),

            // Flag operations.
            Mnemonic::CLC => self.p.remove(Status::CARRY),
            Mnemonic::CLD => self.p.remove(Status::DECIMAL),
            Mnemonic::CLI => self.p.remove(Status::INTERRUPT),
            Mnemonic::CLV => self.p.remove(Status::OVERFLOW),
            Mnemonic::SEC => self.p.insert(Status::CARRY),
            Mnemonic::SED => self.p.insert(Status::DECIMAL),
            Mnemonic::SEI => self.p.insert(Status::INTERRUPT),

            // Stable undocumented operations.
            Mnemonic::LAX => {
                let value = self.fetch(bus, addressing);
                self.a = value;
                self.x = value;
                self.p.set_zn(value);
            }
            Mnemonic::SAX => bus.write(self.effective_addr, self.a & self.x),
            Mnemonic::DCP => {
                let result = self.fetch(bus, addressing).wrapping_sub(1);
                self.write_back(bus, addressing, result);
                self.compare(self.a, result);
            }
            Mnemonic::ISC => {
                let result = self.fetch(bus, addressing).wrapping_add(1);
                self.write_back(bus, addressing, result);
                self.add_with_carry(!result);
            }
            Mnemonic::SLO => {
                let value = self.fetch(bus, addressing);
                let result = self.asl(value);
                self.write_back(bus, addressing, result);
                self.a |= result;
                self.p.set_zn(self.a);
            }
            Mnemonic::RLA => {
                let value = self.fetch(bus, addressing);
                let result = self.rol(value);
                self.write_back(bus, addressing, result);
                self.a &= result;
                self.p.set_zn(self.a);
            }
            Mnemonic::SRE => {
                let value = self.fetch(bus, addressing);
                let result = self.lsr(value);
                self.write_back(bus, addressing, result);
                self.a ^= result;
                self.p.set_zn(self.a);
            }
            Mnemonic::RRA => {
                let value = self.fetch(bus, addressing);
                let result = self.ror(value);
                self.write_back(bus, addressing, result);
                self.add_with_carry(result);
            }

            // NOPs (official and multi-byte undocumented) and jams.
            Mnemonic::NOP | Mnemonic::JAM => {}
        }
        0
    }
}

fn crossed_page(a: u16, b: u16) -> bool {
    a & 0xFF00 != b & 0xFF00
}

impl Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A:{:02X} X:{:02X} Y:{:02X} S:{:02X} P:{:02X} PC:{:04X} OP:{:02X} LEFT:{}",
            self.a,
            self.x,
            self.y,
            self.s,
            self.p.bits(),
            self.pc,
            self.opcode,
            self.cycles_left,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat 64 KiB bus for exercising the interpreter in isolation.
    struct FlatBus {
        memory: Vec<u8>,
    }

    impl FlatBus {
        fn new() -> Self {
            Self {
                memory: vec![0; 0x10000],
            }
        }

        /// Loads a program at `start` and points the reset vector at it.
        fn with_program(start: u16, program: &[u8]) -> Self {
            let mut bus = Self::new();
            bus.memory[start as usize..start as usize + program.len()].copy_from_slice(program);
            bus.memory[0xFFFC] = start as u8;
            bus.memory[0xFFFD] = (start >> 8) as u8;
            bus
        }
    }

    impl Bus for FlatBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.memory[addr as usize]
        }

        fn write(&mut self, addr: u16, data: u8) {
            self.memory[addr as usize] = data;
        }
    }

    fn run_one(cpu: &mut Cpu, bus: &mut FlatBus) -> u32 {
        let mut ticks = 0;
        loop {
            ticks += 1;
            if cpu.clock(bus) {
                return ticks;
            }
        }
    }

    fn cpu_at(bus: &mut FlatBus) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.reset(bus);
        cpu.cycles_left = 0; // skip the reset stall in unit tests
        cpu
    }

    #[test]
    fn reset_loads_vector_and_power_on_state() {
        let mut bus = FlatBus::with_program(0x8000, &[0xEA]);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(cpu.s, 0xFD);
        assert_eq!(cpu.p.bits(), 0x34);
        // The reset sequence itself costs 8 cycles.
        let mut boundary_ticks = 0;
        while !cpu.clock(&mut bus) {
            boundary_ticks += 1;
        }
        assert_eq!(boundary_ticks + 1, 8);
    }

    #[test]
    fn adc_overflow_matrix() {
        // 0x50 + 0x50 overflows into the sign bit.
        let mut bus = FlatBus::with_program(0x8000, &[0x69, 0x50]);
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0x50;
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0xA0);
        assert!(cpu.p.contains(Status::NEGATIVE));
        assert!(cpu.p.contains(Status::OVERFLOW));
        assert!(!cpu.p.contains(Status::ZERO));
        assert!(!cpu.p.contains(Status::CARRY));

        // 0x50 + 0xD0 carries without signed overflow.
        let mut bus = FlatBus::with_program(0x8000, &[0x69, 0xD0]);
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0x50;
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x20);
        assert!(!cpu.p.contains(Status::NEGATIVE));
        assert!(!cpu.p.contains(Status::OVERFLOW));
        assert!(!cpu.p.contains(Status::ZERO));
        assert!(cpu.p.contains(Status::CARRY));
    }

    #[test]
    fn sbc_is_adc_with_inverted_operand() {
        // 0x50 - 0x30 with carry set = 0x20, carry stays set.
        let mut bus = FlatBus::with_program(0x8000, &[0xE9, 0x30]);
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0x50;
        cpu.p.insert(Status::CARRY);
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x20);
        assert!(cpu.p.contains(Status::CARRY));
    }

    #[test]
    fn jmp_indirect_reproduces_page_wrap_bug() {
        let mut bus = FlatBus::with_program(0x8000, &[0x6C, 0xFF, 0x02]);
        bus.memory[0x02FF] = 0x34;
        bus.memory[0x0300] = 0x56;
        bus.memory[0x0200] = 0x78;
        let mut cpu = cpu_at(&mut bus);

        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x7834);
    }

    #[test]
    fn branch_cycles_count_taken_and_page_cross() {
        // BNE at $80FD with displacement $05: 2 base + 1 taken + 1 cross.
        let mut bus = FlatBus::with_program(0x80FD, &[0xD0, 0x05]);
        let mut cpu = cpu_at(&mut bus);
        cpu.p.remove(Status::ZERO);

        let ticks = run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x8104);
        assert_eq!(ticks, 4);

        // Not taken: base 2 only.
        let mut bus = FlatBus::with_program(0x80FD, &[0xD0, 0x05]);
        let mut cpu = cpu_at(&mut bus);
        cpu.p.insert(Status::ZERO);
        let ticks = run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x80FF);
        assert_eq!(ticks, 2);
    }

    #[test]
    fn absolute_x_load_pays_for_page_cross() {
        // LDA $80FF,X with X=1 reads $8100 and costs 5 cycles.
        let mut bus = FlatBus::with_program(0x8000, &[0xBD, 0xFF, 0x80]);
        bus.memory[0x8100] = 0x42;
        let mut cpu = cpu_at(&mut bus);
        cpu.x = 1;
        let ticks = run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x42);
        assert_eq!(ticks, 5);

        // STA $80FF,X always costs 5 regardless of crossing.
        let mut bus = FlatBus::with_program(0x8000, &[0x9D, 0xFF, 0x80]);
        let mut cpu = cpu_at(&mut bus);
        cpu.x = 1;
        cpu.a = 0x99;
        let ticks = run_one(&mut cpu, &mut bus);
        assert_eq!(bus.memory[0x8100], 0x99);
        assert_eq!(ticks, 5);
    }

    #[test]
    fn php_sets_b_and_u_in_the_pushed_copy_only() {
        let mut bus = FlatBus::with_program(0x8000, &[0x08, 0x28]);
        let mut cpu = cpu_at(&mut bus);
        cpu.p = Status::from_bits_retain(0x00);

        run_one(&mut cpu, &mut bus); // PHP
        let pushed = bus.memory[0x01FD];
        assert_eq!(pushed & 0x30, 0x30);

        // Corrupt the stack copy with B set; PLP must clear B and force U.
        bus.memory[0x01FD] = 0xFF;
        run_one(&mut cpu, &mut bus); // PLP
        assert_eq!(cpu.p.bits() & 0x30, 0x20);
    }

    #[test]
    fn brk_and_rti_round_trip() {
        let mut bus = FlatBus::with_program(0x8000, &[0x00, 0xFF]);
        bus.memory[0xFFFE] = 0x00;
        bus.memory[0xFFFF] = 0x90;
        bus.memory[0x9000] = 0x40; // RTI
        let mut cpu = cpu_at(&mut bus);
        cpu.p.remove(Status::INTERRUPT);

        let ticks = run_one(&mut cpu, &mut bus);
        assert_eq!(ticks, 7);
        assert_eq!(cpu.pc, 0x9000);
        assert!(cpu.p.contains(Status::INTERRUPT));
        // The pushed status carries B set.
        assert_eq!(bus.memory[0x01FB] & 0x30, 0x30);

        run_one(&mut cpu, &mut bus); // RTI
        // BRK skips its padding byte, so execution resumes at $8002.
        assert_eq!(cpu.pc, 0x8002);
        assert!(!cpu.p.contains(Status::INTERRUPT));
    }

    #[test]
    fn rts_adds_one_to_the_full_popped_address() {
        // JSR $9000 pushes $8002; RTS must resume at $8003 even though the
        // pushed low byte is $02 and the high byte would be perturbed by a
        // byte-wise +1.
        let mut bus = FlatBus::with_program(0x8000, &[0x20, 0x00, 0x90]);
        bus.memory[0x9000] = 0x60; // RTS
        let mut cpu = cpu_at(&mut bus);

        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x9000);
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x8003);

        // Page-edge return: pushed address $80FF must resume at $8100.
        let mut bus = FlatBus::with_program(0x80FD, &[0x20, 0x00, 0x90]);
        bus.memory[0x9000] = 0x60;
        let mut cpu = cpu_at(&mut bus);
        run_one(&mut cpu, &mut bus);
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x8100);
    }

    #[test]
    fn nmi_is_taken_at_the_next_instruction_boundary() {
        let mut bus = FlatBus::with_program(0x8000, &[0xEA, 0xEA]);
        bus.memory[0xFFFA] = 0x00;
        bus.memory[0xFFFB] = 0xA0;
        let mut cpu = cpu_at(&mut bus);

        cpu.clock(&mut bus); // first cycle of NOP
        cpu.request_nmi();
        cpu.clock(&mut bus); // NOP finishes

        let ticks = run_one(&mut cpu, &mut bus);
        assert_eq!(ticks, 7);
        assert_eq!(cpu.pc, 0xA000);
        // NMI pushes with B clear, U set.
        assert_eq!(bus.memory[0x01FB] & 0x30, 0x20);
    }

    #[test]
    fn irq_respects_the_interrupt_mask() {
        let mut bus = FlatBus::with_program(0x8000, &[0xEA, 0xEA]);
        bus.memory[0xFFFE] = 0x00;
        bus.memory[0xFFFF] = 0xB0;
        let mut cpu = cpu_at(&mut bus);

        cpu.request_irq();
        run_one(&mut cpu, &mut bus); // NOP; IRQ dropped, I is set
        assert_eq!(cpu.pc, 0x8001);

        cpu.p.remove(Status::INTERRUPT);
        cpu.request_irq();
        let ticks = run_one(&mut cpu, &mut bus);
        assert_eq!(ticks, 7);
        assert_eq!(cpu.pc, 0xB000);
    }

    #[test]
    fn compare_sets_carry_zero_and_negative() {
        // CMP #$30 with A=$50: A >= operand, result positive.
        let mut bus = FlatBus::with_program(0x8000, &[0xC9, 0x30]);
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0x50;
        run_one(&mut cpu, &mut bus);
        assert!(cpu.p.contains(Status::CARRY));
        assert!(!cpu.p.contains(Status::ZERO));
        assert!(!cpu.p.contains(Status::NEGATIVE));

        // CPX #$50 with X=$50: equality sets C and Z.
        let mut bus = FlatBus::with_program(0x8000, &[0xE0, 0x50]);
        let mut cpu = cpu_at(&mut bus);
        cpu.x = 0x50;
        run_one(&mut cpu, &mut bus);
        assert!(cpu.p.contains(Status::CARRY));
        assert!(cpu.p.contains(Status::ZERO));

        // CPY #$60 with Y=$50: borrow clears C, difference is negative.
        let mut bus = FlatBus::with_program(0x8000, &[0xC0, 0x60]);
        let mut cpu = cpu_at(&mut bus);
        cpu.y = 0x50;
        run_one(&mut cpu, &mut bus);
        assert!(!cpu.p.contains(Status::CARRY));
        assert!(!cpu.p.contains(Status::ZERO));
        assert!(cpu.p.contains(Status::NEGATIVE));
    }

    #[test]
    fn bit_takes_v_and_n_from_the_operand() {
        let mut bus = FlatBus::with_program(0x8000, &[0x24, 0x10]); // BIT $10
        bus.memory[0x0010] = 0b1100_0000;
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0x00;
        run_one(&mut cpu, &mut bus);
        assert!(cpu.p.contains(Status::ZERO));
        assert!(cpu.p.contains(Status::OVERFLOW));
        assert!(cpu.p.contains(Status::NEGATIVE));

        let mut bus = FlatBus::with_program(0x8000, &[0x24, 0x10]);
        bus.memory[0x0010] = 0x01;
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0x01;
        run_one(&mut cpu, &mut bus);
        assert!(!cpu.p.contains(Status::ZERO));
        assert!(!cpu.p.contains(Status::OVERFLOW));
        assert!(!cpu.p.contains(Status::NEGATIVE));
    }

    #[test]
    fn accumulator_rotates_thread_the_carry() {
        // ROL A with C=1 pulls the carry into bit 0 and pushes bit 7 out.
        let mut bus = FlatBus::with_program(0x8000, &[0x2A]);
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0b1000_0000;
        cpu.p.insert(Status::CARRY);
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0b0000_0001);
        assert!(cpu.p.contains(Status::CARRY));

        // ROR A with C=0 clears bit 7 and captures bit 0.
        let mut bus = FlatBus::with_program(0x8000, &[0x6A]);
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0b0000_0011;
        cpu.p.remove(Status::CARRY);
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0b0000_0001);
        assert!(cpu.p.contains(Status::CARRY));

        // LSR A always clears N.
        let mut bus = FlatBus::with_program(0x8000, &[0x4A]);
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0b1000_0001;
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0b0100_0000);
        assert!(cpu.p.contains(Status::CARRY));
        assert!(!cpu.p.contains(Status::NEGATIVE));
    }

    #[test]
    fn stable_undocumented_ops_have_their_documented_effects() {
        // LAX $10 loads A and X together.
        let mut bus = FlatBus::with_program(0x8000, &[0xA7, 0x10]);
        bus.memory[0x0010] = 0x8F;
        let mut cpu = cpu_at(&mut bus);
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x8F);
        assert_eq!(cpu.x, 0x8F);
        assert!(cpu.p.contains(Status::NEGATIVE));

        // SAX $10 stores A & X without touching flags.
        let mut bus = FlatBus::with_program(0x8000, &[0x87, 0x10]);
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0xF0;
        cpu.x = 0x3C;
        run_one(&mut cpu, &mut bus);
        assert_eq!(bus.memory[0x0010], 0x30);

        // DCP $10 decrements memory then compares against A.
        let mut bus = FlatBus::with_program(0x8000, &[0xC7, 0x10]);
        bus.memory[0x0010] = 0x41;
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0x40;
        run_one(&mut cpu, &mut bus);
        assert_eq!(bus.memory[0x0010], 0x40);
        assert!(cpu.p.contains(Status::ZERO));

        // ISC $10 increments memory then subtracts it from A.
        let mut bus = FlatBus::with_program(0x8000, &[0xE7, 0x10]);
        bus.memory[0x0010] = 0x0F;
        let mut cpu = cpu_at(&mut bus);
        cpu.a = 0x20;
        cpu.p.insert(Status::CARRY);
        run_one(&mut cpu, &mut bus);
        assert_eq!(bus.memory[0x0010], 0x10);
        assert_eq!(cpu.a, 0x10);
    }

    #[test]
    fn jam_opcodes_behave_as_two_cycle_nops() {
        let mut bus = FlatBus::with_program(0x8000, &[0x02, 0xEA]);
        let mut cpu = cpu_at(&mut bus);
        let ticks = run_one(&mut cpu, &mut bus);
        assert_eq!(ticks, 2);
        assert_eq!(cpu.pc, 0x8001);
    }

    #[test]
    fn indexed_zero_page_wraps_within_page_zero() {
        let mut bus = FlatBus::with_program(0x8000, &[0xB5, 0xFF]); // LDA $FF,X
        bus.memory[0x007F] = 0x5A;
        let mut cpu = cpu_at(&mut bus);
        cpu.x = 0x80;
        run_one(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x5A);
    }

    #[test]
    fn rmw_shift_operates_on_memory() {
        let mut bus = FlatBus::with_program(0x8000, &[0x0E, 0x10, 0x00]); // ASL $0010
        bus.memory[0x0010] = 0b1100_0001;
        let mut cpu = cpu_at(&mut bus);
        run_one(&mut cpu, &mut bus);
        assert_eq!(bus.memory[0x0010], 0b1000_0010);
        assert!(cpu.p.contains(Status::CARRY));
        assert!(cpu.p.contains(Status::NEGATIVE));
    }
}
