use crate::io::IoController;
use crate::isa::{FormatTag, PredReg, Register, ADDR_MASK, MEMORY_SIZE};
use crate::program::Program;

/// Status flags, written only by `CMP`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Flags {
    /// Zero
    pub z: bool,
    /// Negative
    pub n: bool,
    /// Carry, meaning no unsigned borrow
    pub c: bool,
    /// Signed overflow
    pub v: bool,
}

impl Flags {
    /// Flags for `a - b` on 16-bit operands.
    pub fn from_sub(a: u16, b: u16) -> Flags {
        let result = a.wrapping_sub(b);
        let sign = |val: u16| val & 0x8000 != 0;
        Flags {
            z: result == 0,
            n: sign(result),
            c: a >= b,
            v: sign(a) != sign(b) && sign(result) != sign(a),
        }
    }
}

/// Represents complete machine state during runtime.
///
/// Every instruction slot in memory carries the format tag it was assembled with.
#[derive(Clone, Debug)]
pub struct MachineState {
    /// 9-bit program counter
    pc: u16,
    /// 8x 16-bit registers
    reg: [u16; 8],
    flags: Flags,
    /// P0-P3
    preds: [bool; 4],
    mem: Box<[u16; MEMORY_SIZE]>,
    tags: Box<[FormatTag; MEMORY_SIZE]>,
    halted: bool,
    pub(crate) io: IoController,
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineState {
    /// All-zero state with no instructions loaded.
    pub fn new() -> Self {
        MachineState {
            pc: 0,
            reg: [0; 8],
            flags: Flags::default(),
            preds: [false; 4],
            mem: Box::new([0; MEMORY_SIZE]),
            tags: Box::new([FormatTag::Error; MEMORY_SIZE]),
            halted: false,
            io: IoController::default(),
        }
    }

    /// Fresh state with `program` placed at address 0.
    pub fn with_program(program: &Program) -> Self {
        let mut state = Self::new();
        for (addr, slot) in program.slots().iter().enumerate() {
            state.mem[addr] = slot.word;
            state.tags[addr] = slot.tag;
        }
        state
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub(crate) fn set_pc(&mut self, pc: u16) {
        self.pc = pc & ADDR_MASK;
    }

    pub fn reg(&self, reg: Register) -> u16 {
        self.reg[reg as usize]
    }

    pub(crate) fn reg_mut(&mut self, reg: Register) -> &mut u16 {
        &mut self.reg[reg as usize]
    }

    pub fn registers(&self) -> [u16; 8] {
        self.reg
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub(crate) fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    pub fn predicate(&self, pred: PredReg) -> bool {
        self.preds[pred as usize]
    }

    pub fn predicates(&self) -> [bool; 4] {
        self.preds
    }

    pub(crate) fn set_predicate(&mut self, pred: PredReg, value: bool) {
        self.preds[pred as usize] = value;
    }

    /// Plain memory read; does not go through the I/O window.
    pub fn mem(&self, addr: u16) -> u16 {
        self.mem[(addr & ADDR_MASK) as usize]
    }

    pub(crate) fn mem_mut(&mut self, addr: u16) -> &mut u16 {
        &mut self.mem[(addr & ADDR_MASK) as usize]
    }

    pub fn memory(&self) -> &[u16; MEMORY_SIZE] {
        &self.mem
    }

    pub fn tag(&self, addr: u16) -> FormatTag {
        self.tags[(addr & ADDR_MASK) as usize]
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn halt(&mut self) {
        self.halted = true;
    }

    pub fn waiting_for_input(&self) -> bool {
        self.io.is_waiting()
    }

    pub fn io(&self) -> &IoController {
        &self.io
    }

    /// Read the word at PC with its tag, then advance PC by one.
    ///
    /// Returns the fetched address alongside the slot.
    pub(crate) fn fetch(&mut self) -> (u16, u16, FormatTag) {
        let pc = self.pc;
        let word = self.mem(pc);
        let tag = self.tag(pc);
        self.set_pc(pc.wrapping_add(1));
        (pc, word, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_flags() {
        assert_eq!(
            Flags::from_sub(7, 7),
            Flags { z: true, n: false, c: true, v: false }
        );
        assert_eq!(
            Flags::from_sub(3, 5),
            Flags { z: false, n: true, c: false, v: false }
        );
        // -32768 - 1 overflows to positive
        assert_eq!(
            Flags::from_sub(0x8000, 1),
            Flags { z: false, n: false, c: true, v: true }
        );
        // 32767 - (-1) overflows to negative
        assert_eq!(
            Flags::from_sub(0x7FFF, 0xFFFF),
            Flags { z: false, n: true, c: false, v: true }
        );
    }

    #[test]
    fn fetch_wraps() {
        let mut state = MachineState::new();
        state.set_pc(0x1FF);
        let (pc, _, tag) = state.fetch();
        assert_eq!(pc, 0x1FF);
        assert_eq!(tag, FormatTag::Error);
        assert_eq!(state.pc(), 0);
    }
}
