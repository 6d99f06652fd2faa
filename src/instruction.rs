use std::fmt;

use crate::isa::{Condition, FormatTag, Opcode, PredReg, Predicate, Register, ADDR_MASK};

/// Second operand of data-processing instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand {
    Reg(Register),
    /// Unsigned 3-bit immediate.
    Imm3(u16),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{reg}"),
            Operand::Imm3(val) => write!(f, "#{val}"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Orr,
    Xor,
    Mov,
    Lshl,
    Lshr,
}

impl AluOp {
    fn opcode(self) -> Opcode {
        match self {
            AluOp::Add => Opcode::Add,
            AluOp::Sub => Opcode::Sub,
            AluOp::And => Opcode::And,
            AluOp::Orr => Opcode::Orr,
            AluOp::Xor => Opcode::Xor,
            AluOp::Mov => Opcode::Mov,
            AluOp::Lshl => Opcode::Lshl,
            AluOp::Lshr => Opcode::Lshr,
        }
    }

    fn from_opcode(op: Opcode) -> Option<AluOp> {
        Some(match op {
            Opcode::Add => AluOp::Add,
            Opcode::Sub => AluOp::Sub,
            Opcode::And => AluOp::And,
            Opcode::Orr => AluOp::Orr,
            Opcode::Xor => AluOp::Xor,
            Opcode::Mov => AluOp::Mov,
            Opcode::Lshl => AluOp::Lshl,
            Opcode::Lshr => AluOp::Lshr,
            _ => return None,
        })
    }

    /// Result is always 16 bits wide. Shift amounts are masked to 0-7.
    pub fn apply(self, a: u16, b: u16) -> u16 {
        match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::And => a & b,
            AluOp::Orr => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Mov => b,
            AluOp::Lshl => a << (b & 0b111),
            AluOp::Lshr => a >> (b & 0b111),
        }
    }
}

/// Operation part of an instruction, without its predicate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operation {
    /// Load `R0` from memory or the I/O window.
    Load { addr: u16 },
    /// Store `R0` to memory or the I/O window.
    Store { addr: u16 },
    /// Absolute jump.
    Branch { target: u16 },
    /// Write `rn <op> operand` into `rd`.
    Alu {
        op: AluOp,
        rd: Register,
        rn: Register,
        operand: Operand,
    },
    /// Set flags from `rn - operand`.
    Compare { rn: Register, operand: Operand },
    /// Write a flag condition into a predicate register.
    SetPredicate { cond: Condition, dest: PredReg },
    Halt,
}

/// Single decoded instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub predicate: Predicate,
    pub op: Operation,
}

/// Reasons a `(word, tag)` pair cannot be decoded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DecodeError {
    /// Address was never assigned an instruction, or the line failed to assemble.
    ErrorTag,
    UnknownOpcode(u16),
    /// Opcode does not belong to the family the tag describes.
    TagMismatch { opcode: Opcode, tag: FormatTag },
    UnknownCondition(u16),
    /// `SETP` can never target `P0`.
    InvalidPredicateTarget,
}

impl std::error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ErrorTag => write!(f, "no valid instruction at this address"),
            Self::UnknownOpcode(bits) => write!(f, "unknown opcode 0x{bits:x}"),
            Self::TagMismatch { opcode, tag } => {
                write!(f, "opcode {opcode} cannot be executed with format {tag}")
            }
            Self::UnknownCondition(code) => write!(f, "unknown condition code {code}"),
            Self::InvalidPredicateTarget => write!(f, "SETP cannot write P0"),
        }
    }
}

impl Instruction {
    pub fn new(predicate: Predicate, op: Operation) -> Self {
        Instruction { predicate, op }
    }

    pub fn opcode(&self) -> Opcode {
        match self.op {
            Operation::Load { .. } => Opcode::Ldr,
            Operation::Store { .. } => Opcode::Str,
            Operation::Branch { .. } => Opcode::B,
            Operation::Alu { op, .. } => op.opcode(),
            Operation::Compare { .. } => Opcode::Cmp,
            Operation::SetPredicate { .. } => Opcode::Setp,
            Operation::Halt => Opcode::Hlt,
        }
    }

    /// Tag chosen from the operand syntax. Immediate and register forms differ only here.
    pub fn format_tag(&self) -> FormatTag {
        match self.op {
            Operation::Load { .. } | Operation::Store { .. } => FormatTag::Memory,
            Operation::Branch { .. } => FormatTag::Branch,
            Operation::Alu {
                op: AluOp::Mov,
                operand,
                ..
            } => match operand {
                Operand::Imm3(_) => FormatTag::IMov,
                Operand::Reg(_) => FormatTag::RMov,
            },
            Operation::Alu { operand, .. } => match operand {
                Operand::Imm3(_) => FormatTag::IAlu,
                Operand::Reg(_) => FormatTag::RAlu,
            },
            Operation::Compare { operand, .. } => match operand {
                Operand::Imm3(_) => FormatTag::ICmp,
                Operand::Reg(_) => FormatTag::RCmp,
            },
            Operation::SetPredicate { .. } => FormatTag::Setp,
            Operation::Halt => FormatTag::Hlt,
        }
    }

    /// Emit the machine word together with the tag needed to read it back.
    pub fn encode(&self) -> (u16, FormatTag) {
        let operand_field = match self.op {
            Operation::Load { addr } | Operation::Store { addr } => addr & ADDR_MASK,
            Operation::Branch { target } => target & ADDR_MASK,
            Operation::Alu {
                rd, rn, operand, ..
            } => (rd as u16) << 6 | (rn as u16) << 3 | low_operand(operand),
            Operation::Compare { rn, operand } => (rn as u16) << 3 | low_operand(operand),
            Operation::SetPredicate { cond, dest } => (dest as u16) << 7 | cond.code(),
            Operation::Halt => 0,
        };
        let word = (self.opcode() as u16) << 12 | (self.predicate as u16) << 9 | operand_field;
        (word, self.format_tag())
    }

    /// Read a word using the tag the assembler paired it with.
    pub fn decode(word: u16, tag: FormatTag) -> Result<Instruction, DecodeError> {
        if tag == FormatTag::Error {
            return Err(DecodeError::ErrorTag);
        }
        let opcode_bits = word >> 12;
        let opcode =
            Opcode::from_bits(opcode_bits).ok_or(DecodeError::UnknownOpcode(opcode_bits))?;
        let predicate = Predicate::from_bits(word >> 9);
        let mismatch = DecodeError::TagMismatch { opcode, tag };

        let rd = Register::from_bits(word >> 6);
        let rn = Register::from_bits(word >> 3);
        let low = word & 0b111;

        let op = match (tag, opcode) {
            (FormatTag::Memory, Opcode::Ldr) => Operation::Load {
                addr: word & ADDR_MASK,
            },
            (FormatTag::Memory, Opcode::Str) => Operation::Store {
                addr: word & ADDR_MASK,
            },
            (FormatTag::Branch, Opcode::B) => Operation::Branch {
                target: word & ADDR_MASK,
            },
            (FormatTag::IMov | FormatTag::RMov, Opcode::Mov)
            | (FormatTag::IAlu | FormatTag::RAlu, _) => {
                let is_mov_tag = matches!(tag, FormatTag::IMov | FormatTag::RMov);
                let op = AluOp::from_opcode(opcode)
                    .filter(|op| (*op == AluOp::Mov) == is_mov_tag)
                    .ok_or(mismatch)?;
                let operand = match tag {
                    FormatTag::IAlu | FormatTag::IMov => Operand::Imm3(low),
                    _ => Operand::Reg(Register::from_bits(low)),
                };
                Operation::Alu {
                    op,
                    rd,
                    rn,
                    operand,
                }
            }
            (FormatTag::ICmp, Opcode::Cmp) => Operation::Compare {
                rn,
                operand: Operand::Imm3(low),
            },
            (FormatTag::RCmp, Opcode::Cmp) => Operation::Compare {
                rn,
                operand: Operand::Reg(Register::from_bits(low)),
            },
            (FormatTag::Setp, Opcode::Setp) => {
                let dest = PredReg::from_bits(word >> 7);
                if dest == PredReg::P0 {
                    return Err(DecodeError::InvalidPredicateTarget);
                }
                let code = word & 0x3F;
                let cond = Condition::from_code(code).ok_or(DecodeError::UnknownCondition(code))?;
                Operation::SetPredicate { cond, dest }
            }
            (FormatTag::Hlt, Opcode::Hlt) => Operation::Halt,
            _ => return Err(mismatch),
        };
        Ok(Instruction { predicate, op })
    }
}

fn low_operand(operand: Operand) -> u16 {
    match operand {
        Operand::Reg(reg) => reg as u16,
        Operand::Imm3(val) => val & 0b111,
    }
}

/// Canonical source form, eg. `(P1) ADD R2, R0, #2`.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicate != Predicate::Always {
            write!(f, "({}) ", self.predicate)?;
        }
        let mnemonic = self.opcode().mnemonic();
        match self.op {
            Operation::Load { addr } | Operation::Store { addr } => {
                write!(f, "{mnemonic} 0x{addr:03X}")
            }
            Operation::Branch { target } => write!(f, "{mnemonic} 0x{target:03X}"),
            Operation::Alu {
                rd, rn, operand, ..
            } => write!(f, "{mnemonic} {rd}, {rn}, {operand}"),
            Operation::Compare { rn, operand } => write!(f, "{mnemonic} {rn}, {operand}"),
            Operation::SetPredicate { cond, dest } => write!(f, "{mnemonic} {cond}, {dest}"),
            Operation::Halt => f.write_str(mnemonic),
        }
    }
}
