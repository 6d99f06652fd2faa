use std::fmt;
use std::str::FromStr;

use crate::state::Flags;

/// Words of addressable memory.
pub const MEMORY_SIZE: usize = 512;
/// Mask for a 9-bit address or program counter.
pub const ADDR_MASK: u16 = 0x1FF;
/// First address of the memory-mapped I/O window.
pub const MMIO_BASE: u16 = 0x1F0;
/// The only address in the I/O window which supports input.
pub const INPUT_PORT: u16 = 0x1F0;
/// Largest value an `#imm3` operand may take.
pub const IMM_MAX: u16 = 0b111;

/// 4-bit operation selector in bits [15:12].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    Ldr = 0x0,
    Str = 0x1,
    Add = 0x2,
    Sub = 0x3,
    And = 0x4,
    Orr = 0x5,
    Xor = 0x6,
    Mov = 0x7,
    Cmp = 0x8,
    Lshl = 0x9,
    Lshr = 0xA,
    Setp = 0xB,
    B = 0xC,
    Hlt = 0xF,
}

impl Opcode {
    pub const ALL: [Opcode; 14] = [
        Opcode::Ldr,
        Opcode::Str,
        Opcode::Add,
        Opcode::Sub,
        Opcode::And,
        Opcode::Orr,
        Opcode::Xor,
        Opcode::Mov,
        Opcode::Cmp,
        Opcode::Lshl,
        Opcode::Lshr,
        Opcode::Setp,
        Opcode::B,
        Opcode::Hlt,
    ];

    pub fn from_bits(bits: u16) -> Option<Opcode> {
        Self::ALL.into_iter().find(|op| *op as u16 == bits)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Ldr => "LDR",
            Opcode::Str => "STR",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::And => "AND",
            Opcode::Orr => "ORR",
            Opcode::Xor => "XOR",
            Opcode::Mov => "MOV",
            Opcode::Cmp => "CMP",
            Opcode::Lshl => "LSHL",
            Opcode::Lshr => "LSHR",
            Opcode::Setp => "SETP",
            Opcode::B => "B",
            Opcode::Hlt => "HLT",
        }
    }

    pub fn base_format(self) -> BaseFormat {
        match self {
            Opcode::Ldr | Opcode::Str => BaseFormat::Memory,
            Opcode::B => BaseFormat::Branch,
            Opcode::Add
            | Opcode::Sub
            | Opcode::And
            | Opcode::Orr
            | Opcode::Xor
            | Opcode::Mov
            | Opcode::Cmp
            | Opcode::Lshl
            | Opcode::Lshr => BaseFormat::DataProc,
            Opcode::Setp => BaseFormat::Setp,
            Opcode::Hlt => BaseFormat::Hlt,
        }
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic() == upper)
            .ok_or(())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Operand syntax family of a mnemonic, before the assembler picks a concrete [`FormatTag`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BaseFormat {
    Memory,
    Branch,
    DataProc,
    Setp,
    Hlt,
}

/// How the operand field of a word must be read.
///
/// Immediate and register forms of the same operation share one bit layout, so a word is only
/// meaningful together with the tag the assembler chose for it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum FormatTag {
    Memory,
    Branch,
    IAlu,
    RAlu,
    IMov,
    RMov,
    ICmp,
    RCmp,
    Setp,
    Hlt,
    /// Placeholder for a line which failed to assemble, or an address holding no instruction.
    #[default]
    Error,
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatTag::Memory => "MEMORY",
            FormatTag::Branch => "BRANCH",
            FormatTag::IAlu => "I_ALU",
            FormatTag::RAlu => "R_ALU",
            FormatTag::IMov => "I_MOV",
            FormatTag::RMov => "R_MOV",
            FormatTag::ICmp => "I_CMP",
            FormatTag::RCmp => "R_CMP",
            FormatTag::Setp => "SETP",
            FormatTag::Hlt => "HLT",
            FormatTag::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// General purpose registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Register {
    pub const ALL: [Register; 8] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
    ];

    /// Only the low 3 bits are considered.
    pub fn from_bits(bits: u16) -> Register {
        Self::ALL[(bits & 0b111) as usize]
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "R0" => Ok(Register::R0),
            "R1" => Ok(Register::R1),
            "R2" => Ok(Register::R2),
            "R3" => Ok(Register::R3),
            "R4" => Ok(Register::R4),
            "R5" => Ok(Register::R5),
            "R6" => Ok(Register::R6),
            "R7" => Ok(Register::R7),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", *self as u8)
    }
}

/// One-bit predicate registers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PredReg {
    /// Readable by predication, never written by `SETP`.
    P0 = 0,
    P1,
    P2,
    P3,
}

impl PredReg {
    pub fn from_bits(bits: u16) -> PredReg {
        match bits & 0b11 {
            0 => PredReg::P0,
            1 => PredReg::P1,
            2 => PredReg::P2,
            _ => PredReg::P3,
        }
    }
}

impl FromStr for PredReg {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "P0" => Ok(PredReg::P0),
            "P1" => Ok(PredReg::P1),
            "P2" => Ok(PredReg::P2),
            "P3" => Ok(PredReg::P3),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PredReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", *self as u8)
    }
}

/// 3-bit predicate selector in bits [11:9].
///
/// Seven tests fit beside "always", so `P3` only has a positive form.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Predicate {
    #[default]
    Always = 0,
    P0,
    NotP0,
    P1,
    NotP1,
    P2,
    NotP2,
    P3,
}

impl Predicate {
    pub fn from_bits(bits: u16) -> Predicate {
        match bits & 0b111 {
            0 => Predicate::Always,
            1 => Predicate::P0,
            2 => Predicate::NotP0,
            3 => Predicate::P1,
            4 => Predicate::NotP1,
            5 => Predicate::P2,
            6 => Predicate::NotP2,
            _ => Predicate::P3,
        }
    }

    pub fn holds(self, preds: &[bool; 4]) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::P0 => preds[0],
            Predicate::NotP0 => !preds[0],
            Predicate::P1 => preds[1],
            Predicate::NotP1 => !preds[1],
            Predicate::P2 => preds[2],
            Predicate::NotP2 => !preds[2],
            Predicate::P3 => preds[3],
        }
    }
}

impl FromStr for Predicate {
    type Err = ();

    /// Parses the text between the parentheses of a `(PRED)` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AL" => Ok(Predicate::Always),
            "P0" => Ok(Predicate::P0),
            "!P0" => Ok(Predicate::NotP0),
            "P1" => Ok(Predicate::P1),
            "!P1" => Ok(Predicate::NotP1),
            "P2" => Ok(Predicate::P2),
            "!P2" => Ok(Predicate::NotP2),
            "P3" => Ok(Predicate::P3),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Predicate::Always => "AL",
            Predicate::P0 => "P0",
            Predicate::NotP0 => "!P0",
            Predicate::P1 => "P1",
            Predicate::NotP1 => "!P1",
            Predicate::P2 => "P2",
            Predicate::NotP2 => "!P2",
            Predicate::P3 => "P3",
        };
        f.write_str(text)
    }
}

/// Named flag conditions, evaluated by `SETP`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Condition {
    /// Z
    Eq = 0,
    /// !Z
    Ne,
    /// C, also `HS`
    Cs,
    /// !C, also `LO`
    Cc,
    /// N
    Mi,
    /// !N
    Pl,
    /// V
    Vs,
    /// !V
    Vc,
    /// C && !Z
    Hi,
    /// !C || Z
    Ls,
    /// N == V
    Ge,
    /// N != V
    Lt,
    /// !Z && N == V
    Gt,
    /// Z || N != V
    Le,
}

impl Condition {
    pub const ALL: [Condition; 14] = [
        Condition::Eq,
        Condition::Ne,
        Condition::Cs,
        Condition::Cc,
        Condition::Mi,
        Condition::Pl,
        Condition::Vs,
        Condition::Vc,
        Condition::Hi,
        Condition::Ls,
        Condition::Ge,
        Condition::Lt,
        Condition::Gt,
        Condition::Le,
    ];

    /// 6-bit condition code.
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Condition> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Condition::Eq => "EQ",
            Condition::Ne => "NE",
            Condition::Cs => "CS",
            Condition::Cc => "CC",
            Condition::Mi => "MI",
            Condition::Pl => "PL",
            Condition::Vs => "VS",
            Condition::Vc => "VC",
            Condition::Hi => "HI",
            Condition::Ls => "LS",
            Condition::Ge => "GE",
            Condition::Lt => "LT",
            Condition::Gt => "GT",
            Condition::Le => "LE",
        }
    }

    pub fn holds(self, flags: Flags) -> bool {
        let Flags { z, n, c, v } = flags;
        match self {
            Condition::Eq => z,
            Condition::Ne => !z,
            Condition::Cs => c,
            Condition::Cc => !c,
            Condition::Mi => n,
            Condition::Pl => !n,
            Condition::Vs => v,
            Condition::Vc => !v,
            Condition::Hi => c && !z,
            Condition::Ls => !c || z,
            Condition::Ge => n == v,
            Condition::Lt => n != v,
            Condition::Gt => !z && n == v,
            Condition::Le => z || n != v,
        }
    }
}

impl FromStr for Condition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS" => Ok(Condition::Cs),
            "LO" => Ok(Condition::Cc),
            upper => Self::ALL
                .into_iter()
                .find(|cond| cond.name() == upper)
                .ok_or(()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names which cannot be used as labels: registers, predicates, conditions and mnemonics.
pub fn is_reserved(name: &str) -> bool {
    name.parse::<Register>().is_ok()
        || name.parse::<PredReg>().is_ok()
        || name.parse::<Condition>().is_ok()
        || name.parse::<Opcode>().is_ok()
        || name.eq_ignore_ascii_case("AL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_bits(op as u16), Some(op));
            assert_eq!(op.mnemonic().parse::<Opcode>(), Ok(op));
        }
        assert_eq!(Opcode::from_bits(0xD), None);
        assert_eq!("lshl".parse::<Opcode>(), Ok(Opcode::Lshl));
    }

    #[test]
    fn predicate_has_no_negated_p3() {
        assert!("!P3".parse::<Predicate>().is_err());
        assert_eq!("p3".parse::<Predicate>(), Ok(Predicate::P3));
        for bits in 0..8 {
            assert_eq!(Predicate::from_bits(bits) as u16, bits);
        }
    }

    #[test]
    fn predicate_tests() {
        let preds = [false, true, false, true];
        assert!(Predicate::Always.holds(&preds));
        assert!(!Predicate::P0.holds(&preds));
        assert!(Predicate::NotP0.holds(&preds));
        assert!(Predicate::P1.holds(&preds));
        assert!(!Predicate::NotP1.holds(&preds));
        assert!(Predicate::NotP2.holds(&preds));
        assert!(Predicate::P3.holds(&preds));
    }

    #[test]
    fn condition_aliases() {
        assert_eq!("hs".parse::<Condition>(), Ok(Condition::Cs));
        assert_eq!("LO".parse::<Condition>(), Ok(Condition::Cc));
        assert_eq!(Condition::from_code(13), Some(Condition::Le));
        assert_eq!(Condition::from_code(14), None);
    }

    #[test]
    fn signed_conditions() {
        // 3 - 5: negative, borrow, no overflow
        let flags = Flags { z: false, n: true, c: false, v: false };
        assert!(Condition::Lt.holds(flags));
        assert!(Condition::Le.holds(flags));
        assert!(!Condition::Gt.holds(flags));
        assert!(Condition::Cc.holds(flags));
        assert!(Condition::Ls.holds(flags));
        assert!(!Condition::Hi.holds(flags));
    }

    #[test]
    fn reserved_names() {
        for name in ["r3", "P0", "eq", "hs", "add", "B", "al"] {
            assert!(is_reserved(name), "{name} should be reserved");
        }
        for name in ["loop", "end", "R8", "P4", "BX"] {
            assert!(!is_reserved(name), "{name} should not be reserved");
        }
    }
}
