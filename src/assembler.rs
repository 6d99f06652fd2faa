use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AssemblyError, AssemblyErrors, ErrorKind};
use crate::instruction::{AluOp, Instruction, Operand, Operation};
use crate::isa::{
    is_reserved, BaseFormat, Condition, Opcode, PredReg, Predicate, Register, ADDR_MASK, IMM_MAX,
    MEMORY_SIZE,
};
use crate::program::{Program, Slot};
use crate::span::Span;
use crate::symbol::{Duplicate, SymbolTable};

lazy_static! {
    static ref LABEL: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Assemble source text into a loadable program.
///
/// Either every line assembles, or all errors are returned together, sorted by line.
pub fn assemble(src: &str) -> Result<Program, AssemblyErrors> {
    Assembler::new(src).assemble()
}

/// Line which occupies an address.
#[derive(Debug)]
struct SourceLine<'a> {
    /// 1-based
    number: usize,
    /// Instruction text with label and comment removed
    body: &'a str,
}

/// Two-pass assembler. Pass 1 resolves labels, pass 2 emits one slot per instruction line.
pub struct Assembler<'a> {
    src: &'a str,
    symbols: SymbolTable,
    errors: Vec<AssemblyError>,
}

impl<'a> Assembler<'a> {
    pub fn new(src: &'a str) -> Self {
        Assembler {
            src,
            symbols: SymbolTable::new(),
            errors: Vec::new(),
        }
    }

    pub fn assemble(mut self) -> Result<Program, AssemblyErrors> {
        let lines = self.first_pass();
        let slots = self.second_pass(&lines);
        if self.errors.is_empty() {
            Ok(Program::new(slots, self.symbols))
        } else {
            Err(AssemblyErrors::new(self.errors))
        }
    }

    fn span(&self, part: &str) -> Span {
        Span::within(self.src, part)
    }

    fn error(&mut self, kind: ErrorKind, line: usize, part: &str, message: String) {
        let span = self.span(part);
        self.errors.push(AssemblyError::new(kind, line, span, message));
    }

    /// Build the symbol table and collect the lines which consume an address.
    fn first_pass(&mut self) -> Vec<SourceLine<'a>> {
        let src = self.src;
        let mut lines = Vec::new();

        for (idx, raw) in src.lines().enumerate() {
            let number = idx + 1;
            let code = match raw.find(';') {
                Some(comment) => &raw[..comment],
                None => raw,
            }
            .trim();
            if code.is_empty() {
                continue;
            }

            let body = match code.split_once(':') {
                Some((name, rest)) => {
                    self.define_label(name.trim(), lines.len(), number);
                    rest.trim()
                }
                None => code,
            };
            // Label alone on its line names the next instruction
            if body.is_empty() {
                continue;
            }
            lines.push(SourceLine { number, body });
        }

        if let Some(overflow) = lines.get(MEMORY_SIZE) {
            let message = format!(
                "Program has {} instructions but memory holds {MEMORY_SIZE}",
                lines.len()
            );
            self.error(ErrorKind::ProgramTooLarge, overflow.number, overflow.body, message);
        }
        lines
    }

    fn define_label(&mut self, name: &'a str, addr: usize, line: usize) {
        if addr >= MEMORY_SIZE {
            let message =
                format!("Label `{name}` would point past the end of memory (0x{addr:03X})");
            self.error(ErrorKind::OutOfRange, line, name, message);
        } else if !LABEL.is_match(name) {
            let message = format!("Invalid label name `{name}`");
            self.error(ErrorKind::Syntax, line, name, message);
        } else if is_reserved(name) {
            let message = format!("Label `{name}` uses a reserved name");
            self.error(ErrorKind::ReservedLabel, line, name, message);
        } else if let Err(Duplicate { existing }) = self.symbols.insert(name, addr as u16) {
            let message = format!("Label `{name}` is already defined at 0x{existing:03X}");
            self.error(ErrorKind::DuplicateLabel, line, name, message);
        }
    }

    fn second_pass(&mut self, lines: &[SourceLine<'a>]) -> Vec<Slot> {
        lines
            .iter()
            .map(|line| match self.parse_line(line) {
                Ok(instr) => Slot::from(instr),
                Err(err) => {
                    self.errors.push(err);
                    Slot::error()
                }
            })
            .collect()
    }

    fn parse_line(&self, line: &SourceLine<'a>) -> Result<Instruction, AssemblyError> {
        let err = |kind, part: &str, message: String| {
            AssemblyError::new(kind, line.number, self.span(part), message)
        };

        let (predicate, rest) = self.parse_predicate(line)?;
        let (mnemonic, operand_text) = match rest.split_once(char::is_whitespace) {
            Some((mnemonic, operands)) => (mnemonic, operands.trim()),
            None => (rest, ""),
        };
        if mnemonic.is_empty() {
            return Err(err(
                ErrorKind::Syntax,
                line.body,
                "Expected an instruction after the predicate".to_string(),
            ));
        }
        let opcode = mnemonic.parse::<Opcode>().map_err(|()| {
            err(
                ErrorKind::UnknownMnemonic,
                mnemonic,
                format!("Unknown mnemonic `{mnemonic}`"),
            )
        })?;

        let operands: Vec<&str> = if operand_text.is_empty() {
            Vec::new()
        } else {
            operand_text.split(',').map(str::trim).collect()
        };
        let expected = match (opcode.base_format(), opcode) {
            (BaseFormat::Memory | BaseFormat::Branch, _) => 1,
            (BaseFormat::DataProc, Opcode::Cmp) => 2,
            (BaseFormat::DataProc, _) => 3,
            (BaseFormat::Setp, _) => 2,
            (BaseFormat::Hlt, _) => 0,
        };
        if operands.len() != expected {
            let part = if operand_text.is_empty() { mnemonic } else { operand_text };
            return Err(err(
                ErrorKind::OperandCount,
                part,
                format!(
                    "{opcode} expects {expected} operand{}, found {}",
                    if expected == 1 { "" } else { "s" },
                    operands.len()
                ),
            ));
        }

        let op = match opcode {
            Opcode::Ldr => Operation::Load {
                addr: self.parse_address(line, operands[0])?,
            },
            Opcode::Str => Operation::Store {
                addr: self.parse_address(line, operands[0])?,
            },
            Opcode::B => Operation::Branch {
                target: self.parse_address(line, operands[0])?,
            },
            Opcode::Cmp => Operation::Compare {
                rn: self.parse_register(line, operands[0])?,
                operand: self.parse_operand(line, operands[1])?,
            },
            Opcode::Setp => {
                let cond = operands[0].parse::<Condition>().map_err(|()| {
                    err(
                        ErrorKind::Syntax,
                        operands[0],
                        format!("Unknown condition `{}`", operands[0]),
                    )
                })?;
                let dest = match operands[1].parse::<PredReg>() {
                    Ok(PredReg::P0) => {
                        return Err(err(
                            ErrorKind::Syntax,
                            operands[1],
                            "SETP cannot write P0, use P1, P2 or P3".to_string(),
                        ))
                    }
                    Ok(dest) => dest,
                    Err(()) => {
                        return Err(err(
                            ErrorKind::Syntax,
                            operands[1],
                            format!("Expected predicate register P1-P3, found `{}`", operands[1]),
                        ))
                    }
                };
                Operation::SetPredicate { cond, dest }
            }
            Opcode::Hlt => Operation::Halt,
            Opcode::Add => self.parse_alu(line, AluOp::Add, &operands)?,
            Opcode::Sub => self.parse_alu(line, AluOp::Sub, &operands)?,
            Opcode::And => self.parse_alu(line, AluOp::And, &operands)?,
            Opcode::Orr => self.parse_alu(line, AluOp::Orr, &operands)?,
            Opcode::Xor => self.parse_alu(line, AluOp::Xor, &operands)?,
            Opcode::Mov => self.parse_alu(line, AluOp::Mov, &operands)?,
            Opcode::Lshl => self.parse_alu(line, AluOp::Lshl, &operands)?,
            Opcode::Lshr => self.parse_alu(line, AluOp::Lshr, &operands)?,
        };
        Ok(Instruction::new(predicate, op))
    }

    /// Split an optional leading `(PRED)` from the line.
    fn parse_predicate(&self, line: &SourceLine<'a>) -> Result<(Predicate, &'a str), AssemblyError> {
        let body = line.body;
        if !body.starts_with('(') {
            return Ok((Predicate::Always, body));
        }
        let Some(close) = body.find(')') else {
            return Err(AssemblyError::new(
                ErrorKind::Syntax,
                line.number,
                self.span(body),
                "Unclosed predicate, expected `)`",
            ));
        };
        let inner = &body[1..close];
        let predicate = inner.parse::<Predicate>().map_err(|()| {
            AssemblyError::new(
                ErrorKind::Syntax,
                line.number,
                self.span(&body[..=close]),
                format!("Unknown predicate `({})`", inner.trim()),
            )
        })?;
        Ok((predicate, body[close + 1..].trim_start()))
    }

    fn parse_alu(
        &self,
        line: &SourceLine<'a>,
        op: AluOp,
        operands: &[&str],
    ) -> Result<Operation, AssemblyError> {
        Ok(Operation::Alu {
            op,
            rd: self.parse_register(line, operands[0])?,
            rn: self.parse_register(line, operands[1])?,
            operand: self.parse_operand(line, operands[2])?,
        })
    }

    fn parse_register(&self, line: &SourceLine<'a>, text: &str) -> Result<Register, AssemblyError> {
        text.parse::<Register>().map_err(|()| {
            AssemblyError::new(
                ErrorKind::Syntax,
                line.number,
                self.span(text),
                format!("Expected register R0-R7, found `{text}`"),
            )
        })
    }

    /// Register, or `#`-prefixed 3-bit immediate.
    fn parse_operand(&self, line: &SourceLine<'a>, text: &str) -> Result<Operand, AssemblyError> {
        if let Some(imm) = text.strip_prefix('#') {
            let out_of_range = |message: String| {
                AssemblyError::new(ErrorKind::OutOfRange, line.number, self.span(text), message)
            };
            let value = parse_number(imm)
                .ok_or_else(|| out_of_range(format!("Invalid immediate `{text}`")))?;
            if value > IMM_MAX as u32 {
                return Err(out_of_range(format!(
                    "Immediate {text} does not fit in 3 bits (#0 to #{IMM_MAX})"
                )));
            }
            return Ok(Operand::Imm3(value as u16));
        }
        match text.parse::<Register>() {
            Ok(reg) => Ok(Operand::Reg(reg)),
            Err(()) => Err(AssemblyError::new(
                ErrorKind::Syntax,
                line.number,
                self.span(text),
                format!("Expected register or #immediate, found `{text}`"),
            )),
        }
    }

    /// `0x` hex, bare decimal, or label.
    fn parse_address(&self, line: &SourceLine<'a>, text: &str) -> Result<u16, AssemblyError> {
        let err = |kind, message: String| {
            AssemblyError::new(kind, line.number, self.span(text), message)
        };
        let is_numeric = text.starts_with(|c: char| c.is_ascii_digit());
        let value = if is_numeric {
            let lower = text.to_ascii_lowercase();
            let parsed = match lower.strip_prefix("0x") {
                Some(hex) => parse_digits(hex, 16),
                None => parse_digits(&lower, 10),
            };
            parsed.ok_or_else(|| err(ErrorKind::OutOfRange, format!("Invalid address `{text}`")))?
        } else if LABEL.is_match(text) {
            let addr = self.symbols.get(text).ok_or_else(|| {
                err(ErrorKind::UndefinedLabel, format!("Undefined label `{text}`"))
            })?;
            addr as u32
        } else {
            return Err(err(ErrorKind::OutOfRange, format!("Invalid address `{text}`")));
        };
        if value > ADDR_MASK as u32 {
            return Err(err(
                ErrorKind::OutOfRange,
                format!("Address `{text}` is outside memory (0 to {ADDR_MASK})"),
            ));
        }
        Ok(value as u16)
    }
}

/// Decimal, `0x` hex or `0b` binary.
fn parse_number(text: &str) -> Option<u32> {
    let lower = text.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        parse_digits(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        parse_digits(bin, 2)
    } else {
        parse_digits(&lower, 10)
    }
}

/// Unsigned digits only. `from_str_radix` alone would accept a leading sign.
fn parse_digits(digits: &str, radix: u32) -> Option<u32> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::FormatTag;

    fn errors(src: &str) -> Vec<(usize, ErrorKind)> {
        assemble(src)
            .unwrap_err()
            .iter()
            .map(|err| (err.line, err.kind))
            .collect()
    }

    fn single(src: &str) -> Instruction {
        let program = assemble(src).unwrap();
        assert_eq!(program.len(), 1);
        program.slots()[0].decode().unwrap()
    }

    #[test]
    fn assemble_basic_program() {
        let program = assemble(
            "MOV R0, R7, #5\n\
             MOV R1, R7, #7\n\
             ADD R2, R0, #2\n\
             SUB R3, R1, #4\n\
             HLT",
        )
        .unwrap();
        assert_eq!(
            program.tags(),
            [
                FormatTag::IMov,
                FormatTag::IMov,
                FormatTag::IAlu,
                FormatTag::IAlu,
                FormatTag::Hlt
            ]
        );
        assert_eq!(program.words()[0], 0x7000 | 7 << 3 | 5);
        assert_eq!(program.words()[4], 0xF000);
    }

    #[test]
    fn immediate_vs_register_tag() {
        let imm = assemble("ADD R1, R2, #3").unwrap();
        let reg = assemble("ADD R1, R2, R3").unwrap();
        assert_eq!(imm.words(), reg.words());
        assert_eq!(imm.tags(), [FormatTag::IAlu]);
        assert_eq!(reg.tags(), [FormatTag::RAlu]);
        assert_eq!(assemble("MOV R1, R2, R3").unwrap().tags(), [FormatTag::RMov]);
        assert_eq!(assemble("CMP R1, #0b11").unwrap().tags(), [FormatTag::ICmp]);
        assert_eq!(assemble("cmp r1, r2").unwrap().tags(), [FormatTag::RCmp]);
    }

    #[test]
    fn labels() {
        let program = assemble(
            "; counts down\n\
             start:\n\
             \n\
             loop: SUB R0, R0, #1  ; decrement\n\
             B LOOP\n\
             done: HLT\n\
             B start",
        )
        .unwrap();
        assert_eq!(program.symbols().get("start"), Some(0));
        assert_eq!(program.symbols().get("loop"), Some(0));
        assert_eq!(program.symbols().get("DONE"), Some(2));
        assert_eq!(program.len(), 4);
        assert_eq!(
            program.slots()[1].decode().unwrap().op,
            Operation::Branch { target: 0 }
        );
    }

    #[test]
    fn trailing_label_names_end_of_program() {
        let program = assemble("B end\nHLT\nend:").unwrap();
        assert_eq!(program.symbols().get("end"), Some(2));
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn forward_reference() {
        let instr = single("B skip\nskip:");
        assert_eq!(instr.op, Operation::Branch { target: 1 });
    }

    #[test]
    fn addresses() {
        assert_eq!(single("LDR 0x1F0").op, Operation::Load { addr: 0x1F0 });
        assert_eq!(single("STR 511").op, Operation::Store { addr: 511 });
        assert_eq!(single("B 0X00a").op, Operation::Branch { target: 10 });
    }

    #[test]
    fn predicates() {
        assert_eq!(single("(P0) HLT").predicate, Predicate::P0);
        assert_eq!(single("(!p2) HLT").predicate, Predicate::NotP2);
        assert_eq!(single("( AL ) HLT").predicate, Predicate::Always);
        assert_eq!(single("(P3)MOV R3, R7, #1").predicate, Predicate::P3);
        assert_eq!(errors("(!P3) HLT"), [(1, ErrorKind::Syntax)]);
        assert_eq!(errors("(P1 HLT"), [(1, ErrorKind::Syntax)]);
        assert_eq!(errors("(P1)"), [(1, ErrorKind::Syntax)]);
    }

    #[test]
    fn setp() {
        assert_eq!(
            single("SETP hs, P3").op,
            Operation::SetPredicate {
                cond: Condition::Cs,
                dest: PredReg::P3
            }
        );
        assert_eq!(errors("SETP EQ, P0"), [(1, ErrorKind::Syntax)]);
        assert_eq!(errors("SETP XX, P1"), [(1, ErrorKind::Syntax)]);
        assert_eq!(errors("SETP EQ, R1"), [(1, ErrorKind::Syntax)]);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(errors("ADD R0, R0, #8"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("ADD R0, R0, #-1"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("MOV R0, R0, #0x10"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("CMP R0, #abc"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("LDR 512"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("LDR 0x200"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("B 12abc"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("B 0x-1"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("LDR 0x+10"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("CMP R0, #0b-1"), [(1, ErrorKind::OutOfRange)]);
        assert_eq!(errors("CMP R0, #+1"), [(1, ErrorKind::OutOfRange)]);
    }

    #[test]
    fn operand_errors() {
        assert_eq!(errors("ADD R0, R1"), [(1, ErrorKind::OperandCount)]);
        assert_eq!(errors("CMP R0, R1, R2"), [(1, ErrorKind::OperandCount)]);
        assert_eq!(errors("HLT R0"), [(1, ErrorKind::OperandCount)]);
        assert_eq!(errors("LDR"), [(1, ErrorKind::OperandCount)]);
        assert_eq!(errors("ADD R8, R0, R1"), [(1, ErrorKind::Syntax)]);
        assert_eq!(errors("ADD R0, #1, R1"), [(1, ErrorKind::Syntax)]);
        assert_eq!(errors("NOP"), [(1, ErrorKind::UnknownMnemonic)]);
        assert_eq!(errors("B nowhere"), [(1, ErrorKind::UndefinedLabel)]);
    }

    #[test]
    fn label_errors() {
        assert_eq!(
            errors("a: HLT\nA: HLT"),
            [(2, ErrorKind::DuplicateLabel)]
        );
        assert_eq!(errors("r1: HLT"), [(1, ErrorKind::ReservedLabel)]);
        assert_eq!(errors("add:\nHLT"), [(1, ErrorKind::ReservedLabel)]);
        assert_eq!(errors("ge: HLT"), [(1, ErrorKind::ReservedLabel)]);
        assert_eq!(errors("1st: HLT"), [(1, ErrorKind::Syntax)]);
    }

    #[test]
    fn collects_every_error_in_line_order() {
        let errs = errors(
            "B missing\n\
             ADD R0, R0, #9\n\
             HLT\n\
             x: FOO\n\
             x: HLT",
        );
        assert_eq!(
            errs,
            [
                (1, ErrorKind::UndefinedLabel),
                (2, ErrorKind::OutOfRange),
                (4, ErrorKind::UnknownMnemonic),
                (5, ErrorKind::DuplicateLabel),
            ]
        );
    }

    #[test]
    fn program_too_large() {
        let src = "HLT\n".repeat(MEMORY_SIZE + 1);
        assert_eq!(errors(&src), [(MEMORY_SIZE + 1, ErrorKind::ProgramTooLarge)]);
        let src = "HLT\n".repeat(MEMORY_SIZE);
        assert_eq!(assemble(&src).unwrap().len(), MEMORY_SIZE);
    }

    #[test]
    fn label_past_end_of_memory() {
        let src = "HLT\n".repeat(MEMORY_SIZE) + "end:";
        assert_eq!(errors(&src), [(MEMORY_SIZE + 1, ErrorKind::OutOfRange)]);

        let src = "HLT\n".repeat(MEMORY_SIZE - 1) + "last: HLT";
        let program = assemble(&src).unwrap();
        assert_eq!(program.symbols().get("last"), Some(0x1FF));
    }

    #[test]
    fn deterministic() {
        let src = "top: CMP R0, #1\nSETP NE, P1\n(P1) B top\nHLT";
        assert_eq!(assemble(src), assemble(src));
    }

    #[test]
    fn error_spans_point_at_operand() {
        let src = "HLT\nADD R0, R0, #9";
        let errs = assemble(src).unwrap_err();
        let err = errs.iter().next().unwrap();
        assert_eq!(&src[err.span.as_range()], "#9");
    }
}
