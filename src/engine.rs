use std::fmt;

use crate::instruction::{DecodeError, Instruction, Operand, Operation};
use crate::io::{is_mmio, ReadOutcome};
use crate::isa::{FormatTag, Register};
use crate::state::{Flags, MachineState};

/// Register which `LDR`/`STR` transfer through.
pub const TRANSFER_REGISTER: Register = Register::R0;

/// What happened while executing one instruction.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Effect {
    /// Disassembly and result, eg. `ADD R2, R0, #2 -> R2 = 0x0007`.
    pub trace: String,
    /// Set by `HLT`.
    pub halted: bool,
    /// Set by a load from the input port.
    pub suspended: bool,
    /// Recoverable I/O condition worth reporting.
    pub warning: Option<String>,
}

/// Instruction which could not be executed. The machine is halted when this is returned.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Fault {
    /// Address the instruction was fetched from.
    pub pc: u16,
    pub word: u16,
    pub tag: FormatTag,
    pub kind: DecodeError,
}

impl std::error::Error for Fault {}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid instruction 0x{:04X} ({}) at 0x{:03X}: {}",
            self.word, self.tag, self.pc, self.kind
        )
    }
}

/// Execute one fetched instruction.
///
/// `pc` is the address the word came from; the state's PC must already point past it.
pub fn execute(
    pc: u16,
    word: u16,
    tag: FormatTag,
    state: &mut MachineState,
) -> Result<Effect, Fault> {
    let instr = match Instruction::decode(word, tag) {
        Ok(instr) => instr,
        Err(kind) => {
            state.halt();
            return Err(Fault { pc, word, tag, kind });
        }
    };

    if !instr.predicate.holds(&state.predicates()) {
        return Ok(Effect {
            trace: format!("{instr} -> skipped"),
            ..Default::default()
        });
    }

    let mut effect = Effect::default();
    let result = match instr.op {
        Operation::Load { addr } if is_mmio(addr) => {
            match state.io.read(addr, TRANSFER_REGISTER) {
                ReadOutcome::Suspended => {
                    effect.suspended = true;
                    format!("waiting for input at 0x{addr:03X}")
                }
                ReadOutcome::Unmapped { warning } => {
                    *state.reg_mut(TRANSFER_REGISTER) = 0;
                    effect.warning = Some(warning);
                    format!("{TRANSFER_REGISTER} = 0x0000")
                }
            }
        }
        Operation::Load { addr } => {
            let val = state.mem(addr);
            *state.reg_mut(TRANSFER_REGISTER) = val;
            format!("{TRANSFER_REGISTER} = 0x{val:04X}")
        }
        Operation::Store { addr } => {
            let val = state.reg(TRANSFER_REGISTER);
            if is_mmio(addr) {
                state.io.write(addr, val);
                format!("output 0x{val:04X} to 0x{addr:03X}")
            } else {
                *state.mem_mut(addr) = val;
                format!("mem[0x{addr:03X}] = 0x{val:04X}")
            }
        }
        Operation::Branch { target } => {
            state.set_pc(target);
            format!("PC = 0x{target:03X}")
        }
        Operation::Alu {
            op,
            rd,
            rn,
            operand,
        } => {
            let val = op.apply(state.reg(rn), operand_value(state, operand));
            *state.reg_mut(rd) = val;
            format!("{rd} = 0x{val:04X}")
        }
        Operation::Compare { rn, operand } => {
            let flags = Flags::from_sub(state.reg(rn), operand_value(state, operand));
            state.set_flags(flags);
            let bit = |set: bool| set as u8;
            format!(
                "Z={} N={} C={} V={}",
                bit(flags.z),
                bit(flags.n),
                bit(flags.c),
                bit(flags.v)
            )
        }
        Operation::SetPredicate { cond, dest } => {
            let val = cond.holds(state.flags());
            state.set_predicate(dest, val);
            format!("{dest} = {}", val as u8)
        }
        Operation::Halt => {
            state.halt();
            effect.halted = true;
            "halted".to_string()
        }
    };
    effect.trace = format!("{instr} -> {result}");
    Ok(effect)
}

fn operand_value(state: &MachineState, operand: Operand) -> u16 {
    match operand {
        Operand::Reg(reg) => state.reg(reg),
        Operand::Imm3(val) => val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::isa::PredReg;

    /// Assemble `src` and execute it until halt, suspend or fault.
    fn run(src: &str) -> MachineState {
        let program = assemble(src).unwrap();
        let mut state = MachineState::with_program(&program);
        for _ in 0..1000 {
            let (pc, word, tag) = state.fetch();
            let effect = execute(pc, word, tag, &mut state).unwrap();
            if effect.halted || effect.suspended {
                break;
            }
        }
        state
    }

    #[test]
    fn arithmetic() {
        let state = run("MOV R0, R7, #5\n\
                         MOV R1, R7, #7\n\
                         ADD R2, R0, #2\n\
                         SUB R3, R1, #4\n\
                         HLT");
        assert_eq!(state.reg(Register::R0), 5);
        assert_eq!(state.reg(Register::R1), 7);
        assert_eq!(state.reg(Register::R2), 7);
        assert_eq!(state.reg(Register::R3), 3);
        assert_eq!(state.pc(), 5);
        assert!(state.halted());
    }

    #[test]
    fn logic_and_shifts() {
        let state = run("MOV R0, R0, #6\n\
                         MOV R1, R1, #3\n\
                         AND R2, R0, R1\n\
                         ORR R3, R0, R1\n\
                         XOR R4, R0, R1\n\
                         LSHL R5, R0, #7\n\
                         LSHR R6, R5, R1\n\
                         SUB R7, R7, #1\n\
                         HLT");
        assert_eq!(state.reg(Register::R2), 2);
        assert_eq!(state.reg(Register::R3), 7);
        assert_eq!(state.reg(Register::R4), 5);
        assert_eq!(state.reg(Register::R5), 6 << 7);
        assert_eq!(state.reg(Register::R6), 6 << 4);
        assert_eq!(state.reg(Register::R7), 0xFFFF);
        // ALU operations leave flags alone
        assert_eq!(state.flags(), Flags::default());
    }

    #[test]
    fn compare_equal() {
        let state = run("MOV R0, R7, #7\nMOV R1, R7, #7\nCMP R0, R1\nHLT");
        assert_eq!(
            state.flags(),
            Flags { z: true, n: false, c: true, v: false }
        );
    }

    #[test]
    fn compare_less() {
        let state = run("MOV R0, R7, #3\nMOV R1, R7, #5\nCMP R0, R1\nHLT");
        assert_eq!(
            state.flags(),
            Flags { z: false, n: true, c: false, v: false }
        );
        // CMP writes no register
        assert_eq!(state.reg(Register::R0), 3);
        assert_eq!(state.reg(Register::R1), 5);
    }

    #[test]
    fn false_predicate_only_advances_pc() {
        let program = assemble("(P0) MOV R3, R7, #1\nHLT").unwrap();
        let mut state = MachineState::with_program(&program);
        *state.reg_mut(Register::R3) = 42;
        let before = state.clone();
        let (pc, word, tag) = state.fetch();
        let effect = execute(pc, word, tag, &mut state).unwrap();
        assert!(effect.trace.ends_with("skipped"));
        assert_eq!(state.pc(), 1);
        assert_eq!(state.registers(), before.registers());
        assert_eq!(state.flags(), before.flags());
        assert_eq!(state.predicates(), before.predicates());
        assert_eq!(state.memory(), before.memory());
    }

    #[test]
    fn setp_and_predicated_branch() {
        // Count R0 up to 3 using a predicated back-branch
        let state = run("loop: ADD R0, R0, #1\n\
                         CMP R0, #3\n\
                         SETP LT, P1\n\
                         (P1) B loop\n\
                         SETP EQ, P2\n\
                         HLT");
        assert_eq!(state.reg(Register::R0), 3);
        assert!(!state.predicate(PredReg::P1));
        assert!(state.predicate(PredReg::P2));
        assert!(!state.predicate(PredReg::P0));
    }

    #[test]
    fn negated_predicate() {
        let state = run("(!P0) MOV R1, R1, #4\n(P3) MOV R2, R2, #4\nHLT");
        assert_eq!(state.reg(Register::R1), 4);
        assert_eq!(state.reg(Register::R2), 0);
    }

    #[test]
    fn false_predicate_leaves_io_alone() {
        // Flags are clear, so EQ leaves P2 false
        let state = run("MOV R0, R0, #6\n\
                         (!P0) SETP EQ, P2\n\
                         (P2) LDR 0x1F0\n\
                         (P2) STR 0x1F1\n\
                         HLT");
        assert!(!state.waiting_for_input());
        assert!(state.io().output().is_empty());
        assert_eq!(state.reg(Register::R0), 6);
        assert!(state.halted());
    }

    #[test]
    fn load_store_round_trip() {
        let program = assemble("LDR data\nSTR 0x100\nHLT\ndata: HLT").unwrap();
        let mut state = MachineState::with_program(&program);
        *state.mem_mut(3) = 0xBEEF;
        for _ in 0..3 {
            let (pc, word, tag) = state.fetch();
            execute(pc, word, tag, &mut state).unwrap();
        }
        assert_eq!(state.reg(TRANSFER_REGISTER), 0xBEEF);
        assert_eq!(state.mem(0x100), 0xBEEF);
        assert!(state.halted());
    }

    #[test]
    fn mmio() {
        let state = run("MOV R0, R0, #5\nSTR 0x1F4\nLDR 0x1F8\nSTR 0x1FF\nHLT");
        let output: Vec<_> = state
            .io()
            .output()
            .iter()
            .map(|rec| (rec.address, rec.value))
            .collect();
        assert_eq!(output, [(0x1F4, 5), (0x1FF, 0)]);
        // Plain memory untouched by I/O stores
        assert_eq!(state.mem(0x1F4), 0);
    }

    #[test]
    fn input_suspends_without_writing() {
        let program = assemble("MOV R0, R0, #2\nLDR 0x1F0\nHLT").unwrap();
        let mut state = MachineState::with_program(&program);
        for expected_suspend in [false, true] {
            let (pc, word, tag) = state.fetch();
            let effect = execute(pc, word, tag, &mut state).unwrap();
            assert_eq!(effect.suspended, expected_suspend);
        }
        assert!(state.waiting_for_input());
        assert_eq!(state.reg(Register::R0), 2);
        assert_eq!(state.pc(), 2);
    }

    #[test]
    fn error_tag_faults_and_halts() {
        let mut state = MachineState::new();
        let (pc, word, tag) = state.fetch();
        let fault = execute(pc, word, tag, &mut state).unwrap_err();
        assert_eq!(fault.pc, 0);
        assert_eq!(fault.kind, DecodeError::ErrorTag);
        assert!(state.halted());
        assert!(fault.to_string().contains("0x000"));
    }

    #[test]
    fn trace_text() {
        let program = assemble("ADD R2, R0, #2").unwrap();
        let mut state = MachineState::with_program(&program);
        let (pc, word, tag) = state.fetch();
        let effect = execute(pc, word, tag, &mut state).unwrap();
        assert_eq!(effect.trace, "ADD R2, R0, #2 -> R2 = 0x0002");
    }
}
