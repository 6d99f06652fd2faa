//! Memory-mapped I/O window at `0x1F0..=0x1FF`.
//!
//! Input is only available at [`INPUT_PORT`] and never completes within the instruction that
//! requested it: the machine suspends until a value is supplied from outside. Output is
//! recorded synchronously.

use crate::isa::{Register, INPUT_PORT, MMIO_BASE};

/// Whether an address belongs to the I/O window.
pub fn is_mmio(addr: u16) -> bool {
    addr >= MMIO_BASE
}

/// Load which is blocked on external input.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PendingInput {
    pub address: u16,
    pub dest: Register,
}

/// One store to the I/O window.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OutputRecord {
    pub address: u16,
    pub value: u16,
}

/// Result of a load from the I/O window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Machine must stop until [`IoController::provide`] is called.
    Suspended,
    /// No device at this address; the load yields zero.
    Unmapped { warning: String },
}

/// Value given to a suspended load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resumed {
    pub dest: Register,
    pub value: u16,
    /// Set if the raw text was not a valid number.
    pub warning: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct IoController {
    pending: Option<PendingInput>,
    output: Vec<OutputRecord>,
}

impl IoController {
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<PendingInput> {
        self.pending
    }

    /// Append-only log of every store to the window.
    pub fn output(&self) -> &[OutputRecord] {
        &self.output
    }

    pub(crate) fn read(&mut self, address: u16, dest: Register) -> ReadOutcome {
        if address == INPUT_PORT {
            self.pending = Some(PendingInput { address, dest });
            ReadOutcome::Suspended
        } else {
            ReadOutcome::Unmapped {
                warning: format!("No input device at 0x{address:03X}, read 0."),
            }
        }
    }

    pub(crate) fn write(&mut self, address: u16, value: u16) {
        self.output.push(OutputRecord { address, value });
    }

    /// Complete the pending load. Returns `None` if nothing is waiting.
    ///
    /// Malformed input is replaced with 0. Valid numbers are masked to 16 bits.
    pub(crate) fn provide(&mut self, raw: &str) -> Option<Resumed> {
        let PendingInput { dest, .. } = self.pending.take()?;
        let (value, warning) = match parse_input(raw) {
            Some(value) => (value, None),
            None => (
                0,
                Some(format!("Input `{}` is not a valid number, using 0.", raw.trim())),
            ),
        };
        Some(Resumed {
            dest,
            value,
            warning,
        })
    }
}

/// Decimal (optionally negative), `0x` hex or `0b` binary, masked to 16 bits.
pub fn parse_input(raw: &str) -> Option<u16> {
    let text = raw.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, digits) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else {
        (10, lower.as_str())
    };
    // `from_str_radix` would also take a sign after the prefix
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    Some((value & 0xFFFF) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_port_suspends() {
        let mut io = IoController::default();
        assert_eq!(io.read(INPUT_PORT, Register::R0), ReadOutcome::Suspended);
        assert!(io.is_waiting());
        assert_eq!(
            io.pending(),
            Some(PendingInput {
                address: 0x1F0,
                dest: Register::R0
            })
        );
        let resumed = io.provide("1234").unwrap();
        assert_eq!(resumed.value, 1234);
        assert_eq!(resumed.warning, None);
        assert!(!io.is_waiting());
        assert_eq!(io.provide("1"), None);
    }

    #[test]
    fn other_addresses_read_zero() {
        let mut io = IoController::default();
        assert!(matches!(
            io.read(0x1F3, Register::R0),
            ReadOutcome::Unmapped { .. }
        ));
        assert!(!io.is_waiting());
    }

    #[test]
    fn malformed_input_defaults_to_zero() {
        let mut io = IoController::default();
        io.read(INPUT_PORT, Register::R0);
        let resumed = io.provide("twelve").unwrap();
        assert_eq!(resumed.value, 0);
        assert!(resumed.warning.is_some());
    }

    #[test]
    fn parse_input_masks() {
        assert_eq!(parse_input("65536"), Some(0));
        assert_eq!(parse_input("70000"), Some(4464));
        assert_eq!(parse_input("-1"), Some(0xFFFF));
        assert_eq!(parse_input(" 0x1F "), Some(0x1F));
        assert_eq!(parse_input("0b101"), Some(5));
        assert_eq!(parse_input(""), None);
        assert_eq!(parse_input("+3"), None);
        assert_eq!(parse_input("1e3"), None);
        assert_eq!(parse_input("0x-1"), None);
        assert_eq!(parse_input("0b+1"), None);
        assert_eq!(parse_input("-0x-5"), None);
        assert_eq!(parse_input("0x"), None);
        assert_eq!(parse_input("-0x5"), Some(0xFFFB));
    }

    #[test]
    fn writes_are_recorded_in_order() {
        let mut io = IoController::default();
        io.write(0x1F1, 5);
        io.write(0x1F0, 6);
        assert_eq!(
            io.output(),
            &[
                OutputRecord { address: 0x1F1, value: 5 },
                OutputRecord { address: 0x1F0, value: 6 }
            ]
        );
    }
}
