use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::span::Span;

/// Category of an assembly error.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    UnknownMnemonic,
    OperandCount,
    /// Address > 511, immediate > 7, or not a number.
    OutOfRange,
    UndefinedLabel,
    DuplicateLabel,
    /// Label collides with a register, predicate, condition or mnemonic.
    ReservedLabel,
    ProgramTooLarge,
    /// Malformed operand, predicate or label.
    Syntax,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::UnknownMnemonic => "asm::mnemonic",
            ErrorKind::OperandCount => "asm::operands",
            ErrorKind::OutOfRange => "asm::range",
            ErrorKind::UndefinedLabel => "asm::undefined_label",
            ErrorKind::DuplicateLabel => "asm::duplicate_label",
            ErrorKind::ReservedLabel => "asm::reserved_label",
            ErrorKind::ProgramTooLarge => "asm::too_large",
            ErrorKind::Syntax => "asm::syntax",
        }
    }

    fn help(self) -> &'static str {
        match self {
            ErrorKind::UnknownMnemonic => {
                "available mnemonics: LDR STR ADD SUB AND ORR XOR MOV CMP LSHL LSHR SETP B HLT"
            }
            ErrorKind::OperandCount => "check the operands for this instruction",
            ErrorKind::OutOfRange => "addresses range from 0 to 511 and immediates from #0 to #7",
            ErrorKind::UndefinedLabel => "labels must be defined somewhere in the file",
            ErrorKind::DuplicateLabel => "labels are only allowed once per file",
            ErrorKind::ReservedLabel => {
                "register, predicate, condition and mnemonic names cannot be labels"
            }
            ErrorKind::ProgramTooLarge => "programs may contain at most 512 instructions",
            ErrorKind::Syntax => "check the syntax of this line",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ErrorKind::UnknownMnemonic => "unknown mnemonic",
            ErrorKind::OperandCount => "wrong operand count",
            ErrorKind::OutOfRange => "out of range",
            ErrorKind::UndefinedLabel => "undefined label",
            ErrorKind::DuplicateLabel => "duplicate label",
            ErrorKind::ReservedLabel => "reserved name",
            ErrorKind::ProgramTooLarge => "does not fit in memory",
            ErrorKind::Syntax => "invalid syntax",
        }
    }
}

/// Error found while assembling a single line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssemblyError {
    pub message: String,
    /// 1-based source line
    pub line: usize,
    pub kind: ErrorKind,
    pub span: Span,
}

impl AssemblyError {
    pub fn new(kind: ErrorKind, line: usize, span: Span, message: impl Into<String>) -> Self {
        AssemblyError {
            message: message.into(),
            line,
            kind,
            span,
        }
    }

    /// Diagnostic pointing into `src`.
    pub fn report(&self, src: &str) -> Report {
        miette!(
            severity = Severity::Error,
            code = self.kind.code(),
            help = self.kind.help(),
            labels = vec![LabeledSpan::at(self.span, self.kind.label())],
            "{}",
            self.message
        )
        .with_source_code(src.to_string())
    }
}

impl std::error::Error for AssemblyError {}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Every error found in one assembly, ordered by line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssemblyErrors(Vec<AssemblyError>);

impl AssemblyErrors {
    pub(crate) fn new(mut errors: Vec<AssemblyError>) -> Self {
        // Stable, so errors on one line keep their discovery order
        errors.sort_by_key(|err| err.line);
        AssemblyErrors(errors)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssemblyError> {
        self.0.iter()
    }

    pub fn reports<'a>(&'a self, src: &'a str) -> impl Iterator<Item = Report> + 'a {
        self.0.iter().map(move |err| err.report(src))
    }
}

impl<'a> IntoIterator for &'a AssemblyErrors {
    type Item = &'a AssemblyError;
    type IntoIter = std::slice::Iter<'a, AssemblyError>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::error::Error for AssemblyErrors {}

impl fmt::Display for AssemblyErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.0.len();
        write!(
            f,
            "Assembly failed with {} error{}",
            count,
            if count == 1 { "" } else { "s" }
        )?;
        for err in &self.0 {
            write!(f, "\n  {err}")?;
        }
        Ok(())
    }
}
