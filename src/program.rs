use std::fmt;

use crate::instruction::Instruction;
use crate::isa::{FormatTag, MEMORY_SIZE};
use crate::symbol::SymbolTable;

/// One assembled address: the machine word and the tag needed to execute it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Slot {
    pub word: u16,
    pub tag: FormatTag,
}

impl Slot {
    pub fn new(word: u16, tag: FormatTag) -> Self {
        Slot { word, tag }
    }

    /// Placeholder for a line which failed to assemble.
    pub fn error() -> Self {
        Slot {
            word: 0,
            tag: FormatTag::Error,
        }
    }

    pub fn decode(&self) -> Option<Instruction> {
        Instruction::decode(self.word, self.tag).ok()
    }
}

impl From<Instruction> for Slot {
    fn from(instr: Instruction) -> Self {
        let (word, tag) = instr.encode();
        Slot { word, tag }
    }
}

/// Assembled program: one slot per address starting at 0, plus the symbol table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    slots: Vec<Slot>,
    symbols: SymbolTable,
}

/// Raw words and tags which cannot form a program.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoadError {
    LengthMismatch { words: usize, tags: usize },
    TooLarge(usize),
}

impl std::error::Error for LoadError {}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { words, tags } => {
                write!(f, "{words} words were given with {tags} format tags")
            }
            Self::TooLarge(len) => {
                write!(f, "program of {len} words does not fit in {MEMORY_SIZE} words of memory")
            }
        }
    }
}

impl Program {
    pub(crate) fn new(slots: Vec<Slot>, symbols: SymbolTable) -> Self {
        debug_assert!(slots.len() <= MEMORY_SIZE);
        Program { slots, symbols }
    }

    /// Build from separate word and tag sequences, as produced by [`Program::words`] and
    /// [`Program::tags`].
    pub fn from_parts(words: &[u16], tags: &[FormatTag]) -> Result<Self, LoadError> {
        if words.len() != tags.len() {
            return Err(LoadError::LengthMismatch {
                words: words.len(),
                tags: tags.len(),
            });
        }
        if words.len() > MEMORY_SIZE {
            return Err(LoadError::TooLarge(words.len()));
        }
        let slots = words
            .iter()
            .zip(tags)
            .map(|(&word, &tag)| Slot::new(word, tag))
            .collect();
        Ok(Program::new(slots, SymbolTable::new()))
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn words(&self) -> Vec<u16> {
        self.slots.iter().map(|slot| slot.word).collect()
    }

    pub fn tags(&self) -> Vec<FormatTag> {
        self.slots.iter().map(|slot| slot.tag).collect()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Address, word, tag and disassembly of each slot.
    pub fn listing(&self) -> Listing<'_> {
        Listing(self)
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Slot;
    type IntoIter = std::slice::Iter<'a, Slot>;
    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}

pub struct Listing<'a>(&'a Program);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (addr, slot) in self.0.slots.iter().enumerate() {
            let addr = addr as u16;
            if let Some(label) = self.0.symbols.label_at(addr) {
                writeln!(f, "{label}:")?;
            }
            let text = match slot.decode() {
                Some(instr) => instr.to_string(),
                None => "???".to_string(),
            };
            writeln!(
                f,
                "  0x{addr:03X}  {:04X}  {:<6}  {text}",
                slot.word,
                slot.tag.to_string()
            )?;
        }
        Ok(())
    }
}
