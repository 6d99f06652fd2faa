use fxhash::FxBuildHasher;
use indexmap::IndexMap;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Label -> address, in order of definition.
///
/// Labels are case-insensitive and stored upper-cased.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolTable {
    table: FxMap<String, u16>,
}

/// Returned when a label is defined twice.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Duplicate {
    /// Address of the first definition.
    pub existing: u16,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    pub fn insert(&mut self, name: &str, addr: u16) -> Result<(), Duplicate> {
        let key = name.to_ascii_uppercase();
        if let Some(&existing) = self.table.get(&key) {
            return Err(Duplicate { existing });
        }
        self.table.insert(key, addr);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.table.get(&name.to_ascii_uppercase()).copied()
    }

    /// First label pointing at `addr`, used for listings.
    pub fn label_at(&self, addr: u16) -> Option<&str> {
        self.table
            .iter()
            .find(|(_, &value)| value == addr)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.table.iter().map(|(name, &addr)| (name.as_str(), addr))
    }
}
