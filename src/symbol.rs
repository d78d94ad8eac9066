use std::collections::HashMap;
use std::fmt;

/// Interned handle for a field, method or global name.
///
/// Two symbols from the same table compare equal iff their strings do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only string interner. Symbols are never removed.
#[derive(Default)]
pub struct SymbolTable {
    lookup: HashMap<Box<str>, Symbol>,
    names: Vec<Box<str>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&symbol) = self.lookup.get(name) {
            return symbol;
        }
        let symbol = Symbol(self.names.len() as u32);
        self.names.push(name.into());
        self.lookup.insert(name.into(), symbol);
        symbol
    }

    /// Returns the symbol for `name` without interning it.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.lookup.get(name).copied()
    }

    /// The string behind `symbol`. Symbols from another table yield `"<unknown>"`.
    pub fn resolve(&self, symbol: Symbol) -> &str {
        self.names
            .get(symbol.0 as usize)
            .map(|name| name.as_ref())
            .unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
