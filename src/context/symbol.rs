use crate::ScopeId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Type,
    Parameter,
    Unknown,
}

/// A symbol tracked while parsing, uniquely keyed by `(scope, name)`.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub type_name: Option<String>,
    pub scope: ScopeId,
    pub position: usize,
    pub references: Vec<usize>,
    pub definition: Option<usize>,
    pub context_path: Vec<String>,
}

/// The engine's symbol table. Redefinition in the same scope is an overwrite;
/// lookups walk a caller-supplied scope chain innermost-first.
pub struct SymbolTable {
    symbols: HashMap<(ScopeId, String), SymbolInfo>,
    next_scope: u32,
}

impl SymbolInfo {
    pub fn new(name: impl Into<String>, kind: SymbolKind, scope: ScopeId, position: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            type_name: None,
            scope,
            position,
            references: Vec::new(),
            definition: Some(position),
            context_path: Vec::new(),
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create a table with the global scope already allocated as scope 0.
    pub fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            next_scope: 1,
        }
    }

    pub fn global_scope() -> ScopeId {
        ScopeId(0)
    }

    /// Allocate a fresh scope id. Ids are never reused until [SymbolTable::clear].
    pub fn new_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        id
    }

    /// Define or overwrite a symbol in its scope.
    pub fn define(&mut self, info: SymbolInfo) {
        self.symbols.insert((info.scope, info.name.clone()), info);
    }

    /// Look `name` up along `chain`, innermost scope last.
    pub fn lookup(&self, chain: &[ScopeId], name: &str) -> Option<&SymbolInfo> {
        chain
            .iter()
            .rev()
            .find_map(|scope| self.symbols.get(&(*scope, name.to_string())))
    }

    pub fn get(&self, scope: ScopeId, name: &str) -> Option<&SymbolInfo> {
        self.symbols.get(&(scope, name.to_string()))
    }

    /// Record a reference to a visible symbol; returns false when unresolved.
    pub fn add_reference(&mut self, chain: &[ScopeId], name: &str, position: usize) -> bool {
        let scope = match self.lookup(chain, name) {
            Some(info) => info.scope,
            None => return false,
        };
        if let Some(info) = self.symbols.get_mut(&(scope, name.to_string())) {
            info.references.push(position);
        }
        true
    }

    /// Names defined directly in `scope`, sorted for deterministic output.
    pub fn names_in_scope(&self, scope: ScopeId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .symbols
            .keys()
            .filter(|(s, _)| *s == scope)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.next_scope = 1;
    }
}
