use crate::{ScopeId, StrId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Where a parser path currently stands in its step cycle.
pub enum ParseState {
    #[default]
    Idle,
    Matching,
    Recovering,
}

/// The context a parser path carries to keep its decisions reproducible.
///
/// A snapshot is immutable once attached to a path; advancing a path across a
/// scope-changing production produces a fresh snapshot. Two snapshots with the
/// same hash are treated as equivalent for path-merge purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub scope_stack: Vec<ScopeId>,
    /// Interned names of the symbols visible when the snapshot was taken.
    pub symbol_context: Vec<StrId>,
    pub parse_state: ParseState,
    pub position: usize,
    pub hash: u64,
}

impl ContextSnapshot {
    pub fn new(
        scope_stack: Vec<ScopeId>,
        symbol_context: Vec<StrId>,
        parse_state: ParseState,
        position: usize,
    ) -> Self {
        let hash = context_hash(&scope_stack, &symbol_context, position);
        Self {
            scope_stack,
            symbol_context,
            parse_state,
            position,
            hash,
        }
    }

    /// The root snapshot: global scope, no symbols, position 0.
    pub fn root() -> Self {
        ContextSnapshot::new(vec![ScopeId(0)], Vec::new(), ParseState::Idle, 0)
    }

    pub fn current_scope(&self) -> ScopeId {
        self.scope_stack.last().copied().unwrap_or(ScopeId(0))
    }

    /// Rebuild the snapshot at a new position, keeping scope and symbols.
    pub fn at_position(&self, position: usize) -> Self {
        ContextSnapshot::new(
            self.scope_stack.clone(),
            self.symbol_context.clone(),
            self.parse_state,
            position,
        )
    }

    pub fn with_state(&self, parse_state: ParseState) -> Self {
        let mut snapshot = self.clone();
        snapshot.parse_state = parse_state;
        snapshot
    }
}

/// A deterministic hash over (scope ids, interned symbol names, position).
/// Process-random hashing would break cross-run reproducibility of merges.
fn context_hash(scope_stack: &[ScopeId], symbol_context: &[StrId], position: usize) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    let mut fold = |value: u64| {
        for byte in value.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
    };

    fold(scope_stack.len() as u64);
    for scope in scope_stack {
        fold(scope.0 as u64);
    }
    fold(symbol_context.len() as u64);
    for symbol in symbol_context {
        fold(symbol.0 as u64);
    }
    fold(position as u64);
    hash
}

#[cfg(test)]
mod tests {
    use super::{ContextSnapshot, ParseState};
    use crate::{ScopeId, StrId};

    #[test]
    fn hash_is_stable_and_discriminating() {
        let a = ContextSnapshot::new(vec![ScopeId(0), ScopeId(3)], vec![StrId(1)], ParseState::Idle, 7);
        let b = ContextSnapshot::new(vec![ScopeId(0), ScopeId(3)], vec![StrId(1)], ParseState::Idle, 7);
        assert_eq!(a.hash, b.hash);

        let moved = a.at_position(8);
        assert_ne!(a.hash, moved.hash);

        let other_scope =
            ContextSnapshot::new(vec![ScopeId(0), ScopeId(4)], vec![StrId(1)], ParseState::Idle, 7);
        assert_ne!(a.hash, other_scope.hash);

        let other_symbols =
            ContextSnapshot::new(vec![ScopeId(0), ScopeId(3)], vec![StrId(2)], ParseState::Idle, 7);
        assert_ne!(a.hash, other_symbols.hash);
    }

    #[test]
    fn parse_state_does_not_change_identity() {
        let a = ContextSnapshot::root();
        let b = a.with_state(ParseState::Matching);
        assert_eq!(a.hash, b.hash, "merge equivalence ignores transient state");
    }
}
