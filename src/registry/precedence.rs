use super::{AssociativityRegistry, InheritedRegistry};
use crate::grammar::{Associativity, GrammarContainer};
use crate::{ErrorKind, Position, Warning};
use indexmap::IndexMap;
use std::cmp::Ordering;

/// Operators sharing a precedence level, with the level's resolved associativity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorGroup {
    pub level: u32,
    pub associativity: Associativity,
    pub operators: Vec<String>,
}

/// Registry of operator precedence levels keyed by `(grammar, operator)`.
/// Higher level means higher precedence.
#[derive(Default)]
pub struct PrecedenceRegistry {
    inner: InheritedRegistry<u32>,
}

impl PrecedenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        operator: impl Into<String>,
        level: u32,
    ) {
        self.inner.register(container, grammar, operator, level);
    }

    pub fn get(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        operator: &str,
    ) -> Option<u32> {
        self.inner.get(container, grammar, operator)
    }

    pub fn get_all(&self, container: &GrammarContainer, grammar: &str) -> Vec<(String, u32)> {
        self.inner.get_all(container, grammar)
    }

    pub fn get_direct(&self, grammar: &str) -> Vec<(String, u32)> {
        self.inner.get_direct(grammar)
    }

    pub fn remove_all(&mut self, container: &GrammarContainer, grammar: &str) {
        self.inner.remove_all(container, grammar);
    }

    pub fn invalidate(&mut self, container: &GrammarContainer, grammar: &str) {
        self.inner.invalidate(container, grammar);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Compare two operators by precedence level. Returns `None` when either
    /// operator has no rule visible to `grammar`.
    pub fn compare(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        op1: &str,
        op2: &str,
    ) -> Option<Ordering> {
        let level1 = self.get(container, grammar, op1)?;
        let level2 = self.get(container, grammar, op2)?;
        Some(level1.cmp(&level2))
    }

    /// Build the level table visible to `grammar`: level to [OperatorGroup],
    /// ascending. The group's associativity is the associativity resolved for
    /// its operators; conflicting registrations at one level resolve to the
    /// most-derived registration and produce a warning.
    pub fn precedence_table(
        &mut self,
        container: &GrammarContainer,
        associativity: &mut AssociativityRegistry,
        grammar: &str,
    ) -> (IndexMap<u32, OperatorGroup>, Vec<Warning>) {
        let mut warnings = Vec::new();
        let mut table: IndexMap<u32, OperatorGroup> = IndexMap::new();

        for (operator, level) in self.inner.get_all(container, grammar) {
            let assoc = associativity
                .get(container, grammar, &operator)
                .unwrap_or(Associativity::Left);
            match table.get_mut(&level) {
                Some(group) => {
                    if group.associativity != assoc {
                        warnings.push(Warning::new(
                            ErrorKind::SemanticError,
                            grammar,
                            Position::new(1, 1),
                            format!(
                                "Operators at precedence level {} disagree on associativity; {:?} replaces {:?}.",
                                level, assoc, group.associativity
                            ),
                        ));
                        // get_all overlays base-first, so the later registration
                        // is the more derived one and takes the level.
                        group.associativity = assoc;
                    }
                    group.operators.push(operator);
                }
                None => {
                    table.insert(
                        level,
                        OperatorGroup {
                            level,
                            associativity: assoc,
                            operators: vec![operator],
                        },
                    );
                }
            }
        }

        table.sort_keys();
        (table, warnings)
    }
}
