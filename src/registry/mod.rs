//! Inheritance-aware registries for precedence, associativity, semantic actions
//! and error-recovery strategies.
//!
//! All four registries share one shape: values keyed by `(grammar, name)` with a
//! direct lookup, an inheritance-walked lookup resolving from most-derived to
//! base, an overlaying bulk listing, and a lookup cache which is invalidated for
//! a grammar and all of its transitive dependents on every write.

mod associativity;
mod precedence;
mod recovery;
mod semantic;

use crate::grammar::{linearize, GrammarContainer};
use std::collections::HashMap;

pub use associativity::AssociativityRegistry;
pub use precedence::{OperatorGroup, PrecedenceRegistry};
pub use recovery::{RecoveryAction, RecoveryContext, RecoveryRegistry, RecoveryResult};
pub use semantic::{ActionExecutor, NoopExecutor, SemanticActionRegistry};

pub(crate) use semantic::run_action;

#[cfg(test)]
mod __tests__;

/// The common storage and lookup discipline shared by the registry family.
pub struct InheritedRegistry<V: Clone> {
    entries: HashMap<(String, String), V>,
    /// Memoized inheritance-walked lookups, keyed like `entries`.
    lookup_cache: HashMap<(String, String), Option<V>>,
}

impl<V: Clone> Default for InheritedRegistry<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            lookup_cache: HashMap::new(),
        }
    }
}

impl<V: Clone> InheritedRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a value for `(grammar, name)` and invalidate cached lookups for
    /// `grammar` and every grammar that transitively inherits it.
    pub fn register(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        name: impl Into<String>,
        value: V,
    ) {
        self.entries
            .insert((grammar.to_string(), name.into()), value);
        self.invalidate(container, grammar);
    }

    /// Inheritance-walked lookup: the most-derived registration wins.
    /// The result, including a miss, is cached under `grammar`.
    pub fn get(&mut self, container: &GrammarContainer, grammar: &str, name: &str) -> Option<V> {
        let key = (grammar.to_string(), name.to_string());
        if let Some(cached) = self.lookup_cache.get(&key) {
            return cached.clone();
        }

        let chain = match linearize(container, grammar) {
            Ok(chain) => chain,
            Err(_) => vec![grammar.to_string()],
        };
        let mut found = None;
        for candidate in chain.iter().rev() {
            if let Some(value) = self.entries.get(&(candidate.clone(), name.to_string())) {
                found = Some(value.clone());
                break;
            }
        }
        self.lookup_cache.insert(key, found.clone());
        found
    }

    /// Base-first overlay of every item visible to `grammar`; derived entries
    /// replace base entries of the same name.
    pub fn get_all(&self, container: &GrammarContainer, grammar: &str) -> Vec<(String, V)> {
        let chain = match linearize(container, grammar) {
            Ok(chain) => chain,
            Err(_) => vec![grammar.to_string()],
        };
        let mut overlay: indexmap::IndexMap<String, V> = indexmap::IndexMap::new();
        for layer in &chain {
            let mut layer_items: Vec<(&String, &V)> = self
                .entries
                .iter()
                .filter(|((g, _), _)| g == layer)
                .map(|((_, name), value)| (name, value))
                .collect();
            layer_items.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (name, value) in layer_items {
                overlay.insert(name.clone(), value.clone());
            }
        }
        overlay.into_iter().collect()
    }

    /// Only items registered directly against `grammar`.
    pub fn get_direct(&self, grammar: &str) -> Vec<(String, V)> {
        let mut items: Vec<(String, V)> = self
            .entries
            .iter()
            .filter(|((g, _), _)| g == grammar)
            .map(|((_, name), value)| (name.clone(), value.clone()))
            .collect();
        items.sort_by(|(a, _), (b, _)| a.cmp(b));
        items
    }

    /// Drop every entry registered against `grammar` and invalidate caches.
    pub fn remove_all(&mut self, container: &GrammarContainer, grammar: &str) {
        self.entries.retain(|(g, _), _| g != grammar);
        self.invalidate(container, grammar);
    }

    /// Drop cached lookups for `grammar` and all transitive dependents.
    pub fn invalidate(&mut self, container: &GrammarContainer, grammar: &str) {
        let mut affected: Vec<String> = vec![grammar.to_string()];
        affected.extend(container.transitive_derivatives(grammar));
        self.lookup_cache
            .retain(|(g, _), _| !affected.iter().any(|a| a == g));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lookup_cache.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
