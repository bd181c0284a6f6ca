use super::InheritedRegistry;
use crate::grammar::{Associativity, GrammarContainer};

/// Registry of operator associativity keyed by `(grammar, operator)`.
#[derive(Default)]
pub struct AssociativityRegistry {
    inner: InheritedRegistry<Associativity>,
}

impl AssociativityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        operator: impl Into<String>,
        associativity: Associativity,
    ) {
        self.inner.register(container, grammar, operator, associativity);
    }

    pub fn get(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        operator: &str,
    ) -> Option<Associativity> {
        self.inner.get(container, grammar, operator)
    }

    pub fn get_all(
        &self,
        container: &GrammarContainer,
        grammar: &str,
    ) -> Vec<(String, Associativity)> {
        self.inner.get_all(container, grammar)
    }

    pub fn get_direct(&self, grammar: &str) -> Vec<(String, Associativity)> {
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
}
