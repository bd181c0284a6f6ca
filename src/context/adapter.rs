use super::{ContextSnapshot, ParseState, SymbolInfo, SymbolKind, SymbolTable};
use crate::grammar::{Production, SymbolPart, Terminal};
use crate::mem::StringInterner;
use crate::{Log, ScopeId};
use once_cell::unsync::OnceCell;
use std::collections::HashMap;

/// A path-level recovery move proposed by the adapter before the registry's
/// strategies are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRecovery {
    /// Consume the offending token and keep the path alive.
    Skip,
    /// Release the path; a sibling hypothesis is more promising.
    Backtrack,
}

/// Carries scope and symbol state across parser steps and scores productions
/// against the current context.
///
/// Scope changes are detected by production name: names matching one of the
/// opening patterns push a scope, matching closers pop one. The default
/// patterns follow the language-agnostic `*_start`/`*_end` convention.
pub struct ContextAdapter {
    symbols: SymbolTable,
    scope_labels: HashMap<ScopeId, String>,
    context_states: HashMap<String, bool>,
    scope_open_patterns: Vec<String>,
    scope_close_patterns: Vec<String>,
    /// Name of the most recently completed production, per ranking rules.
    last_completed: Option<String>,
    log: OnceCell<Log<&'static str>>,
}

impl Default for ContextAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAdapter {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            scope_labels: HashMap::new(),
            context_states: HashMap::new(),
            scope_open_patterns: vec![
                "block_start".into(),
                "function_start".into(),
                "class_start".into(),
            ],
            scope_close_patterns: vec![
                "block_end".into(),
                "function_end".into(),
                "class_end".into(),
            ],
            last_completed: None,
            log: OnceCell::new(),
        }
    }

    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.log
            .set(log)
            .map_err(|err| format!("A log label ({}) was set earlier.", err))
    }

    pub fn set_scope_patterns(&mut self, open: Vec<String>, close: Vec<String>) {
        self.scope_open_patterns = open;
        self.scope_close_patterns = close;
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn set_context_state(&mut self, name: impl Into<String>, active: bool) {
        self.context_states.insert(name.into(), active);
    }

    pub fn get_context_state(&self, name: &str) -> bool {
        self.context_states.get(name).copied().unwrap_or(false)
    }

    /// Whether `terminal` may start a token here. A terminal can be switched
    /// off with the context state `terminal:<name>` set to false.
    pub fn is_terminal_valid(&self, terminal: &Terminal, _snapshot: &ContextSnapshot) -> bool {
        let key = format!("terminal:{}", terminal.name);
        self.context_states.get(&key).copied().unwrap_or(true)
    }

    /// Whether `production` is applicable under `snapshot` with lookahead
    /// token kind `token_kind`.
    ///
    /// An unqualified production is always applicable. A context qualifier is
    /// satisfied by an active context state of the same name or by an open
    /// scope whose opening production carried the qualifier's label.
    pub fn is_production_valid_in_context(
        &self,
        production: &Production,
        snapshot: &ContextSnapshot,
        _token_kind: &str,
    ) -> bool {
        let context = match &production.context {
            Some(context) => context,
            None => return true,
        };
        if self.context_states.get(context).copied().unwrap_or(false) {
            return true;
        }
        snapshot.scope_stack.iter().any(|scope| {
            self.scope_labels
                .get(scope)
                .map(|label| label == context)
                .unwrap_or(false)
        })
    }

    /// Rank ambiguous candidates. Scores start at 0.5, gain 0.3 when the
    /// production is expected in a current scope and 0.2 when it continues the
    /// most recently completed production; capped at 1.0. The returned indices
    /// are ordered best-first; the sort is stable so declaration order breaks ties.
    pub fn rank_productions(
        &self,
        candidates: &[&Production],
        snapshot: &ContextSnapshot,
    ) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(index, production)| {
                let mut score: f64 = 0.5;
                if self.expected_in_scope(production, snapshot) {
                    score += 0.3;
                }
                if self.continues_pattern(production) {
                    score += 0.2;
                }
                (index, score.min(1.0))
            })
            .collect();
        ranked.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Propose a cheap path-level move for a token no production accepts,
    /// before the recovery registry is consulted. Unknown whitespace is worth
    /// skipping outright; a path still marked recovering is better released in
    /// favour of its siblings. Everything else defers to the registry.
    pub fn propose_recovery(
        &self,
        snapshot: &ContextSnapshot,
        token_kind: &str,
        token_value: &str,
    ) -> Option<PathRecovery> {
        if snapshot.parse_state == ParseState::Recovering {
            return Some(PathRecovery::Backtrack);
        }
        if token_kind == crate::token::UNKNOWN_KIND && token_value.trim().is_empty() {
            return Some(PathRecovery::Skip);
        }
        None
    }

    /// Feed an incoming token to the adapter. Tokens naming a visible symbol
    /// are recorded as references.
    pub fn observe_token(
        &mut self,
        snapshot: &ContextSnapshot,
        _kind: &str,
        value: &str,
        position: usize,
    ) {
        if !value.is_empty() {
            self.symbols
                .add_reference(&snapshot.scope_stack, value, position);
        }
    }

    /// Advance `snapshot` across a completed production, detecting scope
    /// changes and recording declared symbols.
    pub fn advance_snapshot(
        &mut self,
        snapshot: &ContextSnapshot,
        production_name: &str,
        value: &str,
        position: usize,
        interner: &mut StringInterner,
    ) -> ContextSnapshot {
        let mut scope_stack = snapshot.scope_stack.clone();
        let mut symbol_context = snapshot.symbol_context.clone();

        if let Some(label) = self.matches_pattern(production_name, &self.scope_open_patterns) {
            let scope = self.symbols.new_scope();
            self.scope_labels.insert(scope, label);
            scope_stack.push(scope);
            #[cfg(debug_assertions)]
            if let Some(l) = self.log.get() {
                if l.order() >= Log::Verbose(()).order() {
                    println!("[{}] Scope opened by '{}'", l, production_name);
                }
            }
        } else if self
            .matches_pattern(production_name, &self.scope_close_patterns)
            .is_some()
            && scope_stack.len() > 1
        {
            scope_stack.pop();
        }

        if Self::declares_symbol(production_name) && !value.is_empty() {
            let scope = scope_stack.last().copied().unwrap_or(ScopeId(0));
            self.symbols.define(SymbolInfo::new(
                value,
                Self::symbol_kind_for(production_name),
                scope,
                position,
            ));
            if let Ok(id) = interner.intern(value) {
                if !symbol_context.contains(&id) {
                    symbol_context.push(id);
                }
            }
        }

        self.last_completed = Some(production_name.to_string());
        ContextSnapshot::new(scope_stack, symbol_context, snapshot.parse_state, position)
    }

    /// Confidence of a path that just applied `production`, mirroring the
    /// ranking formula for a single candidate.
    pub fn confidence(&self, production: &Production, snapshot: &ContextSnapshot) -> f64 {
        let mut score: f64 = 0.5;
        if self.expected_in_scope(production, snapshot) {
            score += 0.3;
        }
        if self.continues_pattern(production) {
            score += 0.2;
        }
        score.min(1.0)
    }

    pub fn reset(&mut self) {
        self.symbols.clear();
        self.scope_labels.clear();
        self.last_completed = None;
    }

    fn expected_in_scope(&self, production: &Production, snapshot: &ContextSnapshot) -> bool {
        match &production.context {
            Some(context) => {
                self.context_states.get(context).copied().unwrap_or(false)
                    || snapshot.scope_stack.iter().any(|scope| {
                        self.scope_labels
                            .get(scope)
                            .map(|label| label == context)
                            .unwrap_or(false)
                    })
            }
            None => true,
        }
    }

    fn continues_pattern(&self, production: &Production) -> bool {
        match &self.last_completed {
            Some(last) => production.parts.iter().any(|part| match part {
                SymbolPart::NonTerminal(nt) => &nt.name == last,
                SymbolPart::Terminal(_) => false,
            }),
            None => false,
        }
    }

    fn matches_pattern(&self, name: &str, patterns: &[String]) -> Option<String> {
        patterns
            .iter()
            .find(|pattern| name.contains(pattern.as_str()))
            .map(|pattern| {
                // Label a scope by the convention prefix, e.g. 'function_start' -> 'function'.
                pattern
                    .strip_suffix("_start")
                    .unwrap_or(pattern.as_str())
                    .to_string()
            })
    }

    fn declares_symbol(production_name: &str) -> bool {
        production_name.contains("decl") || production_name.contains("definition")
    }

    fn symbol_kind_for(production_name: &str) -> SymbolKind {
        if production_name.contains("function") {
            SymbolKind::Function
        } else if production_name.contains("class") {
            SymbolKind::Class
        } else if production_name.contains("type") {
            SymbolKind::Type
        } else if production_name.contains("param") {
            SymbolKind::Parameter
        } else if production_name.contains("var") || production_name.contains("decl") {
            SymbolKind::Variable
        } else {
            SymbolKind::Unknown
        }
    }
}
