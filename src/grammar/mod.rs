//! The grammar model: terminals, non-terminals, productions, grammars, the owning
//! [GrammarContainer] and the [InheritanceResolver] which merges a derived grammar
//! with its transitive bases.
//!
//! A [Grammar] is a plain record, not a type hierarchy. Inheritance between grammars
//! is data: the container maintains the base/derived graphs, and the resolver walks a
//! deterministic linearization of the bases to produce a merged grammar. Polymorphic
//! values (recovery strategies, semantic actions, production parts) are tagged enums.

mod container;
mod describe;
mod loader;
mod resolver;

use crate::parser::CallbackContext;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

pub use container::GrammarContainer;
pub use loader::{parse_grammar_text, LoadedGrammar};
pub use resolver::{linearize, InheritanceProblem, InheritanceReport, InheritanceResolver};

#[cfg(test)]
mod __tests__;

/// A named terminal symbol backed by an anchored regular expression.
///
/// Two terminals are equal iff their names are equal; patterns are not deduplicated.
#[derive(Clone)]
pub struct Terminal {
    pub name: String,
    pattern: Regex,
    pub order_important: bool,
    pub terminal_order: usize,
}

/// A named non-terminal symbol with an optional context qualifier restricting
/// where the non-terminal is legal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonTerminal {
    pub name: String,
    pub context: Option<String>,
}

/// One part of a production body.
#[derive(Clone)]
pub enum SymbolPart {
    Terminal(Rc<Terminal>),
    NonTerminal(NonTerminal),
}

/// A single alternative body of a named production; parts are consumed left to right.
#[derive(Clone)]
pub struct Production {
    pub name: String,
    pub context: Option<String>,
    pub parts: Vec<SymbolPart>,
    /// Name of a callback registered on the engine, executed when this
    /// alternative completes.
    pub callback: Option<String>,
}

/// A precedence level declaration: every operator listed shares the level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecedenceRule {
    pub level: u32,
    pub operators: Vec<String>,
    pub associativity: Associativity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Associativity {
    Left,
    Right,
    None,
}

/// An associativity declaration for a single operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociativityRule {
    pub operator: String,
    pub associativity: Associativity,
}

/// An error-recovery strategy, applied when a path fails to consume a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Advance until one of the synchronization tokens, consuming the span.
    Synchronization { sync_tokens: Vec<String> },
    /// Skip the next `n` tokens.
    Skip(usize),
    /// Advance a single code point.
    CharacterSkip,
    /// Insert the named token before the current position.
    Insert(String),
    /// Replace the current token with the named token.
    Replace(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How loudly recoveries are reported. The most-derived non-default value wins on merge.
pub enum ReportLevel {
    #[default]
    Warning,
    Silent,
    Error,
}

/// The per-grammar recovery policy merged along the inheritance chain:
/// synchronization tokens are unioned, strategy and reporting level take the
/// most-derived non-default value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub strategy: Option<RecoveryStrategy>,
    pub sync_tokens: IndexSet<String>,
    pub reporting: ReportLevel,
}

/// A function executed when a production completes.
pub type NativeCallback = Rc<dyn Fn(&mut CallbackContext)>;

/// A semantic action attached to a production name.
///
/// Script and template variants are opaque payloads delivered to a pluggable
/// executor; the engine assumes no scripting runtime.
#[derive(Clone)]
pub enum SemanticAction {
    /// Reference to a callback registered by name on the engine.
    Callback(String),
    Template(String),
    Script { lang: String, body: String },
    Native(NativeCallback),
    Composite {
        actions: Vec<SemanticAction>,
        strategy: CompositeStrategy,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a [SemanticAction::Composite] combines its members.
pub enum CompositeStrategy {
    /// Run every member in order.
    Sequence,
    /// Stop at the first member that succeeds.
    FirstSuccess,
}

/// Token splitter carried by a grammar. A pattern splitter holds its regex source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Splitter {
    #[default]
    None,
    Space,
    Pattern(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrammarFormat {
    #[default]
    CEBNF,
    ANTLR4,
    Bison,
    Flex,
    Yacc,
    Lex,
    Minotaur,
}

/// A grammar record: productions, start sets, rule tables and inheritance scalars.
///
/// Invariant: a grammar never inherits from itself and the base graph is acyclic;
/// both are enforced by the [GrammarContainer] on insertion.
#[derive(Clone, Default)]
pub struct Grammar {
    pub name: String,
    pub format_type: GrammarFormat,
    pub inheritable: bool,
    /// Base grammar names in declaration order; the order drives linearization tie-breaks.
    pub base_grammars: Vec<String>,
    pub import_semantics: bool,
    pub coordinate_tokens: bool,
    /// Production name to its ordered alternatives. Later definitions of a name
    /// within one grammar overwrite earlier ones.
    pub productions: IndexMap<String, Vec<Rc<Production>>>,
    /// Terminals referenced by this grammar's productions, keyed by name.
    pub terminals: IndexMap<String, Rc<Terminal>>,
    pub start_terminals: IndexSet<String>,
    pub start_productions: IndexSet<String>,
    /// Level-keyed precedence declarations.
    pub precedence_rules: IndexMap<u32, PrecedenceRule>,
    pub associativity_rules: IndexMap<String, AssociativityRule>,
    pub error_recovery: RecoveryPolicy,
    pub semantic_action_templates: IndexMap<String, SemanticAction>,
    pub token_splitter: Splitter,
    /// Bumped on every mutation; resolved-grammar caches key on it.
    pub version: u64,
}

impl Terminal {
    /// Create a terminal from a regex body. The pattern is anchored at compile
    /// time; a `^` prefix in `pattern` is accepted and not doubled.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, String> {
        let source = if let Some(stripped) = pattern.strip_prefix('^') {
            format!("^(?:{})", stripped)
        } else {
            format!("^(?:{})", pattern)
        };
        let regexp = Regex::new(&source)
            .map_err(|err| format!("Terminal pattern does not compile: {:?}", err))?;
        if regexp.is_match("") {
            return Err(format!(
                "Terminal pattern '{}' must not match the empty string.",
                pattern
            ));
        }
        Ok(Self {
            name: name.into(),
            pattern: regexp,
            order_important: false,
            terminal_order: 0,
        })
    }

    /// Create a terminal matching a literal token value.
    pub fn literal(name: impl Into<String>, value: &str) -> Result<Self, String> {
        if value.is_empty() {
            return Err("A literal terminal needs at least one character.".into());
        }
        let source = format!("^(?:{})", regex::escape(value));
        let regexp = Regex::new(&source).map_err(|err| format!("{:?}", err))?;
        Ok(Self {
            name: name.into(),
            pattern: regexp,
            order_important: false,
            terminal_order: 0,
        })
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order_important = true;
        self.terminal_order = order;
        self
    }

    /// Attempt an anchored match at the start of `input`, returning the match length.
    pub fn match_at<'i>(&self, input: &'i str) -> Option<usize> {
        self.pattern.find(input).map(|m| {
            debug_assert_eq!(m.start(), 0);
            m.end()
        })
    }

    pub fn pattern_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl PartialEq for Terminal {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Terminal {}

impl Debug for Terminal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

impl NonTerminal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: None,
        }
    }

    pub fn with_context(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: Some(context.into()),
        }
    }
}

impl SymbolPart {
    pub fn name(&self) -> &str {
        match self {
            SymbolPart::Terminal(t) => &t.name,
            SymbolPart::NonTerminal(nt) => &nt.name,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SymbolPart::Terminal(_))
    }
}

impl Debug for SymbolPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolPart::Terminal(t) => write!(f, "{}", t.name),
            SymbolPart::NonTerminal(nt) => match &nt.context {
                Some(ctx) => write!(f, "<{}({})>", nt.name, ctx),
                None => write!(f, "<{}>", nt.name),
            },
        }
    }
}

impl Production {
    pub fn new(name: impl Into<String>, parts: Vec<SymbolPart>) -> Self {
        Self {
            name: name.into(),
            context: None,
            parts,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The terminal this alternative begins with, when its first part is a terminal.
    pub fn leading_terminal(&self) -> Option<&Rc<Terminal>> {
        match self.parts.first() {
            Some(SymbolPart::Terminal(t)) => Some(t),
            _ => None,
        }
    }
}

impl Debug for Production {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ::=", self.name)?;
        for part in &self.parts {
            write!(f, " {:?}", part)?;
        }
        Ok(())
    }
}

impl Display for Production {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Debug for SemanticAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticAction::Callback(name) => write!(f, "Callback({})", name),
            SemanticAction::Template(body) => write!(f, "Template({:?})", body),
            SemanticAction::Script { lang, .. } => write!(f, "Script({})", lang),
            SemanticAction::Native(_) => write!(f, "Native(..)"),
            SemanticAction::Composite { actions, strategy } => f
                .debug_struct("Composite")
                .field("actions", actions)
                .field("strategy", strategy)
                .finish(),
        }
    }
}

impl Grammar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inheritable: true,
            ..Grammar::default()
        }
    }

    /// Whether this grammar lists `base` as a direct base. A grammar never
    /// inherits from itself.
    pub fn inherits_from(&self, base: &str) -> bool {
        self.name != base && self.base_grammars.iter().any(|b| b == base)
    }

    /// Define or overwrite the alternatives of a named production.
    pub fn set_production(&mut self, name: impl Into<String>, alternatives: Vec<Production>) {
        let name = name.into();
        let alternatives = alternatives.into_iter().map(Rc::new).collect();
        self.productions.insert(name, alternatives);
        self.version += 1;
    }

    /// Register a terminal under its name, overwriting a previous definition.
    pub fn set_terminal(&mut self, terminal: Terminal) -> Rc<Terminal> {
        let terminal = Rc::new(terminal);
        self.terminals
            .insert(terminal.name.clone(), terminal.clone());
        self.version += 1;
        terminal
    }

    pub fn production(&self, name: &str) -> Option<&Vec<Rc<Production>>> {
        self.productions.get(name)
    }

    pub fn terminal(&self, name: &str) -> Option<&Rc<Terminal>> {
        self.terminals.get(name)
    }

    /// Terminals of the start set, in declaration order. When `coordinate_tokens`
    /// is set, order-important terminals are sorted by their declared order.
    pub fn start_terminal_set(&self) -> Vec<Rc<Terminal>> {
        let mut set: Vec<Rc<Terminal>> = self
            .start_terminals
            .iter()
            .filter_map(|name| self.terminals.get(name).cloned())
            .collect();
        if self.coordinate_tokens {
            set.sort_by_key(|t| if t.order_important { t.terminal_order } else { usize::MAX });
        }
        set
    }
}

impl Debug for Grammar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("name", &self.name)
            .field("bases", &self.base_grammars)
            .field("productions", &self.productions.keys().collect::<Vec<_>>())
            .field("version", &self.version)
            .finish()
    }
}
