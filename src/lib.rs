//! Language step-parser (lang_sp) is a library implementing a step-wise, context-aware,
//! inheritance-capable parsing engine which consumes source text one token at a time and
//! emits a forest of production matches ([ProductionMatch](crate::parser::ProductionMatch)).
//!
//! # Overview
//! Parsers embedded in editors and language servers rarely see complete, well-formed input.
//! They are fed text that is being typed, locally ambiguous and frequently broken.
//! This library keeps multiple tokenization and parsing hypotheses alive at the same time,
//! instead of committing to a single interpretation and failing on the first conflict.
//! The engine is driven step by step: each step advances every live hypothesis by one token,
//! forking on ambiguity and merging hypotheses that have converged.
//!
//! # Design
//!
//! A grammar is loaded as a live object rather than compiled into static tables.
//! Grammars form an inheritance lattice: a derived grammar inherits productions, precedence,
//! associativity, semantic actions and recovery strategies from its base grammars, and the
//! [InheritanceResolver](crate::grammar::InheritanceResolver) computes a merged grammar on demand.
//! The [StepLexer](crate::lexer::StepLexer) maintains forkable [LexerPath](crate::lexer::LexerPath)s,
//! and the [StepParser](crate::parser::StepParser) pairs each of them with
//! [ParserPath](crate::parser::ParserPath)s carrying a scope and symbol context used to filter
//! and rank ambiguous alternatives.
//! Long-lived bytes (interned names, token values) are owned by an [Arena](crate::mem::Arena),
//! and paths are recycled through [ObjectPool](crate::mem::ObjectPool)s.
//!
//! # Example
//!
//! ```
//! use lang_sp::Interpreter;
//!
//! let mut engine = Interpreter::default();
//! engine
//!     .load_grammar(
//!         "Grammar: Arith\n\
//!          Inheritable: true\n\
//!          expr ::= <num> \"+\" <num>\n\
//!          num ::= /[0-9]+/\n",
//!         "arith.grammar",
//!         true,
//!     )
//!     .unwrap();
//!
//! let outcome = engine.parse("Arith", "12+34").unwrap();
//! assert!(outcome.errors.is_empty());
//! let expr = &outcome.forest[0];
//! assert_eq!(expr.production, "expr");
//! assert_eq!(expr.children.len(), 3);
//! ```
//!
//! # License
//! [lang_sp](crate) is provided under the MIT license.
pub mod context;
mod engine_error;
pub mod grammar;
mod interpreter;
pub mod lexer;
pub mod mem;
pub mod parser;
pub mod registry;
mod token;
mod util;

pub mod examples;

use once_cell::unsync::OnceCell;

pub use engine_error::{EngineError, ErrorKind, GrammarError, Warning};
pub use interpreter::{EngineConfig, EngineStats, Interpreter, ParseOutcome, UserContext};
pub use token::{StepToken, StepTokenKind};

/// A dense identifier of an interned string; resolved through [mem::StringInterner].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StrId(pub(crate) u32);

/// An identifier of a lexer or parser path. Path ids are monotonically assigned per
/// engine instance and never reused within one parse.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PathId(pub(crate) u32);

/// An identifier of a lexical scope tracked by the [SymbolTable](crate::context::SymbolTable).
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScopeId(pub(crate) u32);

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
/// The line and column information at a code point.
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A wrapper for the input text to be parsed with lines information.
pub struct Code<'c> {
    pub value: &'c [u8],
    /// Byte span of every line, excluding its line break; built on first use.
    line_table: OnceCell<Vec<(usize, usize)>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// A enum structure to assign multiple level debugging to engine subsystems.
pub enum Log<T> {
    None,
    Default(T),
    Success(T),
    Result(T),
    Verbose(T),
}

/// A token stored in a lexer path's history. The kind and value are interned;
/// the span is absolute over the input bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedToken {
    pub kind: StrId,
    pub value: StrId,
    pub start: usize,
    pub end: usize,
}

impl AlignedToken {
    pub fn new(kind: StrId, value: StrId, start: usize, end: usize) -> Self {
        Self { kind, value, start, end }
    }
}
