use crate::{PathId, Position};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The machine readable kind of an engine [error](EngineError) or [warning](Warning).
pub enum ErrorKind {
    LexicalError,
    SyntaxError,
    SemanticError,
    TypeError,
    ReferenceError,
    CircularInheritance,
    MissingGrammar,
    PathExplosion,
    Budget,
    ArenaExhausted,
}

#[derive(Debug, Clone)]
/// An error value produced while parsing or while operating the engine.
///
/// Every emitted error carries a file name, a 1-based line and column, a human
/// readable message and the machine [kind](ErrorKind).
pub struct EngineError {
    pub kind: ErrorKind,
    pub file: String,
    pub position: Position,
    pub message: String,
    pub path_id: Option<PathId>,
    pub grammar: Option<String>,
}

#[derive(Debug, Clone)]
/// A warning appended to a parse result, e.g. after a successful error recovery.
/// Warnings have the same shape as [EngineError].
pub struct Warning {
    pub kind: ErrorKind,
    pub file: String,
    pub position: Position,
    pub message: String,
    pub path_id: Option<PathId>,
    pub grammar: Option<String>,
}

#[derive(Debug, Clone)]
/// An error returned while loading, validating or resolving a grammar.
/// Grammar loading errors are not recoverable; the offending grammar is not installed.
pub enum GrammarError {
    /// A grammar on an inheritance chain references itself, directly or transitively.
    /// Carries the cycle in walk order, e.g. `["A", "B", "A"]`.
    CircularInheritance { grammar: String, cycle: Vec<String> },
    /// A referenced base grammar is not present in the container.
    MissingGrammar { grammar: String, missing: String },
    /// The grammar text violates the header or production surface.
    Malformed { file: String, line: usize, message: String },
}

impl ErrorKind {
    /// Whether the error-recovery layer is offered this kind before a path is released.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::LexicalError | ErrorKind::SyntaxError | ErrorKind::SemanticError
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::LexicalError => "LexicalError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::SemanticError => "SemanticError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::CircularInheritance => "CircularInheritance",
            ErrorKind::MissingGrammar => "MissingGrammar",
            ErrorKind::PathExplosion => "PathExplosion",
            ErrorKind::Budget => "Budget",
            ErrorKind::ArenaExhausted => "ArenaExhausted",
        };
        write!(f, "{}", s)
    }
}

impl EngineError {
    pub fn new(kind: ErrorKind, file: impl Into<String>, position: Position, message: String) -> Self {
        Self {
            kind,
            file: file.into(),
            position,
            message,
            path_id: None,
            grammar: None,
        }
    }

    pub fn on_path(mut self, path_id: PathId) -> Self {
        self.path_id = Some(path_id);
        self
    }

    pub fn in_grammar(mut self, grammar: impl Into<String>) -> Self {
        self.grammar = Some(grammar.into());
        self
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} @ {}:{}:{}",
            self.kind, self.message, self.file, self.position.line, self.position.column
        )
    }
}

impl Warning {
    pub fn new(kind: ErrorKind, file: impl Into<String>, position: Position, message: String) -> Self {
        Self {
            kind,
            file: file.into(),
            position,
            message,
            path_id: None,
            grammar: None,
        }
    }

    pub fn on_path(mut self, path_id: PathId) -> Self {
        self.path_id = Some(path_id);
        self
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "warning {}: {} @ {}:{}:{}",
            self.kind, self.message, self.file, self.position.line, self.position.column
        )
    }
}

impl GrammarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GrammarError::CircularInheritance { .. } => ErrorKind::CircularInheritance,
            GrammarError::MissingGrammar { .. } => ErrorKind::MissingGrammar,
            GrammarError::Malformed { .. } => ErrorKind::SyntaxError,
        }
    }
}

impl Display for GrammarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GrammarError::CircularInheritance { grammar, cycle } => {
                write!(
                    f,
                    "CircularInheritance: grammar '{}' participates in cycle {}",
                    grammar,
                    cycle.join(" -> ")
                )
            }
            GrammarError::MissingGrammar { grammar, missing } => {
                write!(
                    f,
                    "MissingGrammar: grammar '{}' inherits unknown grammar '{}'",
                    grammar, missing
                )
            }
            GrammarError::Malformed { file, line, message } => {
                write!(f, "GrammarError: {} @ {}:{}", message, file, line)
            }
        }
    }
}
