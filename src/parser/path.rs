use super::ProductionMatch;
use crate::context::ContextSnapshot;
use crate::grammar::{Production, SymbolPart};
use crate::mem::Poolable;
use crate::PathId;
use std::rc::Rc;

/// An active production along a parser path: one alternative being matched,
/// advancing one part at a time.
#[derive(Debug, Clone)]
pub struct Frame {
    pub production: Rc<Production>,
    pub part_index: usize,
    pub children: Vec<ProductionMatch>,
    pub start_position: usize,
}

impl Frame {
    pub fn new(production: Rc<Production>, start_position: usize) -> Self {
        Self {
            production,
            part_index: 0,
            children: Vec::new(),
            start_position,
        }
    }

    pub fn next_part(&self) -> Option<&SymbolPart> {
        self.production.parts.get(self.part_index)
    }

    pub fn is_complete(&self) -> bool {
        self.part_index >= self.production.parts.len()
    }
}

/// Pending consumption owed to a recovery strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryState {
    /// Consume tokens until one whose value or kind is in the set.
    SyncUntil {
        sync_tokens: Vec<String>,
        consumed: Vec<String>,
        start_position: usize,
    },
    /// Consume a fixed number of tokens.
    SkipTokens { remaining: usize, start_position: usize },
}

/// One parsing hypothesis bound to a lexer path, carrying its own context
/// snapshot, active productions and completed matches. Lives in an object pool.
#[derive(Debug, Clone)]
pub struct ParserPath {
    pub path_id: PathId,
    pub lexer_path_id: PathId,
    /// Byte offset of consumed input.
    pub position: usize,
    /// Active productions, innermost last.
    pub frames: Vec<Frame>,
    /// Completed top-level matches.
    pub active_matches: Vec<ProductionMatch>,
    pub snapshot: ContextSnapshot,
    pub score: f64,
    pub confidence: f64,
    pub recovering: Option<RecoveryState>,
    pub in_use: bool,
}

impl ParserPath {
    pub fn new() -> Self {
        Self {
            path_id: PathId(0),
            lexer_path_id: PathId(0),
            position: 0,
            frames: Vec::new(),
            active_matches: Vec::new(),
            snapshot: ContextSnapshot::root(),
            score: 1.0,
            confidence: 0.5,
            recovering: None,
            in_use: false,
        }
    }

    /// Copy the matching state of `other`, keeping the identity assigned by the
    /// caller. Used when forking on ambiguity.
    pub fn duplicate_from(&mut self, other: &ParserPath) {
        self.lexer_path_id = other.lexer_path_id;
        self.position = other.position;
        self.frames = other.frames.clone();
        self.active_matches = other.active_matches.clone();
        self.snapshot = other.snapshot.clone();
        self.score = other.score;
        self.confidence = other.confidence;
        self.recovering = other.recovering.clone();
    }
}

impl Default for ParserPath {
    fn default() -> Self {
        Self::new()
    }
}

impl Poolable for ParserPath {
    fn reset(&mut self) {
        self.path_id = PathId(0);
        self.lexer_path_id = PathId(0);
        self.position = 0;
        self.frames.clear();
        self.active_matches.clear();
        self.snapshot = ContextSnapshot::root();
        self.score = 1.0;
        self.confidence = 0.5;
        self.recovering = None;
    }

    fn validate(&self) -> bool {
        !self.in_use
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }
}
