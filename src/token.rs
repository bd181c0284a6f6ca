use crate::{PathId, StrId};

/// Kind name attached to single-character tokens emitted when no terminal matches.
pub const UNKNOWN_KIND: &str = "UNKNOWN";
/// Kind name surfaced for a merged-away lexer path.
pub const MERGE_KIND: &str = "LEXERPATH_MERGE";
/// Kind name surfaced for an invalidated lexer path.
pub const REMOVED_KIND: &str = "LEXERPATH_REMOVED";
/// Kind name surfaced for a lexer path that consumed all of its input.
pub const END_KIND: &str = "LEXERPATH_END";

/// What a [StepToken] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTokenKind {
    /// A terminal match; the id resolves to the terminal's name.
    Terminal(StrId),
    /// A single unmatched character.
    Unknown,
    /// The path consumed all input; parser paths on it are complete.
    PathEnd,
    /// The path was invalidated; parser paths on it are torn down.
    PathRemoved,
    /// The path merged into `target`; parser paths are retargeted.
    PathMerge { target: PathId },
}

/// One element of a token batch produced by a [StepLexer](crate::lexer::StepLexer) step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepToken {
    pub path_id: PathId,
    pub kind: StepTokenKind,
    /// Interned matched text; empty for control tokens.
    pub value: StrId,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl StepTokenKind {
    /// Control tokens steer path bookkeeping instead of carrying input.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            StepTokenKind::PathEnd | StepTokenKind::PathRemoved | StepTokenKind::PathMerge { .. }
        )
    }

    /// Marker name of a control or unknown token, `None` for terminal matches.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            StepTokenKind::Terminal(_) => None,
            StepTokenKind::Unknown => Some(UNKNOWN_KIND),
            StepTokenKind::PathEnd => Some(END_KIND),
            StepTokenKind::PathRemoved => Some(REMOVED_KIND),
            StepTokenKind::PathMerge { .. } => Some(MERGE_KIND),
        }
    }
}

impl std::fmt::Display for StepToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            StepTokenKind::Terminal(kind) => {
                write!(f, "path {} token #{} @ {}..{}", self.path_id.0, kind.0, self.start, self.end)
            }
            StepTokenKind::PathMerge { target } => {
                write!(f, "path {} {} -> {}", self.path_id.0, MERGE_KIND, target.0)
            }
            other => match other.label() {
                Some(label) => write!(f, "path {} {}", self.path_id.0, label),
                None => Ok(()),
            },
        }
    }
}

impl StepToken {
    pub fn is_control(&self) -> bool {
        self.kind.is_control()
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
