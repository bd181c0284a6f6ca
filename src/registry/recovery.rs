use super::InheritedRegistry;
use crate::grammar::{GrammarContainer, RecoveryStrategy};
use crate::ErrorKind;

/// What the engine should do to continue after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Consume tokens up to a synchronization token.
    Synchronize,
    /// Skip a number of tokens.
    Skip,
    /// Advance a single code point.
    CharacterSkip,
    /// Insert a token before the current position.
    Insert,
    /// Replace the current token.
    Replace,
    /// No recovery applies; the path is released.
    Fail,
}

/// The outcome of resolving a recovery for an error.
///
/// `recovered_tokens` and `new_position` are populated when the caller can
/// already determine them; the step parser instead tracks ongoing consumption
/// in its per-path recovery state and reports through warnings.
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub action: RecoveryAction,
    pub message: String,
    pub strategy: Option<RecoveryStrategy>,
    pub recovered_tokens: Option<Vec<String>>,
    pub new_position: Option<usize>,
}

/// The error situation a recovery is being resolved for.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub error_kind: ErrorKind,
    pub position: usize,
    /// Kind and value of the offending token, when one exists.
    pub current_token: Option<(String, String)>,
}

impl RecoveryResult {
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            action: RecoveryAction::Fail,
            message: message.into(),
            strategy: None,
            recovered_tokens: None,
            new_position: None,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.action != RecoveryAction::Fail
    }
}

/// Registry of recovery strategies keyed by `(grammar, error kind name)`.
#[derive(Default)]
pub struct RecoveryRegistry {
    inner: InheritedRegistry<RecoveryStrategy>,
}

/// The registry key an error kind resolves through.
pub(crate) fn kind_key(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::LexicalError => "lexical",
        ErrorKind::SyntaxError => "syntax",
        ErrorKind::SemanticError => "semantic",
        ErrorKind::TypeError => "type",
        ErrorKind::ReferenceError => "reference",
        ErrorKind::CircularInheritance => "circular_inheritance",
        ErrorKind::MissingGrammar => "missing_grammar",
        ErrorKind::PathExplosion => "path_explosion",
        ErrorKind::Budget => "budget",
        ErrorKind::ArenaExhausted => "arena_exhausted",
    }
}

impl RecoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        kind: ErrorKind,
        strategy: RecoveryStrategy,
    ) {
        self.inner.register(container, grammar, kind_key(kind), strategy);
    }

    pub fn get(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        kind: ErrorKind,
    ) -> Option<RecoveryStrategy> {
        self.inner.get(container, grammar, kind_key(kind))
    }

    pub fn get_direct(&self, grammar: &str) -> Vec<(String, RecoveryStrategy)> {
        self.inner.get_direct(grammar)
    }

    pub fn get_all(
        &self,
        container: &GrammarContainer,
        grammar: &str,
    ) -> Vec<(String, RecoveryStrategy)> {
        self.inner.get_all(container, grammar)
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

    /// Resolve the recovery to run for `ctx`.
    ///
    /// A strategy registered for the error kind wins; otherwise syntax errors
    /// fall back to synchronization against the grammar's sync-token set,
    /// semantic errors to a single-token skip and lexical errors to a
    /// character skip. Everything else fails.
    pub fn apply_recovery(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        sync_tokens: &[String],
        ctx: &RecoveryContext,
    ) -> RecoveryResult {
        if let Some(strategy) = self.get(container, grammar, ctx.error_kind) {
            return materialize(strategy, ctx);
        }

        let fallback = match ctx.error_kind {
            ErrorKind::SyntaxError => RecoveryStrategy::Synchronization {
                sync_tokens: sync_tokens.to_vec(),
            },
            ErrorKind::SemanticError => RecoveryStrategy::Skip(1),
            ErrorKind::LexicalError => RecoveryStrategy::CharacterSkip,
            _ => {
                return RecoveryResult::fail(format!(
                    "No recovery available for {} at {}.",
                    ctx.error_kind, ctx.position
                ))
            }
        };
        materialize(fallback, ctx)
    }
}

fn materialize(strategy: RecoveryStrategy, ctx: &RecoveryContext) -> RecoveryResult {
    let (action, message) = match &strategy {
        RecoveryStrategy::Synchronization { sync_tokens } => {
            if sync_tokens.is_empty() {
                return RecoveryResult::fail(format!(
                    "Synchronization requested at {} but no sync tokens are defined.",
                    ctx.position
                ));
            }
            (
                RecoveryAction::Synchronize,
                format!("Synchronizing to one of {:?}.", sync_tokens),
            )
        }
        RecoveryStrategy::Skip(n) => (RecoveryAction::Skip, format!("Skipping {} token(s).", n)),
        RecoveryStrategy::CharacterSkip => (
            RecoveryAction::CharacterSkip,
            "Skipping one code point.".to_string(),
        ),
        RecoveryStrategy::Insert(token) => {
            (RecoveryAction::Insert, format!("Inserting '{}'.", token))
        }
        RecoveryStrategy::Replace(token) => (
            RecoveryAction::Replace,
            format!("Replacing current token with '{}'.", token),
        ),
    };
    RecoveryResult {
        action,
        message,
        strategy: Some(strategy),
        recovered_tokens: None,
        new_position: None,
    }
}
