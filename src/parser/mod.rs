//! The step parser: drives token batches from the lexer across multiple
//! [ParserPath]s, filters and ranks candidate productions through the context
//! adapter, and assembles the [ProductionMatch] forest.
//!
//! Each parser path is bound to one lexer path and holds a stack of active
//! productions. A token either advances the innermost production, expands a
//! non-terminal into fresh frames, forks the path on ranked ambiguity (capped
//! at three survivors), or triggers error recovery.

mod matches;
mod path;

use crate::context::{ContextAdapter, ContextSnapshot, ParseState, PathRecovery, SymbolTable};
use crate::grammar::{
    Grammar, GrammarContainer, NativeCallback, NonTerminal, Production, RecoveryStrategy,
    SymbolPart, Terminal,
};
use crate::mem::{ExhaustionPolicy, ObjectPool, PoolError, StringInterner};
use crate::registry::{
    ActionExecutor, RecoveryAction, RecoveryContext, RecoveryRegistry, SemanticActionRegistry,
};
use crate::token::{StepToken, StepTokenKind, UNKNOWN_KIND};
use crate::{Code, EngineError, ErrorKind, Log, PathId, Position, Warning};
use once_cell::unsync::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

pub use matches::ProductionMatch;
pub use path::{Frame, ParserPath, RecoveryState};

#[cfg(test)]
mod __tests__;

/// The per-parse services a [StepParser] borrows from the engine while
/// processing a batch.
pub struct EngineServices<'a> {
    pub container: &'a GrammarContainer,
    pub adapter: &'a mut ContextAdapter,
    pub interner: &'a mut StringInterner,
    pub recovery: &'a mut RecoveryRegistry,
    pub semantic_actions: &'a mut SemanticActionRegistry,
    pub callbacks: &'a HashMap<String, NativeCallback>,
    pub executor: &'a dyn ActionExecutor,
    pub user: &'a mut crate::interpreter::UserContext,
}

/// The context handed to callbacks and semantic actions when a production
/// completes.
pub struct CallbackContext<'a> {
    pub production: &'a str,
    pub token_value: &'a str,
    pub position: usize,
    pub captures: &'a [ProductionMatch],
    pub symbols: &'a SymbolTable,
    pub user: &'a mut crate::interpreter::UserContext,
}

/// A parser path that finished, successfully or not.
#[derive(Debug, Clone)]
pub struct CompletedPath {
    pub path_id: PathId,
    pub lexer_path_id: PathId,
    pub matches: Vec<ProductionMatch>,
    pub score: f64,
    /// True when every active production was consumed to completion.
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    pub paths_created: usize,
    pub forks: usize,
    pub released: usize,
    pub completed: usize,
    pub discarded_alternatives: usize,
}

enum StepOutcome {
    Kept,
    Released,
}

/// The non-deterministic, context-aware step parser.
pub struct StepParser {
    grammar: Rc<Grammar>,
    file: String,
    paths: BTreeMap<PathId, ParserPath>,
    by_lexer: HashMap<PathId, Vec<PathId>>,
    next_path_id: PathId,
    pool: ObjectPool<ParserPath>,
    fork_cap: usize,
    completed: Vec<CompletedPath>,
    /// Lexer paths whose last parser path died; drained by the coordinator.
    dead_lexer_paths: Vec<PathId>,
    errors: Vec<EngineError>,
    warnings: Vec<Warning>,
    stats: ParserStats,
    log: OnceCell<Log<&'static str>>,
}

impl StepParser {
    pub fn new(
        grammar: Rc<Grammar>,
        file: impl Into<String>,
        fork_cap: usize,
        pool_initial: usize,
        pool_high_water: usize,
        pool_policy: ExhaustionPolicy,
    ) -> Self {
        Self {
            grammar,
            file: file.into(),
            paths: BTreeMap::new(),
            by_lexer: HashMap::new(),
            next_path_id: PathId(0),
            pool: ObjectPool::new(
                pool_initial,
                pool_high_water,
                pool_policy,
                Box::new(ParserPath::new),
            ),
            fork_cap: fork_cap.max(1),
            completed: Vec::new(),
            dead_lexer_paths: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            stats: ParserStats::default(),
            log: OnceCell::new(),
        }
    }

    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.log
            .set(log)
            .map_err(|err| format!("A log label ({}) was set earlier.", err))
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    pub fn live_count(&self) -> usize {
        self.paths.len()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn errors(&self) -> &[EngineError] {
        &self.errors
    }

    /// Lexer paths that lost their last parser path since the previous drain.
    pub fn take_dead_lexer_paths(&mut self) -> Vec<PathId> {
        std::mem::take(&mut self.dead_lexer_paths)
    }

    pub fn take_completed(&mut self) -> Vec<CompletedPath> {
        std::mem::take(&mut self.completed)
    }

    /// The terminals the parser accepts next on lexer path `lexer_path`.
    ///
    /// With no parser path recorded, the grammar's start productions define the
    /// valid set; otherwise the first-position terminals of the active
    /// productions, filtered through the context adapter.
    pub fn valid_terminals_for(
        &self,
        lexer_path: PathId,
        adapter: &ContextAdapter,
    ) -> Vec<Rc<Terminal>> {
        let mut out: Vec<Rc<Terminal>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        match self.by_lexer.get(&lexer_path) {
            Some(ids) if !ids.is_empty() => {
                for id in ids {
                    let path = match self.paths.get(id) {
                        Some(path) => path,
                        None => continue,
                    };
                    if path.recovering.is_some() {
                        // A recovering path accepts any terminal; unmatched
                        // input degrades to unknown characters.
                        for terminal in self.grammar.terminals.values() {
                            if adapter.is_terminal_valid(terminal, &path.snapshot)
                                && seen.insert(terminal.name.clone())
                            {
                                out.push(terminal.clone());
                            }
                        }
                        continue;
                    }
                    match path.frames.last().and_then(|frame| frame.next_part()) {
                        Some(SymbolPart::Terminal(terminal)) => {
                            if adapter.is_terminal_valid(terminal, &path.snapshot)
                                && seen.insert(terminal.name.clone())
                            {
                                out.push(terminal.clone());
                            }
                        }
                        Some(SymbolPart::NonTerminal(nt)) => {
                            let mut visited = HashSet::new();
                            let terminals = self.reachable_first_terminals(
                                &self.alternatives_of(nt),
                                &path.snapshot,
                                adapter,
                                &mut visited,
                            );
                            for terminal in terminals {
                                if seen.insert(terminal.name.clone()) {
                                    out.push(terminal);
                                }
                            }
                        }
                        None => {
                            let mut visited = HashSet::new();
                            let terminals = self.reachable_first_terminals(
                                &self.start_alternatives(),
                                &path.snapshot,
                                adapter,
                                &mut visited,
                            );
                            for terminal in terminals {
                                if seen.insert(terminal.name.clone()) {
                                    out.push(terminal);
                                }
                            }
                        }
                    }
                }
            }
            _ => {
                let snapshot = ContextSnapshot::root();
                let mut visited = HashSet::new();
                let terminals = self.reachable_first_terminals(
                    &self.start_alternatives(),
                    &snapshot,
                    adapter,
                    &mut visited,
                );
                for terminal in terminals {
                    if seen.insert(terminal.name.clone()) {
                        out.push(terminal);
                    }
                }
            }
        }
        out
    }

    /// Process one token batch. `fork_parents` maps lexer paths first seen in
    /// this batch to the lexer path they were forked from, so parser state can
    /// be duplicated before the parent consumes its own token.
    pub fn process_batch(
        &mut self,
        code: &Code,
        batch: &[StepToken],
        fork_parents: &HashMap<PathId, PathId>,
        services: &mut EngineServices,
    ) -> Result<(), EngineError> {
        self.adopt_forks(batch, fork_parents)?;

        for token in batch {
            match token.kind {
                StepTokenKind::PathRemoved => self.teardown_lexer_path(token.path_id),
                StepTokenKind::PathMerge { target } => self.retarget(token.path_id, target),
                StepTokenKind::PathEnd => self.harvest(token.path_id, token.line, token.column),
                StepTokenKind::Terminal(kind) => {
                    let kind_name = services.interner.resolve(kind).to_string();
                    let value = services.interner.resolve(token.value).to_string();
                    self.drive_token(code, token, &kind_name, &value, services)?;
                }
                StepTokenKind::Unknown => {
                    let value = services.interner.resolve(token.value).to_string();
                    self.drive_token(code, token, UNKNOWN_KIND, &value, services)?;
                }
            }
        }
        Ok(())
    }

    /// Duplicate parser paths onto lexer forks before any token of the batch
    /// is consumed.
    fn adopt_forks(
        &mut self,
        batch: &[StepToken],
        fork_parents: &HashMap<PathId, PathId>,
    ) -> Result<(), EngineError> {
        for token in batch {
            if token.is_control() || self.by_lexer.contains_key(&token.path_id) {
                continue;
            }
            let parent = match fork_parents.get(&token.path_id) {
                Some(parent) => *parent,
                None => continue,
            };
            let parent_ids = match self.by_lexer.get(&parent) {
                Some(ids) => ids.clone(),
                None => continue,
            };
            for parent_id in parent_ids {
                let source = match self.paths.get(&parent_id) {
                    Some(path) => path.clone(),
                    None => continue,
                };
                let mut fork = self.acquire_path()?;
                let id = self.allocate_id();
                fork.path_id = id;
                fork.duplicate_from(&source);
                fork.lexer_path_id = token.path_id;
                self.paths.insert(id, fork);
                self.by_lexer.entry(token.path_id).or_default().push(id);
                self.stats.paths_created += 1;
            }
        }
        Ok(())
    }

    fn drive_token(
        &mut self,
        code: &Code,
        token: &StepToken,
        kind_name: &str,
        value: &str,
        services: &mut EngineServices,
    ) -> Result<(), EngineError> {
        let mut ids = match self.by_lexer.get(&token.path_id) {
            Some(ids) => ids.clone(),
            None => Vec::new(),
        };
        if ids.is_empty() {
            let mut path = self.acquire_path()?;
            let id = self.allocate_id();
            path.path_id = id;
            path.lexer_path_id = token.path_id;
            path.position = token.start;
            self.paths.insert(id, path);
            self.by_lexer.insert(token.path_id, vec![id]);
            self.stats.paths_created += 1;
            ids = vec![id];
        }

        for id in ids {
            let mut path = match self.paths.remove(&id) {
                Some(path) => path,
                None => continue,
            };
            services
                .adapter
                .observe_token(&path.snapshot, kind_name, value, token.start);

            match self.step_path(&mut path, code, token, kind_name, value, services)? {
                StepOutcome::Kept => {
                    self.paths.insert(id, path);
                }
                StepOutcome::Released => {
                    self.release_path(path)?;
                }
            }
        }
        Ok(())
    }

    /// Advance one parser path over one token.
    fn step_path(
        &mut self,
        path: &mut ParserPath,
        code: &Code,
        token: &StepToken,
        kind_name: &str,
        value: &str,
        services: &mut EngineServices,
    ) -> Result<StepOutcome, EngineError> {
        if path.recovering.is_some() {
            return Ok(self.consume_recovering(path, token, kind_name, value));
        }

        // A terminal directly expected by the innermost production consumes
        // without a choice point.
        if let Some(SymbolPart::Terminal(expected)) =
            path.frames.last().and_then(|frame| frame.next_part())
        {
            if expected.name == kind_name
                && services.adapter.is_terminal_valid(expected, &path.snapshot)
            {
                self.consume_terminal(path, code, token, value, services);
                return Ok(StepOutcome::Kept);
            }
            return self.attempt_recovery(path, code, token, kind_name, value, services);
        }

        // Expansion point: the next part is a non-terminal, or the path is idle
        // and seeds from the start productions.
        let candidates = match path.frames.last().and_then(|frame| frame.next_part()) {
            Some(SymbolPart::NonTerminal(nt)) => self.alternatives_of(nt),
            _ => self.start_alternatives(),
        };
        let mut visited = HashSet::new();
        let chains = self.derivation_chains(
            &candidates,
            kind_name,
            &path.snapshot,
            services.adapter,
            &mut visited,
        );

        match chains.len() {
            0 => self.attempt_recovery(path, code, token, kind_name, value, services),
            1 => {
                self.consume_chain(path, &chains[0], code, token, value, services);
                Ok(StepOutcome::Kept)
            }
            _ => {
                // Rank the immediate choice points and keep the best in place;
                // up to two runners-up continue on forked paths.
                let heads: Vec<&Production> = chains.iter().map(|c| &*c[0]).collect();
                let ranked = services.adapter.rank_productions(&heads, &path.snapshot);
                if ranked.len() > self.fork_cap {
                    self.stats.discarded_alternatives += ranked.len() - self.fork_cap;
                    self.warnings.push(
                        Warning::new(
                            ErrorKind::SyntaxError,
                            self.file.clone(),
                            Position::new(token.line + 1, token.column + 1),
                            format!(
                                "Ambiguity of arity {} exceeds the surviving-path cap of {}.",
                                ranked.len(),
                                self.fork_cap
                            ),
                        )
                        .on_path(path.path_id),
                    );
                }

                let pre_state = path.clone();
                let (best_index, _) = ranked[0];
                self.consume_chain(path, &chains[best_index], code, token, value, services);

                for (chain_index, _) in ranked.iter().skip(1).take(self.fork_cap.saturating_sub(1))
                {
                    let mut fork = self.acquire_path()?;
                    let id = self.allocate_id();
                    fork.path_id = id;
                    fork.duplicate_from(&pre_state);
                    self.consume_chain(
                        &mut fork,
                        &chains[*chain_index],
                        code,
                        token,
                        value,
                        services,
                    );
                    self.by_lexer
                        .entry(fork.lexer_path_id)
                        .or_default()
                        .push(id);
                    self.paths.insert(id, fork);
                    self.stats.forks += 1;
                    self.stats.paths_created += 1;
                }
                Ok(StepOutcome::Kept)
            }
        }
    }

    /// Feed a token to a path that is inside a recovery.
    fn consume_recovering(
        &mut self,
        path: &mut ParserPath,
        token: &StepToken,
        kind_name: &str,
        value: &str,
    ) -> StepOutcome {
        let state = match path.recovering.take() {
            Some(state) => state,
            None => return StepOutcome::Kept,
        };
        match state {
            RecoveryState::SyncUntil {
                sync_tokens,
                mut consumed,
                start_position,
            } => {
                consumed.push(value.to_string());
                path.position = token.end;
                if sync_tokens.iter().any(|s| s == value || s == kind_name) {
                    // Anchor re-established; the sync token itself is consumed.
                    path.snapshot = path.snapshot.at_position(token.end);
                    path.snapshot.parse_state = ParseState::Idle;
                } else {
                    path.recovering = Some(RecoveryState::SyncUntil {
                        sync_tokens,
                        consumed,
                        start_position,
                    });
                }
                StepOutcome::Kept
            }
            RecoveryState::SkipTokens {
                remaining,
                start_position,
            } => {
                path.position = token.end;
                if remaining > 1 {
                    path.recovering = Some(RecoveryState::SkipTokens {
                        remaining: remaining - 1,
                        start_position,
                    });
                } else {
                    path.snapshot = path.snapshot.at_position(token.end);
                    path.snapshot.parse_state = ParseState::Idle;
                }
                StepOutcome::Kept
            }
        }
    }

    /// No candidate accepted the token: consult the adapter, then the recovery
    /// registry, then release the path.
    fn attempt_recovery(
        &mut self,
        path: &mut ParserPath,
        code: &Code,
        token: &StepToken,
        kind_name: &str,
        value: &str,
        services: &mut EngineServices,
    ) -> Result<StepOutcome, EngineError> {
        let position = Position::new(token.line + 1, token.column + 1);

        if let Some(proposal) = services
            .adapter
            .propose_recovery(&path.snapshot, kind_name, value)
        {
            match proposal {
                PathRecovery::Skip => {
                    path.position = token.end;
                    self.warnings.push(
                        Warning::new(
                            ErrorKind::LexicalError,
                            self.file.clone(),
                            position,
                            format!("Skipped unexpected character '{}'.", value),
                        )
                        .on_path(path.path_id),
                    );
                    return Ok(StepOutcome::Kept);
                }
                PathRecovery::Backtrack => {
                    return Ok(StepOutcome::Released);
                }
            }
        }

        let sync_tokens: Vec<String> = self
            .grammar
            .error_recovery
            .sync_tokens
            .iter()
            .cloned()
            .collect();
        let ctx = RecoveryContext {
            error_kind: ErrorKind::SyntaxError,
            position: token.start,
            current_token: Some((kind_name.to_string(), value.to_string())),
        };
        let result = services.recovery.apply_recovery(
            services.container,
            &self.grammar.name,
            &sync_tokens,
            &ctx,
        );

        match result.action {
            RecoveryAction::Synchronize => {
                self.warnings.push(
                    Warning::new(
                        ErrorKind::SyntaxError,
                        self.file.clone(),
                        position,
                        format!("Unexpected '{}'; synchronizing.", value),
                    )
                    .on_path(path.path_id),
                );
                // Abandon the active productions; completed children survive as
                // partial output.
                self.salvage_frames(path);
                path.snapshot.parse_state = ParseState::Recovering;
                let sync = match result.strategy {
                    Some(RecoveryStrategy::Synchronization { sync_tokens }) => sync_tokens,
                    _ => sync_tokens,
                };
                path.recovering = Some(RecoveryState::SyncUntil {
                    sync_tokens: sync,
                    consumed: Vec::new(),
                    start_position: token.start,
                });
                // The offending token is the first recovered token.
                Ok(self.consume_recovering(path, token, kind_name, value))
            }
            RecoveryAction::Skip => {
                self.warnings.push(
                    Warning::new(
                        ErrorKind::SyntaxError,
                        self.file.clone(),
                        position,
                        format!("Unexpected '{}'; skipping.", value),
                    )
                    .on_path(path.path_id),
                );
                let skip = match result.strategy {
                    Some(RecoveryStrategy::Skip(n)) => n.max(1),
                    _ => 1,
                };
                path.snapshot.parse_state = ParseState::Recovering;
                path.recovering = Some(RecoveryState::SkipTokens {
                    remaining: skip,
                    start_position: token.start,
                });
                Ok(self.consume_recovering(path, token, kind_name, value))
            }
            RecoveryAction::CharacterSkip => {
                path.position = token.end.min(token.start + 1);
                Ok(StepOutcome::Kept)
            }
            RecoveryAction::Insert => {
                let inserted = result.strategy.as_ref().and_then(|s| match s {
                    RecoveryStrategy::Insert(tok) => Some(tok.clone()),
                    _ => None,
                });
                if let Some(inserted) = inserted {
                    if self.insert_expected(path, token, &inserted) {
                        self.warnings.push(
                            Warning::new(
                                ErrorKind::SyntaxError,
                                self.file.clone(),
                                position,
                                format!("Inserted missing '{}'.", inserted),
                            )
                            .on_path(path.path_id),
                        );
                        // Retry the original token against the advanced state.
                        if let Some(SymbolPart::Terminal(expected)) =
                            path.frames.last().and_then(|frame| frame.next_part())
                        {
                            if expected.name == kind_name {
                                self.consume_terminal(path, code, token, value, services);
                                return Ok(StepOutcome::Kept);
                            }
                        }
                    }
                }
                Ok(self.fail_path(path, token, value))
            }
            RecoveryAction::Replace => {
                let replacement = result.strategy.as_ref().and_then(|s| match s {
                    RecoveryStrategy::Replace(tok) => Some(tok.clone()),
                    _ => None,
                });
                if let Some(replacement) = replacement {
                    let expected_matches = matches!(
                        path.frames.last().and_then(|frame| frame.next_part()),
                        Some(SymbolPart::Terminal(expected)) if expected.name == replacement
                    );
                    if expected_matches {
                        self.warnings.push(
                            Warning::new(
                                ErrorKind::SyntaxError,
                                self.file.clone(),
                                position,
                                format!("Replaced '{}' with '{}'.", value, replacement),
                            )
                            .on_path(path.path_id),
                        );
                        if let Some(frame) = path.frames.last_mut() {
                            frame.children.push(ProductionMatch::leaf(
                                replacement,
                                value,
                                token.start,
                                token.end,
                            ));
                            frame.part_index += 1;
                        }
                        path.position = token.end;
                        self.cascade_completions(path, code, services);
                        return Ok(StepOutcome::Kept);
                    }
                }
                Ok(self.fail_path(path, token, value))
            }
            RecoveryAction::Fail => Ok(self.fail_path(path, token, value)),
        }
    }

    /// Release a path whose recovery failed: record the syntax error and keep
    /// its partial matches available for the best-partial-forest result.
    fn fail_path(&mut self, path: &mut ParserPath, token: &StepToken, value: &str) -> StepOutcome {
        self.record_syntax_error(path, token, value);
        self.salvage_frames(path);
        self.completed.push(CompletedPath {
            path_id: path.path_id,
            lexer_path_id: path.lexer_path_id,
            matches: path.active_matches.clone(),
            score: path.score,
            complete: false,
        });
        StepOutcome::Released
    }

    /// Synthesize an empty-span leaf for an expected terminal named `inserted`.
    fn insert_expected(&mut self, path: &mut ParserPath, token: &StepToken, inserted: &str) -> bool {
        let expected_matches = matches!(
            path.frames.last().and_then(|frame| frame.next_part()),
            Some(SymbolPart::Terminal(expected)) if expected.name == inserted
        );
        if !expected_matches {
            return false;
        }
        if let Some(frame) = path.frames.last_mut() {
            frame
                .children
                .push(ProductionMatch::leaf(inserted, "", token.start, token.start));
            frame.part_index += 1;
        }
        true
    }

    fn record_syntax_error(&mut self, path: &ParserPath, token: &StepToken, value: &str) {
        self.errors.push(
            EngineError::new(
                ErrorKind::SyntaxError,
                self.file.clone(),
                Position::new(token.line + 1, token.column + 1),
                format!("Unexpected '{}'.", value),
            )
            .on_path(path.path_id)
            .in_grammar(self.grammar.name.clone()),
        );
    }

    /// Move completed children of the abandoned frame stack into the path's
    /// match list, outermost first.
    fn salvage_frames(&mut self, path: &mut ParserPath) {
        for frame in path.frames.drain(..) {
            path.active_matches.extend(frame.children);
        }
    }

    fn consume_terminal(
        &mut self,
        path: &mut ParserPath,
        code: &Code,
        token: &StepToken,
        value: &str,
        services: &mut EngineServices,
    ) {
        if let Some(frame) = path.frames.last_mut() {
            let name = match frame.next_part() {
                Some(SymbolPart::Terminal(t)) => t.name.clone(),
                _ => return,
            };
            frame
                .children
                .push(ProductionMatch::leaf(name, value, token.start, token.end));
            frame.part_index += 1;
        }
        path.position = token.end;
        self.cascade_completions(path, code, services);
    }

    /// Push the frames of a derivation chain and consume the token with the
    /// innermost production's leading terminal.
    fn consume_chain(
        &mut self,
        path: &mut ParserPath,
        chain: &[Rc<Production>],
        code: &Code,
        token: &StepToken,
        value: &str,
        services: &mut EngineServices,
    ) {
        for production in chain {
            path.frames.push(Frame::new(production.clone(), token.start));
        }
        if let Some(head) = chain.first() {
            path.confidence = services.adapter.confidence(head, &path.snapshot);
            path.score = (path.score + path.confidence) / 2.0;
        }
        self.consume_terminal(path, code, token, value, services);
    }

    /// Pop completed frames, building matches and firing callbacks, until the
    /// innermost production still wants parts.
    fn cascade_completions(
        &mut self,
        path: &mut ParserPath,
        code: &Code,
        services: &mut EngineServices,
    ) {
        while path
            .frames
            .last()
            .map(|frame| frame.is_complete())
            .unwrap_or(false)
        {
            let frame = match path.frames.pop() {
                Some(frame) => frame,
                None => break,
            };
            let end = path.position;
            let start = frame.start_position;
            let value = std::str::from_utf8(&code.value[start..end.min(code.value.len())])
                .unwrap_or("")
                .to_string();

            // A single-terminal production collapses to a leaf named after it.
            let node = if frame.production.parts.len() == 1
                && frame.children.len() == 1
                && frame.children[0].children.is_empty()
                && matches!(frame.production.parts[0], SymbolPart::Terminal(_))
            {
                let leaf = &frame.children[0];
                ProductionMatch::leaf(
                    frame.production.name.clone(),
                    leaf.value.clone(),
                    leaf.start_position,
                    leaf.end_position,
                )
            } else {
                ProductionMatch::new(
                    frame.production.name.clone(),
                    value,
                    start,
                    end,
                    frame.children,
                )
            };

            path.snapshot = services.adapter.advance_snapshot(
                &path.snapshot,
                &frame.production.name,
                &node.value,
                end,
                services.interner,
            );
            self.run_callbacks(&frame.production, &node, services);
            path.confidence = services.adapter.confidence(&frame.production, &path.snapshot);
            path.score = (path.score + path.confidence) / 2.0;

            match path.frames.last_mut() {
                Some(parent) => {
                    parent.children.push(node);
                    parent.part_index += 1;
                }
                None => path.active_matches.push(node),
            }
        }
    }

    fn run_callbacks(
        &mut self,
        production: &Production,
        node: &ProductionMatch,
        services: &mut EngineServices,
    ) {
        if let Some(name) = &production.callback {
            match services.callbacks.get(name).cloned() {
                Some(callback) => {
                    let mut ctx = CallbackContext {
                        production: &node.production,
                        token_value: &node.value,
                        position: node.start_position,
                        captures: &node.children,
                        symbols: services.adapter.symbols(),
                        user: &mut *services.user,
                    };
                    callback(&mut ctx);
                }
                None => self.warnings.push(Warning::new(
                    ErrorKind::SemanticError,
                    self.file.clone(),
                    Position::new(1, 1),
                    format!("Callback '{}' is not registered.", name),
                )),
            }
        }

        let action =
            services
                .semantic_actions
                .get(services.container, &self.grammar.name, &production.name);
        if let Some(action) = action {
            let callbacks = services.callbacks;
            let resolve = |name: &str| callbacks.get(name).cloned();
            let mut ctx = CallbackContext {
                production: &node.production,
                token_value: &node.value,
                position: node.start_position,
                captures: &node.children,
                symbols: services.adapter.symbols(),
                user: &mut *services.user,
            };
            if let Err(message) =
                crate::registry::run_action(&action, &mut ctx, &resolve, services.executor)
            {
                self.warnings.push(Warning::new(
                    ErrorKind::SemanticError,
                    self.file.clone(),
                    Position::new(1, 1),
                    message,
                ));
            }
        }
    }

    /// Sequences of productions deriving a leading terminal of kind
    /// `token_kind` from one of `candidates`, left-recursion guarded.
    fn derivation_chains(
        &self,
        candidates: &[Rc<Production>],
        token_kind: &str,
        snapshot: &ContextSnapshot,
        adapter: &ContextAdapter,
        visited: &mut HashSet<String>,
    ) -> Vec<Vec<Rc<Production>>> {
        let mut chains = Vec::new();
        for production in candidates {
            if !adapter.is_production_valid_in_context(production, snapshot, token_kind) {
                continue;
            }
            match production.parts.first() {
                Some(SymbolPart::Terminal(terminal)) => {
                    if terminal.name == token_kind && adapter.is_terminal_valid(terminal, snapshot)
                    {
                        chains.push(vec![production.clone()]);
                    }
                }
                Some(SymbolPart::NonTerminal(nt)) => {
                    if !self.non_terminal_valid(nt, snapshot, adapter) {
                        continue;
                    }
                    if !visited.insert(production.name.clone()) {
                        continue;
                    }
                    let sub = self.alternatives_of(nt);
                    for mut chain in
                        self.derivation_chains(&sub, token_kind, snapshot, adapter, visited)
                    {
                        let mut full = Vec::with_capacity(chain.len() + 1);
                        full.push(production.clone());
                        full.append(&mut chain);
                        chains.push(full);
                    }
                    visited.remove(&production.name);
                }
                None => {}
            }
        }
        chains
    }

    fn reachable_first_terminals(
        &self,
        candidates: &[Rc<Production>],
        snapshot: &ContextSnapshot,
        adapter: &ContextAdapter,
        visited: &mut HashSet<String>,
    ) -> Vec<Rc<Terminal>> {
        let mut out = Vec::new();
        for production in candidates {
            if !adapter.is_production_valid_in_context(production, snapshot, "") {
                continue;
            }
            match production.parts.first() {
                Some(SymbolPart::Terminal(terminal)) => {
                    if adapter.is_terminal_valid(terminal, snapshot) {
                        out.push(terminal.clone());
                    }
                }
                Some(SymbolPart::NonTerminal(nt)) => {
                    if !self.non_terminal_valid(nt, snapshot, adapter) {
                        continue;
                    }
                    if !visited.insert(production.name.clone()) {
                        continue;
                    }
                    let sub = self.alternatives_of(nt);
                    out.extend(self.reachable_first_terminals(&sub, snapshot, adapter, visited));
                    visited.remove(&production.name);
                }
                None => {}
            }
        }
        out
    }

    fn non_terminal_valid(
        &self,
        nt: &NonTerminal,
        snapshot: &ContextSnapshot,
        adapter: &ContextAdapter,
    ) -> bool {
        match &nt.context {
            Some(context) => {
                // A context qualifier on a reference follows the same rule as a
                // qualifier on the production itself.
                let probe = Production::new(nt.name.clone(), Vec::new())
                    .with_context(context.clone());
                adapter.is_production_valid_in_context(&probe, snapshot, "")
            }
            None => true,
        }
    }

    fn alternatives_of(&self, nt: &NonTerminal) -> Vec<Rc<Production>> {
        self.grammar
            .production(&nt.name)
            .cloned()
            .unwrap_or_default()
    }

    fn start_alternatives(&self) -> Vec<Rc<Production>> {
        let mut out = Vec::new();
        for name in &self.grammar.start_productions {
            if let Some(alternatives) = self.grammar.production(name) {
                out.extend(alternatives.iter().cloned());
            }
        }
        out
    }

    fn teardown_lexer_path(&mut self, lexer_path: PathId) {
        if let Some(ids) = self.by_lexer.remove(&lexer_path) {
            for id in ids {
                if let Some(path) = self.paths.remove(&id) {
                    let _ = self.release_inner(path);
                }
            }
        }
    }

    fn retarget(&mut self, from: PathId, to: PathId) {
        if let Some(ids) = self.by_lexer.remove(&from) {
            for id in &ids {
                if let Some(path) = self.paths.get_mut(id) {
                    path.lexer_path_id = to;
                }
            }
            self.by_lexer.entry(to).or_default().extend(ids);
        }
    }

    /// A lexer path consumed all input: its parser paths are done. Paths with
    /// no remaining active productions are complete; the rest contribute their
    /// partial matches together with an error.
    fn harvest(&mut self, lexer_path: PathId, line: usize, column: usize) {
        let ids = match self.by_lexer.remove(&lexer_path) {
            Some(ids) => ids,
            None => return,
        };
        for id in ids {
            let mut path = match self.paths.remove(&id) {
                Some(path) => path,
                None => continue,
            };
            let complete = path.frames.is_empty() && path.recovering.is_none();
            if !complete {
                self.errors.push(
                    EngineError::new(
                        ErrorKind::SyntaxError,
                        self.file.clone(),
                        Position::new(line + 1, column + 1),
                        "Unexpected end of input.".into(),
                    )
                    .on_path(path.path_id)
                    .in_grammar(self.grammar.name.clone()),
                );
                self.salvage_frames(&mut path);
            }
            self.completed.push(CompletedPath {
                path_id: path.path_id,
                lexer_path_id: lexer_path,
                matches: path.active_matches.clone(),
                score: path.score,
                complete,
            });
            self.stats.completed += 1;
            let _ = self.release_inner(path);
        }
    }

    fn release_path(&mut self, path: ParserPath) -> Result<(), EngineError> {
        let lexer_path = path.lexer_path_id;
        let id = path.path_id;
        if let Some(ids) = self.by_lexer.get_mut(&lexer_path) {
            ids.retain(|p| *p != id);
            if ids.is_empty() {
                self.by_lexer.remove(&lexer_path);
                self.dead_lexer_paths.push(lexer_path);
            }
        }
        self.release_inner(path)
    }

    fn release_inner(&mut self, path: ParserPath) -> Result<(), EngineError> {
        self.stats.released += 1;
        self.pool.release(path).map_err(|err| self.pool_error(err))
    }

    fn acquire_path(&mut self) -> Result<ParserPath, EngineError> {
        self.pool.acquire().map_err(|err| self.pool_error(err))
    }

    fn allocate_id(&mut self) -> PathId {
        let id = self.next_path_id;
        self.next_path_id = PathId(id.0 + 1);
        id
    }

    fn pool_error(&self, err: PoolError) -> EngineError {
        EngineError::new(
            ErrorKind::PathExplosion,
            self.file.clone(),
            Position::new(1, 1),
            err.to_string(),
        )
    }
}
