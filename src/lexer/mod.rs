//! The step lexer: a non-deterministic tokenizer maintaining multiple concurrent
//! [LexerPath]s.
//!
//! Each call to [StepLexer::next_tokens] performs one step: invalidation markers
//! for paths removed since the last batch, a merge pass over paths standing at
//! the same position, then one token of progress on every live path. Locally
//! ambiguous input forks a path per extra match; the merge pass of later steps
//! bounds the fan-out again.

mod path;

use crate::grammar::{Splitter, Terminal};
use crate::mem::{ExhaustionPolicy, ObjectPool, PoolError, StringInterner};
use crate::token::{StepToken, StepTokenKind, UNKNOWN_KIND};
use crate::{AlignedToken, Code, EngineError, ErrorKind, Log, PathId, Position};
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::collections::BTreeMap;
use std::rc::Rc;

pub use path::LexerPath;

#[cfg(test)]
mod __tests__;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Counters describing lexer traffic for one parse.
pub struct LexerStats {
    pub steps: usize,
    pub tokens_emitted: usize,
    pub forks: usize,
    pub merges: usize,
    pub removed: usize,
}

/// The non-deterministic step tokenizer.
pub struct StepLexer {
    paths: BTreeMap<PathId, LexerPath>,
    /// Paths removed during the previous step; their markers open the next batch.
    invalidated: Vec<LexerPath>,
    next_path_id: PathId,
    pool: ObjectPool<LexerPath>,
    file: String,
    splitter: Option<Regex>,
    surface_path_tokens: bool,
    merge_epsilon: f64,
    max_paths: usize,
    stats: LexerStats,
    log: OnceCell<Log<&'static str>>,
}

impl StepLexer {
    pub fn new(
        file: impl Into<String>,
        splitter: &Splitter,
        surface_path_tokens: bool,
        merge_epsilon: f64,
        max_paths: usize,
        pool_initial: usize,
        pool_high_water: usize,
        pool_policy: ExhaustionPolicy,
    ) -> Result<Self, String> {
        let splitter = match splitter {
            Splitter::None => None,
            Splitter::Space => Some(
                Regex::new(r"^[ \t]+").map_err(|err| format!("{:?}", err))?,
            ),
            Splitter::Pattern(pattern) => {
                let source = if let Some(stripped) = pattern.strip_prefix('^') {
                    format!("^(?:{})", stripped)
                } else {
                    format!("^(?:{})", pattern)
                };
                Some(Regex::new(&source).map_err(|err| {
                    format!("TokenSplitter pattern does not compile: {:?}", err)
                })?)
            }
        };
        Ok(Self {
            paths: BTreeMap::new(),
            invalidated: Vec::new(),
            next_path_id: PathId(0),
            pool: ObjectPool::new(
                pool_initial,
                pool_high_water,
                pool_policy,
                Box::new(LexerPath::new),
            ),
            file: file.into(),
            splitter,
            surface_path_tokens,
            merge_epsilon,
            max_paths,
            stats: LexerStats::default(),
            log: OnceCell::new(),
        })
    }

    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.log
            .set(log)
            .map_err(|err| format!("A log label ({}) was set earlier.", err))
    }

    /// Create the initial path at line 0, column 0.
    pub fn start(&mut self) -> Result<PathId, EngineError> {
        let mut path = self.acquire_path()?;
        let id = self.allocate_id();
        path.path_id = id;
        path.file = self.file.clone();
        self.paths.insert(id, path);
        Ok(id)
    }

    pub fn live_count(&self) -> usize {
        self.paths.len()
    }

    pub fn live_path_ids(&self) -> Vec<PathId> {
        self.paths.keys().copied().collect()
    }

    pub fn path(&self, id: PathId) -> Option<&LexerPath> {
        self.paths.get(&id)
    }

    pub fn stats(&self) -> LexerStats {
        self.stats
    }

    /// Produce the next batch, or `None` once no live paths remain and every
    /// removal marker has been delivered.
    ///
    /// `valid_terminals` supplies, per live path, the terminals the parser
    /// accepts next on that path.
    pub fn next_tokens(
        &mut self,
        code: &Code,
        valid_terminals: &BTreeMap<PathId, Vec<Rc<Terminal>>>,
        interner: &mut StringInterner,
    ) -> Result<Option<Vec<StepToken>>, EngineError> {
        if self.paths.is_empty() && self.invalidated.is_empty() {
            return Ok(None);
        }
        self.stats.steps += 1;
        let mut batch: Vec<StepToken> = Vec::new();

        self.emit_invalidations(&mut batch, interner)?;
        self.merge_equivalent_paths(&mut batch, interner)?;
        self.advance_paths(code, valid_terminals, &mut batch, interner)?;

        self.stats.tokens_emitted += batch.iter().filter(|t| !t.is_control()).count();
        Ok(Some(batch))
    }

    /// Mark a path dead from outside (e.g. its last parser path was released).
    /// The removal marker is emitted at the start of the next batch.
    pub fn invalidate_path(&mut self, id: PathId) {
        if let Some(path) = self.paths.remove(&id) {
            self.stats.removed += 1;
            self.invalidated.push(path);
        }
    }

    fn emit_invalidations(
        &mut self,
        batch: &mut Vec<StepToken>,
        interner: &mut StringInterner,
    ) -> Result<(), EngineError> {
        let empty = self.intern(interner, "")?;
        for mut path in std::mem::take(&mut self.invalidated) {
            batch.push(StepToken {
                path_id: path.path_id,
                kind: StepTokenKind::PathRemoved,
                value: empty,
                start: 0,
                end: 0,
                line: path.line,
                column: path.column,
            });
            #[cfg(debug_assertions)]
            if let Some(l) = self.log.get() {
                if l.order() >= Log::Result(()).order() {
                    println!("[{}] Path {:?} removed", l, path.path_id);
                }
            }
            path.tokens.clear();
            self.pool
                .release(path)
                .map_err(|err| self.pool_error(err))?;
        }
        Ok(())
    }

    /// Merge live paths standing at the same `(line, column)` whose token
    /// counts are equal and whose scores differ by less than epsilon. The
    /// lower-id path of a pair is kept as the base.
    fn merge_equivalent_paths(
        &mut self,
        batch: &mut Vec<StepToken>,
        interner: &mut StringInterner,
    ) -> Result<(), EngineError> {
        let mut groups: BTreeMap<(usize, usize), Vec<PathId>> = BTreeMap::new();
        for (id, path) in &self.paths {
            groups.entry((path.line, path.column)).or_default().push(*id);
        }

        let empty = self.intern(interner, "")?;
        for ids in groups.values() {
            if ids.len() < 2 {
                continue;
            }
            // Ids come out of the BTreeMap ordered, so the base is the lowest id.
            let base_id = ids[0];
            for candidate_id in &ids[1..] {
                let (base, candidate) = match (self.paths.get(&base_id), self.paths.get(candidate_id)) {
                    (Some(b), Some(c)) => (b, c),
                    _ => continue,
                };
                if base.current_token != candidate.current_token {
                    continue;
                }
                if (base.score - candidate.score).abs() >= self.merge_epsilon {
                    continue;
                }
                let mut removed = match self.paths.remove(candidate_id) {
                    Some(path) => path,
                    None => continue,
                };
                self.stats.merges += 1;
                batch.push(StepToken {
                    path_id: removed.path_id,
                    kind: StepTokenKind::PathMerge { target: base_id },
                    value: empty,
                    start: 0,
                    end: 0,
                    line: removed.line,
                    column: removed.column,
                });
                #[cfg(debug_assertions)]
                if let Some(l) = self.log.get() {
                    if l.order() >= Log::Default(()).order() {
                        println!(
                            "[{}] Path {:?} merged into {:?}",
                            l, removed.path_id, base_id
                        );
                    }
                }
                removed.tokens.clear();
                self.pool
                    .release(removed)
                    .map_err(|err| self.pool_error(err))?;
            }
        }
        Ok(())
    }

    fn advance_paths(
        &mut self,
        code: &Code,
        valid_terminals: &BTreeMap<PathId, Vec<Rc<Terminal>>>,
        batch: &mut Vec<StepToken>,
        interner: &mut StringInterner,
    ) -> Result<(), EngineError> {
        let empty = self.intern(interner, "")?;
        let mut emitted: Vec<StepToken> = Vec::new();

        for id in self.live_path_ids() {
            // Normalize the cursor: step over exhausted lines before matching.
            let finished = loop {
                let path = match self.paths.get_mut(&id) {
                    Some(path) => path,
                    None => break true,
                };
                match code.line(path.line) {
                    None => break true,
                    Some(line) if path.column >= line.len() => {
                        path.line += 1;
                        path.column = 0;
                        path.indent = 0;
                        if code.line(path.line).is_none() {
                            break true;
                        }
                    }
                    Some(_) => break false,
                }
            };
            if finished {
                if let Some(mut path) = self.paths.remove(&id) {
                    emitted.push(StepToken {
                        path_id: id,
                        kind: StepTokenKind::PathEnd,
                        value: empty,
                        start: code.value.len(),
                        end: code.value.len(),
                        line: path.line,
                        column: path.column,
                    });
                    path.tokens.clear();
                    self.pool
                        .release(path)
                        .map_err(|err| self.pool_error(err))?;
                }
                continue;
            }

            self.skip_splitter(code, id);
            // Skipping may exhaust the line; let the next step renormalize.
            let (line_no, column, line_start, line) = {
                let path = &self.paths[&id];
                let (start, _) = match code.line_span(path.line) {
                    Some(span) => span,
                    None => continue,
                };
                (path.line, path.column, start, code.line(path.line).unwrap_or(b""))
            };
            if column >= line.len() {
                continue;
            }

            let text = match std::str::from_utf8(&line[column..]) {
                Ok(text) => text,
                Err(_) => {
                    return Err(EngineError::new(
                        ErrorKind::LexicalError,
                        self.file.clone(),
                        Position::new(line_no + 1, column + 1),
                        "Input is not valid UTF-8.".into(),
                    ))
                }
            };

            let mut candidates: Vec<Rc<Terminal>> =
                valid_terminals.get(&id).cloned().unwrap_or_default();
            if candidates.iter().any(|t| t.order_important) {
                candidates.sort_by_key(|t| {
                    if t.order_important {
                        t.terminal_order
                    } else {
                        usize::MAX
                    }
                });
            }
            let mut matches: Vec<(Rc<Terminal>, usize)> = Vec::new();
            for terminal in &candidates {
                if let Some(len) = terminal.match_at(text) {
                    matches.push((terminal.clone(), len));
                }
            }

            let absolute = line_start + column;
            match matches.len() {
                0 => {
                    // Unknown single character; charge the path's score.
                    let char_len = text.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                    let kind = self.intern(interner, UNKNOWN_KIND)?;
                    let value = self.intern(interner, &text[..char_len])?;
                    let path = match self.paths.get_mut(&id) {
                        Some(path) => path,
                        None => continue,
                    };
                    path.score = (path.score - 0.1).max(0.0);
                    path.record(AlignedToken::new(kind, value, absolute, absolute + char_len));
                    path.column += char_len;
                    emitted.push(StepToken {
                        path_id: id,
                        kind: StepTokenKind::Unknown,
                        value,
                        start: absolute,
                        end: absolute + char_len,
                        line: line_no,
                        column,
                    });
                }
                _ => {
                    let forks: Vec<(Rc<Terminal>, usize)> = matches.split_off(1);
                    let (terminal, len) = matches.remove(0);
                    let pre_state = self.paths[&id].clone();

                    let token = self.emit_match(
                        id,
                        &terminal,
                        &text[..len],
                        absolute,
                        line_no,
                        column,
                        interner,
                    )?;
                    emitted.push(token);

                    for (fork_terminal, fork_len) in forks {
                        if self.paths.len() >= self.max_paths {
                            return Err(EngineError::new(
                                ErrorKind::PathExplosion,
                                self.file.clone(),
                                Position::new(line_no + 1, column + 1),
                                format!("Live path cap of {} exceeded.", self.max_paths),
                            ));
                        }
                        let mut fork = self.acquire_path()?;
                        let fork_id = self.allocate_id();
                        fork.path_id = fork_id;
                        fork.duplicate_from(&pre_state);
                        self.paths.insert(fork_id, fork);
                        self.stats.forks += 1;

                        let token = self.emit_match(
                            fork_id,
                            &fork_terminal,
                            &text[..fork_len],
                            absolute,
                            line_no,
                            column,
                            interner,
                        )?;
                        emitted.push(token);
                        #[cfg(debug_assertions)]
                        if let Some(l) = self.log.get() {
                            if l.order() >= Log::Default(()).order() {
                                println!(
                                    "[{}] Path {:?} forked from {:?} on '{}'",
                                    l, fork_id, id, fork_terminal.name
                                );
                            }
                        }
                    }
                }
            }
        }

        // Within one batch tokens are ordered by (path id, emission index).
        emitted.sort_by_key(|t| t.path_id);
        batch.extend(emitted);
        Ok(())
    }

    fn emit_match(
        &mut self,
        id: PathId,
        terminal: &Terminal,
        value_text: &str,
        absolute: usize,
        line_no: usize,
        column: usize,
        interner: &mut StringInterner,
    ) -> Result<StepToken, EngineError> {
        let kind = self.intern(interner, &terminal.name)?;
        let value = self.intern(interner, value_text)?;
        let len = value_text.len();
        let path = match self.paths.get_mut(&id) {
            Some(path) => path,
            None => {
                return Err(EngineError::new(
                    ErrorKind::LexicalError,
                    self.file.clone(),
                    Position::new(line_no + 1, column + 1),
                    "Path vanished mid-step.".into(),
                ))
            }
        };
        path.record(AlignedToken::new(kind, value, absolute, absolute + len));
        path.column = column + len;
        Ok(StepToken {
            path_id: id,
            kind: StepTokenKind::Terminal(kind),
            value,
            start: absolute,
            end: absolute + len,
            line: line_no,
            column,
        })
    }

    fn skip_splitter(&mut self, code: &Code, id: PathId) {
        let splitter = match &self.splitter {
            Some(splitter) => splitter.clone(),
            None => return,
        };
        if let Some(path) = self.paths.get_mut(&id) {
            if let Some(line) = code.line(path.line) {
                if path.column < line.len() {
                    if let Ok(text) = std::str::from_utf8(&line[path.column..]) {
                        if let Some(m) = splitter.find(text) {
                            if m.start() == 0 {
                                path.column += m.end();
                            }
                        }
                    }
                }
            }
        }
    }

    fn acquire_path(&mut self) -> Result<LexerPath, EngineError> {
        self.pool.acquire().map_err(|err| self.pool_error(err))
    }

    fn allocate_id(&mut self) -> PathId {
        let id = self.next_path_id;
        self.next_path_id = PathId(id.0 + 1);
        id
    }

    fn intern(
        &self,
        interner: &mut StringInterner,
        value: &str,
    ) -> Result<crate::StrId, EngineError> {
        interner.intern(value).map_err(|err| {
            EngineError::new(
                ErrorKind::ArenaExhausted,
                self.file.clone(),
                Position::new(1, 1),
                err.to_string(),
            )
        })
    }

    fn pool_error(&self, err: PoolError) -> EngineError {
        EngineError::new(
            ErrorKind::PathExplosion,
            self.file.clone(),
            Position::new(1, 1),
            err.to_string(),
        )
    }

    pub fn surface_path_tokens(&self) -> bool {
        self.surface_path_tokens
    }

    /// Release every path and forget pending markers.
    pub fn reset(&mut self) {
        let ids: Vec<PathId> = self.paths.keys().copied().collect();
        for id in ids {
            if let Some(mut path) = self.paths.remove(&id) {
                path.tokens.clear();
                let _ = self.pool.release(path);
            }
        }
        for mut path in std::mem::take(&mut self.invalidated) {
            path.tokens.clear();
            let _ = self.pool.release(path);
        }
        self.stats = LexerStats::default();
    }
}
