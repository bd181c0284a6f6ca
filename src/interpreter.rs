use crate::context::ContextAdapter;
use crate::grammar::{
    parse_grammar_text, Associativity, Grammar, GrammarContainer, InheritanceReport,
    InheritanceResolver, NativeCallback, RecoveryStrategy, SemanticAction,
};
use crate::lexer::{LexerStats, StepLexer};
use crate::mem::StringInterner;
use crate::parser::{
    CallbackContext, CompletedPath, EngineServices, ParserStats, ProductionMatch, StepParser,
};
use crate::registry::{
    ActionExecutor, AssociativityRegistry, NoopExecutor, OperatorGroup, PrecedenceRegistry,
    RecoveryRegistry, SemanticActionRegistry,
};
use crate::token::StepToken;
use crate::{Code, EngineError, ErrorKind, GrammarError, PathId, Position, Warning};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Mutable state shared with callbacks; the engine never interprets it.
pub type UserContext = HashMap<String, String>;

/// Engine construction parameters. All limits have workable defaults.
#[derive(Clone)]
pub struct EngineConfig {
    pub arena_initial: usize,
    pub arena_cap: usize,
    pub pool_initial: usize,
    pub pool_high_water: usize,
    /// What path pools do at the high-water mark.
    pub pool_policy: crate::mem::ExhaustionPolicy,
    /// Live lexer path cap; exceeding it fails the parse with PathExplosion.
    pub max_lexer_paths: usize,
    /// Maximum lexer steps per parse; None is unbounded.
    pub step_budget: Option<usize>,
    /// Score tolerance for merging equivalent lexer paths.
    pub merge_epsilon: f64,
    /// Surviving paths per ambiguity, the top-ranked one included.
    pub fork_cap: usize,
    /// Whether path control markers appear in the token trace.
    pub surface_path_tokens: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arena_initial: 4096,
            arena_cap: 64 * 1024 * 1024,
            pool_initial: 8,
            pool_high_water: 1024,
            pool_policy: crate::mem::ExhaustionPolicy::Grow,
            max_lexer_paths: 128,
            step_budget: None,
            merge_epsilon: 0.1,
            fork_cap: 3,
            surface_path_tokens: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Read-only counters over the engine's lifetime and its latest parse.
pub struct EngineStats {
    pub parses: usize,
    pub interned_strings: usize,
    pub interned_bytes: usize,
    pub last_lexer: LexerStats,
    pub last_parser: ParserStats,
}

/// The result of a parse: the best forest, every surviving alternative tagged
/// by path id, and the errors and warnings the run produced.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub forest: Vec<ProductionMatch>,
    /// Parser path the forest was taken from, when any path survived.
    pub path_id: Option<PathId>,
    /// Every finished path, complete or partial, for callers selecting among
    /// ambiguous parses.
    pub alternatives: Vec<CompletedPath>,
    pub errors: Vec<EngineError>,
    pub warnings: Vec<Warning>,
    /// Tokens observed during the parse; control markers are included when the
    /// engine is configured to surface path tokens.
    pub token_trace: Vec<StepToken>,
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The engine coordinator: owns the grammar container, resolver, registries,
/// interner, context adapter and callback table, and drives the step
/// lexer/parser pair from [Interpreter::parse].
pub struct Interpreter {
    config: EngineConfig,
    container: GrammarContainer,
    resolver: InheritanceResolver,
    precedence: PrecedenceRegistry,
    associativity: AssociativityRegistry,
    semantic_actions: SemanticActionRegistry,
    recovery: RecoveryRegistry,
    adapter: ContextAdapter,
    interner: StringInterner,
    callbacks: HashMap<String, NativeCallback>,
    executor: Box<dyn ActionExecutor>,
    user: UserContext,
    /// Load-time warnings (legacy headers, non-inheritable bases).
    warnings: Vec<Warning>,
    stats: EngineStats,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new(EngineConfig::default())
    }
}

impl Interpreter {
    pub fn new(config: EngineConfig) -> Self {
        let interner = StringInterner::new(config.arena_initial, config.arena_cap);
        Self {
            config,
            container: GrammarContainer::new(),
            resolver: InheritanceResolver::new(),
            precedence: PrecedenceRegistry::new(),
            associativity: AssociativityRegistry::new(),
            semantic_actions: SemanticActionRegistry::new(),
            recovery: RecoveryRegistry::new(),
            adapter: ContextAdapter::new(),
            interner,
            callbacks: HashMap::new(),
            executor: Box::new(NoopExecutor),
            user: UserContext::new(),
            warnings: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    /// Install a pluggable executor for template and script semantic actions.
    pub fn set_executor(&mut self, executor: Box<dyn ActionExecutor>) {
        self.executor = executor;
    }

    pub fn container(&self) -> &GrammarContainer {
        &self.container
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Warnings accumulated while loading grammars.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn user_context(&self) -> &UserContext {
        &self.user
    }

    pub fn user_context_mut(&mut self) -> &mut UserContext {
        &mut self.user
    }

    /// Parse grammar text and install it. With `resolve` set, the inheritance
    /// chain is resolved eagerly and a failure uninstalls the grammar again.
    pub fn load_grammar(
        &mut self,
        content: &str,
        file_name: &str,
        resolve: bool,
    ) -> Result<String, GrammarError> {
        let loaded = parse_grammar_text(content, file_name)?;
        self.warnings.extend(loaded.warnings);
        let name = loaded.grammar.name.clone();
        self.install(loaded.grammar)?;
        if resolve {
            if let Err(err) = self.resolver.resolve(&self.container, &name) {
                self.container.remove(&name);
                self.resolver.invalidate(&self.container, &name);
                return Err(err);
            }
        }
        Ok(name)
    }

    /// Install an already constructed grammar record.
    pub fn load_grammar_object(&mut self, grammar: Grammar) -> Result<String, GrammarError> {
        let name = grammar.name.clone();
        self.install(grammar)?;
        Ok(name)
    }

    /// Load several grammar files in dependency order. Satisfiable grammars are
    /// installed even when others fail; any failure is reported. A cycle
    /// produces one error per participating grammar and installs none of them.
    pub fn load_grammars_with_dependencies(
        &mut self,
        sources: &[(&str, &str)],
    ) -> Result<Vec<String>, Vec<GrammarError>> {
        let mut grammars = Vec::new();
        let mut errors = Vec::new();
        for (content, file_name) in sources {
            match parse_grammar_text(content, file_name) {
                Ok(loaded) => {
                    self.warnings.extend(loaded.warnings);
                    grammars.push(loaded.grammar);
                }
                Err(err) => errors.push(err),
            }
        }

        let (ordered, order_errors) = GrammarContainer::dependency_order(&grammars);
        for err in order_errors {
            match err {
                GrammarError::CircularInheritance { cycle, .. } => {
                    // One error per participating grammar; the cycle list ends
                    // with a repeat of its first element.
                    let mut participants: Vec<String> = cycle.clone();
                    if participants.len() > 1 {
                        participants.pop();
                    }
                    participants.dedup();
                    for grammar in participants {
                        errors.push(GrammarError::CircularInheritance {
                            grammar,
                            cycle: cycle.clone(),
                        });
                    }
                }
                other => errors.push(other),
            }
        }

        let mut installed = Vec::new();
        for index in ordered {
            let grammar = grammars[index].clone();
            let name = grammar.name.clone();
            match self.install(grammar) {
                Ok(()) => installed.push(name),
                Err(err) => errors.push(err),
            }
        }

        if errors.is_empty() {
            Ok(installed)
        } else {
            Err(errors)
        }
    }

    fn install(&mut self, grammar: Grammar) -> Result<(), GrammarError> {
        let name = grammar.name.clone();
        self.container.insert(grammar)?;
        self.resolver.invalidate(&self.container, &name);
        self.precedence.invalidate(&self.container, &name);
        self.associativity.invalidate(&self.container, &name);
        self.semantic_actions.invalidate(&self.container, &name);
        self.recovery.invalidate(&self.container, &name);
        Ok(())
    }

    /// Validate a grammar's inheritance chain without resolving it.
    pub fn validate_inheritance(&self, name: &str) -> InheritanceReport {
        self.resolver.validate_inheritance(&self.container, name)
    }

    pub fn register_callback<F: Fn(&mut CallbackContext) + 'static>(
        &mut self,
        name: impl Into<String>,
        callback: F,
    ) {
        self.callbacks.insert(name.into(), Rc::new(callback));
    }

    /// Register a semantic action from its textual kind and body. Kinds are
    /// `template`, `callback`, or `script:<lang>`.
    pub fn register_semantic_action(
        &mut self,
        grammar: &str,
        name: &str,
        kind: &str,
        body: &str,
    ) -> Result<(), String> {
        let action = match kind {
            "template" => SemanticAction::Template(body.to_string()),
            "callback" => SemanticAction::Callback(body.to_string()),
            script if script.starts_with("script:") => SemanticAction::Script {
                lang: script["script:".len()..].to_string(),
                body: body.to_string(),
            },
            other => return Err(format!("Unknown semantic action kind '{}'.", other)),
        };
        self.semantic_actions
            .register(&self.container, grammar, name, action);
        Ok(())
    }

    pub fn register_native_action<F: Fn(&mut CallbackContext) + 'static>(
        &mut self,
        grammar: &str,
        name: &str,
        callback: F,
    ) {
        self.semantic_actions.register(
            &self.container,
            grammar,
            name,
            SemanticAction::Native(Rc::new(callback)),
        );
    }

    pub fn register_precedence(&mut self, grammar: &str, operator: &str, level: u32) {
        self.precedence
            .register(&self.container, grammar, operator, level);
    }

    pub fn register_associativity(
        &mut self,
        grammar: &str,
        operator: &str,
        associativity: Associativity,
    ) {
        self.associativity
            .register(&self.container, grammar, operator, associativity);
    }

    pub fn register_recovery(
        &mut self,
        grammar: &str,
        kind: ErrorKind,
        strategy: RecoveryStrategy,
    ) {
        self.recovery
            .register(&self.container, grammar, kind, strategy);
    }

    pub fn compare_precedence(
        &mut self,
        grammar: &str,
        op1: &str,
        op2: &str,
    ) -> Option<Ordering> {
        self.precedence.compare(&self.container, grammar, op1, op2)
    }

    pub fn precedence_table(&mut self, grammar: &str) -> IndexMap<u32, OperatorGroup> {
        let (table, warnings) =
            self.precedence
                .precedence_table(&self.container, &mut self.associativity, grammar);
        self.warnings.extend(warnings);
        table
    }

    pub fn set_context_state(&mut self, name: impl Into<String>, active: bool) {
        self.adapter.set_context_state(name, active);
    }

    pub fn get_context_state(&self, name: &str) -> bool {
        self.adapter.get_context_state(name)
    }

    /// Parse `source` under the resolved form of `grammar_name`, pulling token
    /// batches from the lexer until exhaustion.
    ///
    /// A parse with at least one path consuming all input succeeds and returns
    /// that path's forest; otherwise the best-scoring partial forest is
    /// returned together with a non-empty error list.
    pub fn parse(&mut self, grammar_name: &str, source: &str) -> Result<ParseOutcome, EngineError> {
        let resolved = self.resolver.resolve(&self.container, grammar_name).map_err(|err| {
            EngineError::new(
                err.kind(),
                "<input>",
                Position::new(1, 1),
                err.to_string(),
            )
            .in_grammar(grammar_name)
        })?;

        let code = Code::from(source);
        let file = "<input>";
        let mut lexer = StepLexer::new(
            file,
            &resolved.token_splitter,
            self.config.surface_path_tokens,
            self.config.merge_epsilon,
            self.config.max_lexer_paths,
            self.config.pool_initial,
            self.config.pool_high_water,
            self.config.pool_policy,
        )
        .map_err(|message| {
            EngineError::new(ErrorKind::LexicalError, file, Position::new(1, 1), message)
        })?;
        let mut parser = StepParser::new(
            resolved.clone(),
            file,
            self.config.fork_cap,
            self.config.pool_initial,
            self.config.pool_high_water,
            self.config.pool_policy,
        );

        lexer.start()?;
        let mut token_trace: Vec<StepToken> = Vec::new();
        let mut steps = 0usize;

        loop {
            if let Some(budget) = self.config.step_budget {
                if steps >= budget {
                    self.rollback();
                    return Err(EngineError::new(
                        ErrorKind::Budget,
                        file,
                        code.obtain_position(0),
                        format!("Step budget of {} exhausted.", budget),
                    ));
                }
            }
            steps += 1;

            let mut valid: BTreeMap<PathId, Vec<Rc<crate::grammar::Terminal>>> = BTreeMap::new();
            let mut fork_parents: HashMap<PathId, PathId> = HashMap::new();
            for id in lexer.live_path_ids() {
                valid.insert(id, parser.valid_terminals_for(id, &self.adapter));
                if let Some(parent) = lexer.path(id).and_then(|p| p.parent_path_id) {
                    fork_parents.insert(id, parent);
                }
            }

            let batch = match lexer.next_tokens(&code, &valid, &mut self.interner) {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(err) => {
                    self.rollback();
                    return Err(err);
                }
            };

            for id in lexer.live_path_ids() {
                if let Some(parent) = lexer.path(id).and_then(|p| p.parent_path_id) {
                    fork_parents.entry(id).or_insert(parent);
                }
            }

            for token in &batch {
                if !token.is_control() || self.config.surface_path_tokens {
                    token_trace.push(*token);
                }
            }

            let mut services = EngineServices {
                container: &self.container,
                adapter: &mut self.adapter,
                interner: &mut self.interner,
                recovery: &mut self.recovery,
                semantic_actions: &mut self.semantic_actions,
                callbacks: &self.callbacks,
                executor: &*self.executor,
                user: &mut self.user,
            };
            if let Err(err) = parser.process_batch(&code, &batch, &fork_parents, &mut services) {
                self.rollback();
                return Err(err);
            }

            for dead in parser.take_dead_lexer_paths() {
                lexer.invalidate_path(dead);
            }
        }

        let mut alternatives = parser.take_completed();
        alternatives.sort_by(|a, b| {
            b.complete
                .cmp(&a.complete)
                .then(b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
                .then(a.path_id.cmp(&b.path_id))
        });

        let best = alternatives.first();
        let succeeded = best.map(|path| path.complete).unwrap_or(false);
        let (forest, path_id) = match best {
            Some(path) => (path.matches.clone(), Some(path.path_id)),
            None => (Vec::new(), None),
        };

        let mut errors: Vec<EngineError> = Vec::new();
        if !succeeded {
            errors.extend(parser.errors().iter().cloned());
            if errors.is_empty() {
                errors.push(EngineError::new(
                    ErrorKind::SyntaxError,
                    file,
                    code.obtain_position(0),
                    "No parse path consumed the input.".into(),
                ));
            }
        }
        let warnings = parser.warnings().to_vec();

        self.stats.parses += 1;
        self.stats.interned_strings = self.interner.len();
        self.stats.interned_bytes = self.interner.allocated_bytes();
        self.stats.last_lexer = lexer.stats();
        self.stats.last_parser = parser.stats();

        Ok(ParseOutcome {
            forest,
            path_id,
            alternatives,
            errors,
            warnings,
            token_trace,
        })
    }

    /// Drop all per-parse state: interned strings, symbols, scopes and the user
    /// context. Loaded grammars and registries survive.
    pub fn reset(&mut self) {
        self.interner.reset();
        self.adapter.reset();
        self.user.clear();
        self.stats = EngineStats::default();
    }

    /// Remove every grammar together with the registry entries and caches.
    pub fn clear_grammars(&mut self) {
        self.container.clear();
        self.resolver.clear();
        self.precedence.clear();
        self.associativity.clear();
        self.semantic_actions.clear();
        self.recovery.clear();
        self.warnings.clear();
    }

    /// Reset to a safe rollback point after a fatal parse error.
    fn rollback(&mut self) {
        self.adapter.reset();
        self.interner.reset();
    }
}
