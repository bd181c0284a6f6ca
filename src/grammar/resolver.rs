use super::{Grammar, GrammarContainer, RecoveryPolicy, ReportLevel};
use crate::{GrammarError, Log};
use once_cell::unsync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A problem recorded by [InheritanceResolver::validate_inheritance].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InheritanceProblem {
    MissingBase { grammar: String, base: String },
    /// Inheriting a base marked non-inheritable is permitted but suspicious.
    NonInheritableBase { grammar: String, base: String },
    Cycle { cycle: Vec<String> },
}

/// The outcome of validating a grammar's inheritance chain without resolving it.
#[derive(Debug, Clone, Default)]
pub struct InheritanceReport {
    pub problems: Vec<InheritanceProblem>,
}

impl InheritanceReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    /// Problems which would make resolution fail; non-inheritable bases are warnings.
    pub fn has_errors(&self) -> bool {
        self.problems
            .iter()
            .any(|p| !matches!(p, InheritanceProblem::NonInheritableBase { .. }))
    }
}

/// Compute the inheritance linearization of `name`: a deterministic total order
/// over the grammar's transitive bases, base-first, ending with `name` itself.
/// Ties are broken by the order bases are listed in the derived grammar.
pub fn linearize(
    container: &GrammarContainer,
    name: &str,
) -> Result<Vec<String>, GrammarError> {
    let mut order = Vec::new();
    let mut done: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = Vec::new();
    linearize_into(container, name, &mut order, &mut done, &mut stack)?;
    Ok(order)
}

fn linearize_into(
    container: &GrammarContainer,
    name: &str,
    order: &mut Vec<String>,
    done: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> Result<(), GrammarError> {
    if done.contains(name) {
        return Ok(());
    }
    if stack.iter().any(|n| n == name) {
        let mut cycle: Vec<String> = stack.iter().skip_while(|n| *n != name).cloned().collect();
        cycle.push(name.to_string());
        return Err(GrammarError::CircularInheritance {
            grammar: name.to_string(),
            cycle,
        });
    }
    let grammar = container.get(name).ok_or_else(|| GrammarError::MissingGrammar {
        grammar: stack.last().cloned().unwrap_or_else(|| name.to_string()),
        missing: name.to_string(),
    })?;

    stack.push(name.to_string());
    for base in &grammar.base_grammars {
        linearize_into(container, base, order, done, stack)?;
    }
    stack.pop();

    done.insert(name.to_string());
    order.push(name.to_string());
    Ok(())
}

/// Produces resolved grammars: a derived grammar merged with its transitive bases.
///
/// Resolution walks the linearization base-first and overlays each grammar under
/// the merge rules (derived scalars win; name-keyed maps replace on collision with
/// the entry moved to the derived position; start sets union; recovery sync tokens
/// union). Results are cached per derived name and keyed on the participating
/// grammar versions, so a stale entry is re-resolved rather than served.
pub struct InheritanceResolver {
    cache: HashMap<String, (Vec<(String, u64)>, Rc<Grammar>)>,
    log: OnceCell<Log<&'static str>>,
}

impl Default for InheritanceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl InheritanceResolver {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            log: OnceCell::new(),
        }
    }

    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.log
            .set(log)
            .map_err(|err| format!("A log label ({}) was set earlier.", err))
    }

    /// Resolve `name` into a fully merged grammar, serving from cache when the
    /// hierarchy is unchanged.
    pub fn resolve(
        &mut self,
        container: &GrammarContainer,
        name: &str,
    ) -> Result<Rc<Grammar>, GrammarError> {
        let chain = linearize(container, name)?;
        let fingerprint: Vec<(String, u64)> = chain
            .iter()
            .map(|n| {
                let version = container.get(n).map(|g| g.version).unwrap_or(0);
                (n.clone(), version)
            })
            .collect();

        if let Some((cached_fingerprint, resolved)) = self.cache.get(name) {
            if *cached_fingerprint == fingerprint {
                return Ok(resolved.clone());
            }
        }

        #[cfg(debug_assertions)]
        if let Some(label) = self.log.get() {
            if label.order() >= Log::Default(()).order() {
                println!("[{}] Resolving grammar '{}' over {:?}", label, name, chain);
            }
        }

        let mut merged = Grammar::new(name);
        for grammar_name in &chain {
            // Presence is guaranteed by the linearization walk.
            if let Some(grammar) = container.get(grammar_name) {
                merge_layer(&mut merged, grammar);
            }
        }
        // A resolved grammar stands alone.
        merged.base_grammars.clear();
        merged.name = name.to_string();

        let resolved = Rc::new(merged);
        self.cache
            .insert(name.to_string(), (fingerprint, resolved.clone()));
        Ok(resolved)
    }

    /// Perform the resolution walk recording problems instead of failing.
    pub fn validate_inheritance(
        &self,
        container: &GrammarContainer,
        name: &str,
    ) -> InheritanceReport {
        let mut report = InheritanceReport::default();
        let mut stack = Vec::new();
        let mut done = HashSet::new();
        validate_walk(container, name, &mut stack, &mut done, &mut report);
        report
    }

    /// Drop the cache entries of `name` and every transitive derivative.
    pub fn invalidate(&mut self, container: &GrammarContainer, name: &str) {
        self.cache.remove(name);
        for derived in container.transitive_derivatives(name) {
            self.cache.remove(&derived);
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

fn validate_walk(
    container: &GrammarContainer,
    name: &str,
    stack: &mut Vec<String>,
    done: &mut HashSet<String>,
    report: &mut InheritanceReport,
) {
    if done.contains(name) {
        return;
    }
    if stack.iter().any(|n| n == name) {
        let mut cycle: Vec<String> = stack.iter().skip_while(|n| *n != name).cloned().collect();
        cycle.push(name.to_string());
        report.problems.push(InheritanceProblem::Cycle { cycle });
        return;
    }
    let grammar = match container.get(name) {
        Some(g) => g.clone(),
        None => return,
    };
    stack.push(name.to_string());
    for base in &grammar.base_grammars {
        match container.get(base) {
            Some(base_grammar) => {
                if !base_grammar.inheritable {
                    report.problems.push(InheritanceProblem::NonInheritableBase {
                        grammar: name.to_string(),
                        base: base.clone(),
                    });
                }
                validate_walk(container, base, stack, done, report);
            }
            None => report.problems.push(InheritanceProblem::MissingBase {
                grammar: name.to_string(),
                base: base.clone(),
            }),
        }
    }
    stack.pop();
    done.insert(name.to_string());
}

/// Overlay `layer` onto `merged` under the attribute merge rules.
fn merge_layer(merged: &mut Grammar, layer: &Grammar) {
    // Scalars: the more-derived layer wins; the walk ends with the derived grammar.
    merged.format_type = layer.format_type;
    merged.inheritable = layer.inheritable;
    merged.import_semantics = layer.import_semantics;
    merged.coordinate_tokens = layer.coordinate_tokens;
    merged.token_splitter = layer.token_splitter.clone();

    for (name, terminal) in &layer.terminals {
        if merged.terminals.contains_key(name) {
            merged.terminals.shift_remove(name);
        }
        merged.terminals.insert(name.clone(), terminal.clone());
    }

    // Name-keyed map: later layers replace earlier entries, moving them to the
    // derived position.
    for (name, alternatives) in &layer.productions {
        if merged.productions.contains_key(name) {
            merged.productions.shift_remove(name);
        }
        merged
            .productions
            .insert(name.clone(), alternatives.clone());
    }

    for name in &layer.start_terminals {
        merged.start_terminals.insert(name.clone());
    }
    for name in &layer.start_productions {
        merged.start_productions.insert(name.clone());
    }

    for (level, rule) in &layer.precedence_rules {
        merged.precedence_rules.insert(*level, rule.clone());
    }
    merged.precedence_rules.sort_keys();

    for (op, rule) in &layer.associativity_rules {
        merged.associativity_rules.insert(op.clone(), rule.clone());
    }

    for (name, action) in &layer.semantic_action_templates {
        if merged.semantic_action_templates.contains_key(name) {
            merged.semantic_action_templates.shift_remove(name);
        }
        merged
            .semantic_action_templates
            .insert(name.clone(), action.clone());
    }

    merge_recovery(&mut merged.error_recovery, &layer.error_recovery);

    merged.version = merged.version.max(layer.version);
}

fn merge_recovery(merged: &mut RecoveryPolicy, layer: &RecoveryPolicy) {
    for token in &layer.sync_tokens {
        merged.sync_tokens.insert(token.clone());
    }
    if layer.strategy.is_some() {
        merged.strategy = layer.strategy.clone();
    }
    if layer.reporting != ReportLevel::default() {
        merged.reporting = layer.reporting;
    }
}
