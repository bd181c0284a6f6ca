use super::{ContextAdapter, ContextSnapshot, ParseState, PathRecovery, SymbolInfo, SymbolKind, SymbolTable};
use crate::grammar::{NonTerminal, Production, SymbolPart, Terminal};
use crate::mem::StringInterner;

fn prod(name: &str) -> Production {
    Production::new(name, vec![SymbolPart::NonTerminal(NonTerminal::new("x"))])
}

fn prod_with_part(name: &str, part: &str) -> Production {
    Production::new(name, vec![SymbolPart::NonTerminal(NonTerminal::new(part))])
}

#[test]
fn symbol_redefinition_overwrites() {
    let mut table = SymbolTable::new();
    let scope = SymbolTable::global_scope();
    table.define(SymbolInfo::new("x", SymbolKind::Variable, scope, 1));
    table.define(SymbolInfo::new("x", SymbolKind::Function, scope, 9));

    assert_eq!(table.len(), 1);
    let info = table.get(scope, "x").unwrap();
    assert_eq!(info.kind, SymbolKind::Function);
    assert_eq!(info.position, 9);
}

#[test]
fn lookup_walks_scope_chain_innermost_first() {
    let mut table = SymbolTable::new();
    let global = SymbolTable::global_scope();
    let inner = table.new_scope();
    table.define(SymbolInfo::new("x", SymbolKind::Variable, global, 0));
    table.define(SymbolInfo::new("x", SymbolKind::Parameter, inner, 5));

    let chain = vec![global, inner];
    assert_eq!(table.lookup(&chain, "x").unwrap().kind, SymbolKind::Parameter);
    assert_eq!(table.lookup(&[global], "x").unwrap().kind, SymbolKind::Variable);
    assert!(table.lookup(&chain, "y").is_none());
}

#[test]
fn references_attach_to_the_defining_scope() {
    let mut table = SymbolTable::new();
    let global = SymbolTable::global_scope();
    let inner = table.new_scope();
    table.define(SymbolInfo::new("f", SymbolKind::Function, global, 0));

    assert!(table.add_reference(&[global, inner], "f", 12));
    assert!(!table.add_reference(&[global, inner], "missing", 12));
    assert_eq!(table.get(global, "f").unwrap().references, vec![12]);
}

#[test]
fn scope_opening_production_pushes_scope() {
    let mut adapter = ContextAdapter::new();
    let mut interner = StringInterner::default();
    let root = ContextSnapshot::root();

    let opened = adapter.advance_snapshot(&root, "function_start", "", 3, &mut interner);
    assert_eq!(opened.scope_stack.len(), 2);
    assert_ne!(opened.hash, root.hash);

    let closed = adapter.advance_snapshot(&opened, "function_end", "", 7, &mut interner);
    assert_eq!(closed.scope_stack.len(), 1);
}

#[test]
fn scope_close_never_pops_global() {
    let mut adapter = ContextAdapter::new();
    let mut interner = StringInterner::default();
    let root = ContextSnapshot::root();
    let still_root = adapter.advance_snapshot(&root, "block_end", "", 2, &mut interner);
    assert_eq!(still_root.scope_stack.len(), 1);
}

#[test]
fn declaration_production_defines_symbol() {
    let mut adapter = ContextAdapter::new();
    let mut interner = StringInterner::default();
    let root = ContextSnapshot::root();

    let after = adapter.advance_snapshot(&root, "var_decl", "count", 4, &mut interner);
    assert_eq!(after.symbol_context.len(), 1);
    let info = adapter
        .symbols()
        .lookup(&after.scope_stack, "count")
        .expect("symbol must be defined");
    assert_eq!(info.kind, SymbolKind::Variable);
}

#[test]
fn production_context_gates_validity() {
    let mut adapter = ContextAdapter::new();
    let root = ContextSnapshot::root();
    let gated = prod("stmt").with_context("function");

    assert!(!adapter.is_production_valid_in_context(&gated, &root, "id"));

    adapter.set_context_state("function", true);
    assert!(adapter.is_production_valid_in_context(&gated, &root, "id"));
    adapter.set_context_state("function", false);

    // A scope opened by a function_start production satisfies the qualifier too.
    let mut interner = StringInterner::default();
    let inside = adapter.advance_snapshot(&root, "function_start", "", 0, &mut interner);
    assert!(adapter.is_production_valid_in_context(&gated, &inside, "id"));
}

#[test]
fn terminal_context_state_switch() {
    let mut adapter = ContextAdapter::new();
    let root = ContextSnapshot::root();
    let terminal = Terminal::new("if", "if").unwrap();
    assert!(adapter.is_terminal_valid(&terminal, &root));
    adapter.set_context_state("terminal:if", false);
    assert!(!adapter.is_terminal_valid(&terminal, &root));
}

#[test]
fn ranking_scores_follow_context() {
    let mut adapter = ContextAdapter::new();
    let mut interner = StringInterner::default();
    let root = ContextSnapshot::root();

    // Complete 'num' so that productions containing <num> continue the pattern.
    let snapshot = adapter.advance_snapshot(&root, "num", "1", 1, &mut interner);

    let continues = prod_with_part("expr", "num");
    let unrelated = prod_with_part("stmt", "str");
    let gated = prod_with_part("inner", "num").with_context("function");

    let candidates = vec![&continues, &unrelated, &gated];
    let ranked = adapter.rank_productions(&candidates, &snapshot);

    assert_eq!(ranked[0].0, 0, "continuation must rank first");
    assert!((ranked[0].1 - 1.0).abs() < 1e-9, "0.5 + 0.3 + 0.2 capped at 1.0");
    let unrelated_score = ranked.iter().find(|(i, _)| *i == 1).unwrap().1;
    assert!((unrelated_score - 0.8).abs() < 1e-9);
    let gated_score = ranked.iter().find(|(i, _)| *i == 2).unwrap().1;
    assert!((gated_score - 0.7).abs() < 1e-9, "unsatisfied context loses the scope bonus");
}

#[test]
fn recovery_proposals() {
    let adapter = ContextAdapter::new();
    let root = ContextSnapshot::root();

    assert_eq!(
        adapter.propose_recovery(&root, crate::token::UNKNOWN_KIND, " "),
        Some(PathRecovery::Skip),
        "stray whitespace is skipped outright"
    );
    assert_eq!(
        adapter.propose_recovery(&root, crate::token::UNKNOWN_KIND, ";"),
        None,
        "non-blank unknowns defer to the recovery registry"
    );
    assert_eq!(adapter.propose_recovery(&root, "id", "x"), None);

    let recovering = root.with_state(ParseState::Recovering);
    assert_eq!(
        adapter.propose_recovery(&recovering, "id", "x"),
        Some(PathRecovery::Backtrack)
    );
}
