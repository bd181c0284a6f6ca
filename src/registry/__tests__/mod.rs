use super::{
    AssociativityRegistry, PrecedenceRegistry, RecoveryAction, RecoveryContext, RecoveryRegistry,
    SemanticActionRegistry,
};
use crate::grammar::{
    Associativity, Grammar, GrammarContainer, RecoveryStrategy, SemanticAction,
};
use crate::ErrorKind;
use std::cmp::Ordering;

fn hierarchy() -> GrammarContainer {
    let mut container = GrammarContainer::new();
    let base = Grammar::new("Base");
    container.insert(base).unwrap();
    let mut mid = Grammar::new("Mid");
    mid.base_grammars = vec!["Base".to_string()];
    container.insert(mid).unwrap();
    let mut leaf = Grammar::new("Leaf");
    leaf.base_grammars = vec!["Mid".to_string()];
    container.insert(leaf).unwrap();
    container
}

#[test]
fn get_walks_most_derived_first() {
    let container = hierarchy();
    let mut registry = PrecedenceRegistry::new();
    registry.register(&container, "Base", "+", 5);
    registry.register(&container, "Mid", "+", 7);

    assert_eq!(registry.get(&container, "Leaf", "+"), Some(7));
    assert_eq!(registry.get(&container, "Mid", "+"), Some(7));
    assert_eq!(registry.get(&container, "Base", "+"), Some(5));
    assert_eq!(registry.get(&container, "Leaf", "*"), None);
}

#[test]
fn register_invalidates_dependent_lookups() {
    let container = hierarchy();
    let mut registry = PrecedenceRegistry::new();
    registry.register(&container, "Base", "+", 5);
    assert_eq!(registry.get(&container, "Leaf", "+"), Some(5));

    // The cached Leaf lookup must be dropped by a write to Base.
    registry.register(&container, "Base", "+", 9);
    assert_eq!(registry.get(&container, "Leaf", "+"), Some(9));
}

#[test]
fn get_all_overlays_derived_over_base() {
    let container = hierarchy();
    let mut registry = PrecedenceRegistry::new();
    registry.register(&container, "Base", "+", 5);
    registry.register(&container, "Base", "*", 6);
    registry.register(&container, "Leaf", "+", 8);

    let all = registry.get_all(&container, "Leaf");
    let plus = all.iter().find(|(op, _)| op == "+").unwrap();
    assert_eq!(plus.1, 8);
    let star = all.iter().find(|(op, _)| op == "*").unwrap();
    assert_eq!(star.1, 6);

    let direct = registry.get_direct("Leaf");
    assert_eq!(direct, vec![("+".to_string(), 8)]);
}

#[test]
fn remove_all_drops_only_the_grammar() {
    let container = hierarchy();
    let mut registry = PrecedenceRegistry::new();
    registry.register(&container, "Base", "+", 5);
    registry.register(&container, "Leaf", "+", 8);
    registry.remove_all(&container, "Leaf");

    assert_eq!(registry.get(&container, "Leaf", "+"), Some(5), "base entry survives");
    assert!(registry.get_direct("Leaf").is_empty());
}

#[test]
fn compare_is_total_within_registered_operators() {
    let container = hierarchy();
    let mut registry = PrecedenceRegistry::new();
    registry.register(&container, "Base", "+", 5);
    registry.register(&container, "Base", "*", 6);
    registry.register(&container, "Base", "-", 5);

    assert_eq!(registry.compare(&container, "Base", "+", "*"), Some(Ordering::Less));
    assert_eq!(registry.compare(&container, "Base", "*", "+"), Some(Ordering::Greater));
    assert_eq!(registry.compare(&container, "Base", "+", "-"), Some(Ordering::Equal));
    assert_eq!(registry.compare(&container, "Base", "+", "%"), None);
}

#[test]
fn precedence_table_groups_by_level() {
    let container = hierarchy();
    let mut precedence = PrecedenceRegistry::new();
    let mut associativity = AssociativityRegistry::new();
    precedence.register(&container, "Base", "+", 5);
    precedence.register(&container, "Base", "-", 5);
    precedence.register(&container, "Base", "*", 6);
    associativity.register(&container, "Base", "+", Associativity::Left);
    associativity.register(&container, "Base", "-", Associativity::Left);
    associativity.register(&container, "Base", "*", Associativity::Left);

    let (table, warnings) = precedence.precedence_table(&container, &mut associativity, "Base");
    assert!(warnings.is_empty());
    let levels: Vec<u32> = table.keys().copied().collect();
    assert_eq!(levels, vec![5, 6]);
    let level5 = &table[&5];
    assert_eq!(level5.associativity, Associativity::Left);
    let mut ops = level5.operators.clone();
    ops.sort();
    assert_eq!(ops, vec!["+".to_string(), "-".to_string()]);
}

#[test]
fn conflicting_associativity_at_one_level_warns_and_latest_wins() {
    let container = hierarchy();
    let mut precedence = PrecedenceRegistry::new();
    let mut associativity = AssociativityRegistry::new();
    precedence.register(&container, "Base", "+", 5);
    precedence.register(&container, "Base", "-", 5);
    associativity.register(&container, "Base", "+", Associativity::Left);
    associativity.register(&container, "Base", "-", Associativity::Right);

    let (table, warnings) = precedence.precedence_table(&container, &mut associativity, "Base");
    assert_eq!(warnings.len(), 1);
    assert_eq!(table[&5].operators.len(), 2);
    assert_eq!(
        table[&5].associativity,
        Associativity::Right,
        "the later registration takes the level"
    );
}

#[test]
fn derived_associativity_wins_a_level_conflict() {
    let container = hierarchy();
    let mut precedence = PrecedenceRegistry::new();
    let mut associativity = AssociativityRegistry::new();
    precedence.register(&container, "Base", "+", 5);
    associativity.register(&container, "Base", "+", Associativity::Left);
    precedence.register(&container, "Leaf", "-", 5);
    associativity.register(&container, "Leaf", "-", Associativity::Right);

    let (table, warnings) =
        precedence.precedence_table(&container, &mut associativity, "Leaf");
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        table[&5].associativity,
        Associativity::Right,
        "the most-derived registration wins the level"
    );

    // Seen from the base grammar, only its own registration exists.
    let (base_table, base_warnings) =
        precedence.precedence_table(&container, &mut associativity, "Base");
    assert!(base_warnings.is_empty());
    assert_eq!(base_table[&5].associativity, Associativity::Left);
}

#[test]
fn semantic_actions_inherit_and_override() {
    let container = hierarchy();
    let mut registry = SemanticActionRegistry::new();
    registry.register(
        &container,
        "Base",
        "expr",
        SemanticAction::Template("base".into()),
    );
    registry.register(
        &container,
        "Leaf",
        "expr",
        SemanticAction::Template("leaf".into()),
    );

    match registry.get(&container, "Leaf", "expr") {
        Some(SemanticAction::Template(body)) => assert_eq!(body, "leaf"),
        other => panic!("expected leaf template, got {:?}", other),
    }
    match registry.get(&container, "Mid", "expr") {
        Some(SemanticAction::Template(body)) => assert_eq!(body, "base"),
        other => panic!("expected base template, got {:?}", other),
    }
}

#[test]
fn recovery_prefers_registered_strategy() {
    let container = hierarchy();
    let mut registry = RecoveryRegistry::new();
    registry.register(
        &container,
        "Base",
        ErrorKind::SyntaxError,
        RecoveryStrategy::Skip(2),
    );

    let ctx = RecoveryContext {
        error_kind: ErrorKind::SyntaxError,
        position: 3,
        current_token: None,
    };
    let result = registry.apply_recovery(&container, "Leaf", &[], &ctx);
    assert_eq!(result.action, RecoveryAction::Skip);
}

#[test]
fn recovery_defaults_per_error_kind() {
    let container = hierarchy();
    let mut registry = RecoveryRegistry::new();
    let sync = vec![";".to_string()];

    let syntax = registry.apply_recovery(
        &container,
        "Base",
        &sync,
        &RecoveryContext {
            error_kind: ErrorKind::SyntaxError,
            position: 0,
            current_token: None,
        },
    );
    assert_eq!(syntax.action, RecoveryAction::Synchronize);

    let semantic = registry.apply_recovery(
        &container,
        "Base",
        &sync,
        &RecoveryContext {
            error_kind: ErrorKind::SemanticError,
            position: 0,
            current_token: None,
        },
    );
    assert_eq!(semantic.action, RecoveryAction::Skip);

    let lexical = registry.apply_recovery(
        &container,
        "Base",
        &sync,
        &RecoveryContext {
            error_kind: ErrorKind::LexicalError,
            position: 0,
            current_token: None,
        },
    );
    assert_eq!(lexical.action, RecoveryAction::CharacterSkip);

    let budget = registry.apply_recovery(
        &container,
        "Base",
        &sync,
        &RecoveryContext {
            error_kind: ErrorKind::Budget,
            position: 0,
            current_token: None,
        },
    );
    assert_eq!(budget.action, RecoveryAction::Fail);
    assert!(!budget.is_recoverable());
}

#[test]
fn synchronization_without_sync_tokens_fails() {
    let container = hierarchy();
    let mut registry = RecoveryRegistry::new();
    let result = registry.apply_recovery(
        &container,
        "Base",
        &[],
        &RecoveryContext {
            error_kind: ErrorKind::SyntaxError,
            position: 0,
            current_token: None,
        },
    );
    assert_eq!(result.action, RecoveryAction::Fail);
}
