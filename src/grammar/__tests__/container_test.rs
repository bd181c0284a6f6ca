use crate::grammar::{Grammar, GrammarContainer};
use crate::GrammarError;

fn grammar(name: &str, bases: &[&str]) -> Grammar {
    let mut g = Grammar::new(name);
    g.base_grammars = bases.iter().map(|b| b.to_string()).collect();
    g
}

#[test]
fn base_and_derived_maps_are_transposes() {
    let mut container = GrammarContainer::new();
    container.insert(grammar("Base", &[])).unwrap();
    container.insert(grammar("Mid", &["Base"])).unwrap();
    container.insert(grammar("Leaf", &["Mid", "Base"])).unwrap();

    assert_eq!(container.bases_of("Leaf"), &["Mid".to_string(), "Base".to_string()]);
    assert_eq!(container.derived_of("Base"), &["Mid".to_string(), "Leaf".to_string()]);
    assert_eq!(container.derived_of("Mid"), &["Leaf".to_string()]);

    for name in ["Base", "Mid", "Leaf"] {
        for base in container.bases_of(name).to_vec() {
            assert!(
                container.derived_of(&base).contains(&name.to_string()),
                "derived_of must invert bases_of for {} -> {}",
                name,
                base
            );
        }
    }
}

#[test]
fn self_inheritance_is_rejected() {
    let mut container = GrammarContainer::new();
    let selfish = grammar("Selfish", &["Selfish"]);
    assert!(!selfish.inherits_from("Selfish"), "a grammar never inherits itself");
    let err = container.insert(selfish).unwrap_err();
    match err {
        GrammarError::CircularInheritance { cycle, .. } => {
            assert_eq!(cycle, vec!["Selfish".to_string(), "Selfish".to_string()]);
        }
        other => panic!("expected CircularInheritance, got {:?}", other),
    }
    assert!(!container.contains("Selfish"));
}

#[test]
fn cycle_closing_insert_is_rejected() {
    let mut container = GrammarContainer::new();
    container.insert(grammar("A", &["B"])).unwrap();
    let err = container.insert(grammar("B", &["A"])).unwrap_err();
    match err {
        GrammarError::CircularInheritance { grammar, cycle } => {
            assert_eq!(grammar, "B");
            assert_eq!(
                cycle,
                vec!["B".to_string(), "A".to_string(), "B".to_string()]
            );
        }
        other => panic!("expected CircularInheritance, got {:?}", other),
    }
    assert!(container.contains("A"));
    assert!(!container.contains("B"));
}

#[test]
fn replacing_a_grammar_relinks_the_graph() {
    let mut container = GrammarContainer::new();
    container.insert(grammar("Base", &[])).unwrap();
    container.insert(grammar("Other", &[])).unwrap();
    container.insert(grammar("Leaf", &["Base"])).unwrap();
    container.insert(grammar("Leaf", &["Other"])).unwrap();

    assert!(container.derived_of("Base").is_empty());
    assert_eq!(container.derived_of("Other"), &["Leaf".to_string()]);
}

#[test]
fn transitive_derivatives_walks_depth() {
    let mut container = GrammarContainer::new();
    container.insert(grammar("A", &[])).unwrap();
    container.insert(grammar("B", &["A"])).unwrap();
    container.insert(grammar("C", &["B"])).unwrap();
    container.insert(grammar("D", &["A"])).unwrap();

    let mut derivatives = container.transitive_derivatives("A");
    derivatives.sort();
    assert_eq!(derivatives, vec!["B".to_string(), "C".to_string(), "D".to_string()]);
}

#[test]
fn dependency_order_reports_cycles_and_missing() {
    let grammars = vec![
        grammar("A", &["B"]),
        grammar("B", &["A"]),
        grammar("C", &[]),
        grammar("D", &["Ghost"]),
    ];
    let (ordered, errors) = GrammarContainer::dependency_order(&grammars);
    assert_eq!(ordered, vec![2], "only C is satisfiable");
    assert!(errors
        .iter()
        .any(|e| matches!(e, GrammarError::CircularInheritance { .. })));
    assert!(errors
        .iter()
        .any(|e| matches!(e, GrammarError::MissingGrammar { missing, .. } if missing == "Ghost")));
}

#[test]
fn dependency_order_sorts_bases_first() {
    let grammars = vec![
        grammar("Leaf", &["Mid"]),
        grammar("Mid", &["Base"]),
        grammar("Base", &[]),
    ];
    let (ordered, errors) = GrammarContainer::dependency_order(&grammars);
    assert!(errors.is_empty());
    assert_eq!(ordered, vec![2, 1, 0]);
}
