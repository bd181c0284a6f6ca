use crate::examples::arith::{arith_engine, ARITH, ARITH_EXT};
use crate::{ErrorKind, GrammarError, Interpreter};

#[test]
fn base_inheritance_parses_through_the_derived_grammar() {
    let mut engine = arith_engine();

    let outcome = engine.parse("ArithExt", "12+34").unwrap();
    assert!(outcome.is_success(), "errors: {:?}", outcome.errors);

    let expr = &outcome.forest[0];
    assert_eq!(expr.production, "expr");
    assert_eq!(expr.children.len(), 3);
    assert_eq!(expr.children[0].production, "num");
    assert_eq!(expr.children[0].value, "12");
    assert_eq!(expr.children[1].production, "+");
    assert_eq!(expr.children[2].production, "num");
    assert_eq!(expr.children[2].value, "34");
}

#[test]
fn base_grammar_alone_cannot_parse() {
    let mut engine = Interpreter::default();
    engine.load_grammar(ARITH, "arith.grammar", true).unwrap();

    // 'num' is unresolved in the base grammar, so nothing can consume digits.
    let outcome = engine.parse("Arith", "12+34").unwrap();
    assert!(!outcome.is_success());
}

#[test]
fn override_replaces_the_inherited_production() {
    let mut engine = arith_engine();

    let outcome = engine.parse("ArithExt2", "1-2").unwrap();
    assert!(outcome.is_success(), "errors: {:?}", outcome.errors);
    let expr = &outcome.forest[0];
    assert_eq!(expr.production, "expr");
    assert_eq!(expr.children[1].production, "-");
    assert_eq!(expr.children[0].value, "1");
    assert_eq!(expr.children[2].value, "2");
}

#[test]
fn override_rejects_the_replaced_form() {
    let mut engine = arith_engine();

    let outcome = engine.parse("ArithExt2", "1+2").unwrap();
    assert!(!outcome.is_success(), "the '+' form was overridden away");
    let error = &outcome.errors[0];
    assert_eq!(error.kind, ErrorKind::SyntaxError);
    assert_eq!(error.position.line, 1);
    assert_eq!(error.position.column, 2);
}

#[test]
fn cycle_detection_installs_neither_grammar() {
    let mut engine = Interpreter::default();
    let a = "Grammar: A\nInherits: B\nx ::= \"x\"\n";
    let b = "Grammar: B\nInherits: A\ny ::= \"y\"\n";

    let errors = engine
        .load_grammars_with_dependencies(&[(a, "a.grammar"), (b, "b.grammar")])
        .unwrap_err();

    let cycle_errors: Vec<&GrammarError> = errors
        .iter()
        .filter(|e| matches!(e, GrammarError::CircularInheritance { .. }))
        .collect();
    assert_eq!(cycle_errors.len(), 2, "one error per participating grammar");
    for error in &cycle_errors {
        let rendered = error.to_string();
        assert!(
            rendered.contains("A -> B -> A") || rendered.contains("B -> A -> B"),
            "cycle must be named, got {}",
            rendered
        );
    }
    assert!(!engine.container().contains("A"));
    assert!(!engine.container().contains("B"));
}

#[test]
fn dependency_ordered_load_installs_all() {
    let mut engine = Interpreter::default();
    // Derived listed first; the loader must order bases first.
    let names = engine
        .load_grammars_with_dependencies(&[
            (ARITH_EXT, "arith_ext.grammar"),
            (ARITH, "arith.grammar"),
        ])
        .unwrap();
    assert_eq!(names, vec!["Arith".to_string(), "ArithExt".to_string()]);

    let outcome = engine.parse("ArithExt", "7+8").unwrap();
    assert!(outcome.is_success());
}

#[test]
fn resolve_failure_uninstalls_the_grammar() {
    let mut engine = Interpreter::default();
    let orphan = "Grammar: Orphan\nInherits: Ghost\nx ::= \"x\"\n";
    let err = engine.load_grammar(orphan, "orphan.grammar", true).unwrap_err();
    assert!(matches!(err, GrammarError::MissingGrammar { .. }));
    assert!(!engine.container().contains("Orphan"));
}
