use super::{EngineServices, StepParser};
use crate::context::ContextAdapter;
use crate::grammar::{
    Grammar, GrammarContainer, NativeCallback, NonTerminal, Production, SymbolPart, Terminal,
};
use crate::mem::StringInterner;
use crate::registry::{NoopExecutor, RecoveryRegistry, SemanticActionRegistry};
use crate::token::{StepToken, StepTokenKind};
use crate::{Code, PathId};
use std::collections::HashMap;
use std::rc::Rc;

struct Rig {
    container: GrammarContainer,
    adapter: ContextAdapter,
    interner: StringInterner,
    recovery: RecoveryRegistry,
    semantic_actions: SemanticActionRegistry,
    callbacks: HashMap<String, NativeCallback>,
    executor: NoopExecutor,
    user: crate::UserContext,
}

impl Rig {
    fn new() -> Self {
        Self {
            container: GrammarContainer::new(),
            adapter: ContextAdapter::new(),
            interner: StringInterner::default(),
            recovery: RecoveryRegistry::new(),
            semantic_actions: SemanticActionRegistry::new(),
            callbacks: HashMap::new(),
            executor: NoopExecutor,
            user: crate::UserContext::new(),
        }
    }

    fn services(&mut self) -> EngineServices<'_> {
        EngineServices {
            container: &self.container,
            adapter: &mut self.adapter,
            interner: &mut self.interner,
            recovery: &mut self.recovery,
            semantic_actions: &mut self.semantic_actions,
            callbacks: &self.callbacks,
            executor: &self.executor,
            user: &mut self.user,
        }
    }

    fn token(
        &mut self,
        path: u32,
        kind: &str,
        value: &str,
        start: usize,
        line: usize,
        column: usize,
    ) -> StepToken {
        let kind_id = self.interner.intern(kind).unwrap();
        let value_id = self.interner.intern(value).unwrap();
        StepToken {
            path_id: PathId(path),
            kind: StepTokenKind::Terminal(kind_id),
            value: value_id,
            start,
            end: start + value.len(),
            line,
            column,
        }
    }

    fn control(&mut self, path: u32, kind: StepTokenKind) -> StepToken {
        let empty = self.interner.intern("").unwrap();
        StepToken {
            path_id: PathId(path),
            kind,
            value: empty,
            start: 0,
            end: 0,
            line: 0,
            column: 0,
        }
    }
}

fn arith_grammar() -> Rc<Grammar> {
    let mut g = Grammar::new("Arith");
    let digits = g.set_terminal(Terminal::new("digits", "[0-9]+").unwrap());
    let plus = g.set_terminal(Terminal::literal("+", "+").unwrap());
    g.set_production(
        "num",
        vec![Production::new(
            "num",
            vec![SymbolPart::Terminal(digits)],
        )],
    );
    g.set_production(
        "expr",
        vec![Production::new(
            "expr",
            vec![
                SymbolPart::NonTerminal(NonTerminal::new("num")),
                SymbolPart::Terminal(plus),
                SymbolPart::NonTerminal(NonTerminal::new("num")),
            ],
        )],
    );
    g.start_productions.insert("expr".to_string());
    Rc::new(g)
}

fn parser_for(grammar: Rc<Grammar>) -> StepParser {
    StepParser::new(
        grammar,
        "test.src",
        3,
        4,
        64,
        crate::mem::ExhaustionPolicy::Grow,
    )
}

#[test]
fn drives_a_simple_expression_to_a_tree() {
    let mut rig = Rig::new();
    let mut parser = parser_for(arith_grammar());
    let code = Code::from("12+34");

    let batch = vec![rig.token(0, "digits", "12", 0, 0, 0)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    let batch = vec![rig.token(0, "+", "+", 2, 0, 2)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    let batch = vec![rig.token(0, "digits", "34", 3, 0, 3)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    let batch = vec![rig.control(0, StepTokenKind::PathEnd)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();

    let completed = parser.take_completed();
    assert_eq!(completed.len(), 1);
    assert!(completed[0].complete);
    let expr = &completed[0].matches[0];
    assert_eq!(expr.production, "expr");
    assert_eq!(expr.children.len(), 3);
    assert_eq!(expr.children[0].production, "num");
    assert_eq!(expr.children[0].value, "12");
    assert_eq!(expr.children[1].production, "+");
    assert_eq!(expr.children[2].value, "34");
    assert_eq!((expr.start_position, expr.end_position), (0, 5));
}

#[test]
fn valid_terminals_follow_the_active_production() {
    let mut rig = Rig::new();
    let mut parser = parser_for(arith_grammar());
    let code = Code::from("12+34");

    // Before any token, only the start first-set is valid.
    let initial = parser.valid_terminals_for(PathId(0), &rig.adapter);
    let names: Vec<&str> = initial.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["digits"]);

    let batch = vec![rig.token(0, "digits", "12", 0, 0, 0)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();

    let after_num = parser.valid_terminals_for(PathId(0), &rig.adapter);
    let names: Vec<&str> = after_num.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["+"], "the expression now expects its operator");
}

#[test]
fn path_removed_tears_down_parser_paths() {
    let mut rig = Rig::new();
    let mut parser = parser_for(arith_grammar());
    let code = Code::from("12");

    let batch = vec![rig.token(0, "digits", "12", 0, 0, 0)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    assert!(parser.live_count() > 0);

    let batch = vec![rig.control(0, StepTokenKind::PathRemoved)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    assert_eq!(parser.live_count(), 0);
    assert!(parser.take_completed().is_empty());
}

#[test]
fn path_merge_retargets_parser_paths() {
    let mut rig = Rig::new();
    let mut parser = parser_for(arith_grammar());
    let code = Code::from("12+34");

    let batch = vec![rig.token(5, "digits", "12", 0, 0, 0)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();

    let batch = vec![rig.control(5, StepTokenKind::PathMerge { target: PathId(2) })];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();

    // Tokens on the merge target now drive the retargeted paths.
    let batch = vec![rig.token(2, "+", "+", 2, 0, 2)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    let batch = vec![rig.token(2, "digits", "34", 3, 0, 3)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    let batch = vec![rig.control(2, StepTokenKind::PathEnd)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();

    let completed = parser.take_completed();
    assert_eq!(completed.len(), 1);
    assert!(completed[0].complete);
    assert_eq!(completed[0].lexer_path_id, PathId(2));
}

#[test]
fn ambiguity_is_capped_at_three_paths() {
    let mut rig = Rig::new();
    // Four alternatives all starting with the same terminal.
    let mut g = Grammar::new("Amb");
    let x = g.set_terminal(Terminal::literal("x", "x").unwrap());
    let enders = ["a", "b", "c", "d"]
        .map(|name| g.set_terminal(Terminal::literal(name, name).unwrap()));
    let alternatives = enders
        .iter()
        .map(|ender| {
            Production::new(
                "stmt",
                vec![
                    SymbolPart::Terminal(x.clone()),
                    SymbolPart::Terminal(ender.clone()),
                ],
            )
        })
        .collect();
    g.set_production("stmt", alternatives);
    g.start_productions.insert("stmt".to_string());

    let mut parser = parser_for(Rc::new(g));
    let code = Code::from("xa");

    let batch = vec![rig.token(0, "x", "x", 0, 0, 0)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();

    assert_eq!(parser.live_count(), 3, "hard cap of three surviving paths");
    assert_eq!(parser.stats().discarded_alternatives, 1);
    assert!(parser
        .warnings()
        .iter()
        .any(|w| w.message.contains("arity 4")));
}

#[test]
fn production_callbacks_mutate_the_user_context() {
    let mut rig = Rig::new();
    let mut g = Grammar::new("Cb");
    let digits = g.set_terminal(Terminal::new("digits", "[0-9]+").unwrap());
    g.set_production(
        "num",
        vec![Production::new("num", vec![SymbolPart::Terminal(digits)])
            .with_callback("remember")],
    );
    g.start_productions.insert("num".to_string());

    rig.callbacks.insert(
        "remember".to_string(),
        Rc::new(|ctx: &mut crate::parser::CallbackContext| {
            ctx.user
                .insert("last_num".to_string(), ctx.token_value.to_string());
        }),
    );

    let mut parser = parser_for(Rc::new(g));
    let code = Code::from("42");
    let batch = vec![rig.token(0, "digits", "42", 0, 0, 0)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();

    assert_eq!(rig.user.get("last_num").map(|s| s.as_str()), Some("42"));
}

#[test]
fn fork_adoption_duplicates_parent_state() {
    let mut rig = Rig::new();
    let mut parser = parser_for(arith_grammar());
    let code = Code::from("12+34");

    let batch = vec![rig.token(0, "digits", "12", 0, 0, 0)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    let before = parser.live_count();

    // Lexer path 1 forked from path 0; its token must see path 0's state.
    let mut fork_parents = HashMap::new();
    fork_parents.insert(PathId(1), PathId(0));
    let batch = vec![rig.token(1, "+", "+", 2, 0, 2)];
    parser
        .process_batch(&code, &batch, &fork_parents, &mut rig.services())
        .unwrap();

    assert_eq!(parser.live_count(), before * 2);

    let batch = vec![rig.token(1, "digits", "34", 3, 0, 3)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();
    let batch = vec![rig.control(1, StepTokenKind::PathEnd)];
    parser
        .process_batch(&code, &batch, &HashMap::new(), &mut rig.services())
        .unwrap();

    let completed = parser.take_completed();
    assert!(completed.iter().any(|c| c.complete), "the fork completed the parse");
}
