use super::StepLexer;
use crate::grammar::{Splitter, Terminal};
use crate::mem::{ExhaustionPolicy, StringInterner};
use crate::token::StepTokenKind;
use crate::{Code, PathId};
use std::collections::BTreeMap;
use std::rc::Rc;

fn lexer(splitter: Splitter) -> StepLexer {
    StepLexer::new(
        "test.src",
        &splitter,
        true,
        0.1,
        64,
        4,
        64,
        ExhaustionPolicy::Grow,
    )
    .unwrap()
}

fn terminals(defs: &[(&str, &str)]) -> Vec<Rc<Terminal>> {
    defs.iter()
        .map(|(name, pattern)| Rc::new(Terminal::new(*name, *pattern).unwrap()))
        .collect()
}

/// Offer the same terminal set to every live path.
fn uniform(
    lexer: &StepLexer,
    set: &[Rc<Terminal>],
) -> BTreeMap<PathId, Vec<Rc<Terminal>>> {
    lexer
        .live_path_ids()
        .into_iter()
        .map(|id| (id, set.to_vec()))
        .collect()
}

fn drain(
    lexer: &mut StepLexer,
    code: &Code,
    set: &[Rc<Terminal>],
    interner: &mut StringInterner,
) -> Vec<crate::StepToken> {
    let mut all = Vec::new();
    loop {
        let valid = uniform(lexer, set);
        match lexer.next_tokens(code, &valid, interner).unwrap() {
            Some(batch) => all.extend(batch),
            None => break,
        }
    }
    all
}

#[test]
fn single_path_tokenizes_in_order() {
    let mut lexer = lexer(Splitter::None);
    let mut interner = StringInterner::default();
    let code = Code::from("ab12");
    let set = terminals(&[("id", "[a-z]+"), ("num", "[0-9]+")]);
    lexer.start().unwrap();

    let tokens = drain(&mut lexer, &code, &set, &mut interner);
    let data: Vec<_> = tokens.iter().filter(|t| !t.is_control()).collect();
    assert_eq!(data.len(), 2);
    assert_eq!(interner.resolve(data[0].value), "ab");
    assert_eq!(interner.resolve(data[1].value), "12");
    assert_eq!((data[0].start, data[0].end), (0, 2));
    assert_eq!((data[1].start, data[1].end), (2, 4));
    assert!(matches!(tokens.last().unwrap().kind, StepTokenKind::PathEnd));
}

#[test]
fn spans_cover_the_consumed_prefix_contiguously() {
    let mut lexer = lexer(Splitter::None);
    let mut interner = StringInterner::default();
    let code = Code::from("aa11bb");
    let set = terminals(&[("id", "[a-z]+"), ("num", "[0-9]+")]);
    lexer.start().unwrap();

    let tokens = drain(&mut lexer, &code, &set, &mut interner);
    let mut expected_start = 0;
    for token in tokens.iter().filter(|t| !t.is_control()) {
        assert_eq!(token.start, expected_start, "token ranges must be contiguous");
        expected_start = token.end;
    }
    assert_eq!(expected_start, code.value.len());
}

#[test]
fn positions_are_monotonic_within_a_path() {
    let mut lexer = lexer(Splitter::None);
    let mut interner = StringInterner::default();
    let code = Code::from("a\nb\nc");
    let set = terminals(&[("id", "[a-z]")]);
    lexer.start().unwrap();

    let tokens = drain(&mut lexer, &code, &set, &mut interner);
    let mut last = (0usize, 0usize);
    for token in tokens.iter().filter(|t| !t.is_control()) {
        let position = (token.line, token.column);
        assert!(position >= last, "line/column must be non-decreasing");
        last = position;
    }
    assert_eq!(tokens.iter().filter(|t| !t.is_control()).count(), 3);
}

#[test]
fn unknown_character_advances_one_column() {
    let mut lexer = lexer(Splitter::None);
    let mut interner = StringInterner::default();
    let code = Code::from("a?b");
    let set = terminals(&[("id", "[a-z]")]);
    lexer.start().unwrap();

    let tokens = drain(&mut lexer, &code, &set, &mut interner);
    let kinds: Vec<_> = tokens
        .iter()
        .filter(|t| !t.is_control())
        .map(|t| t.kind)
        .collect();
    assert_eq!(kinds.len(), 3);
    assert!(matches!(kinds[1], StepTokenKind::Unknown));
    assert_eq!(interner.resolve(tokens[1].value), "?");
}

#[test]
fn ambiguity_forks_and_merge_collapses() {
    let mut lexer = lexer(Splitter::None);
    let mut interner = StringInterner::default();
    let code = Code::from("if x");
    // 'if' is both a keyword and an identifier prefix.
    let set = terminals(&[("kw_if", "if"), ("id", "[a-z]+"), ("sp", r"\s")]);
    lexer.start().unwrap();

    let tokens = drain(&mut lexer, &code, &set, &mut interner);
    let forked: Vec<_> = tokens
        .iter()
        .filter(|t| matches!(t.kind, StepTokenKind::Terminal(_)) && t.start == 0)
        .collect();
    assert_eq!(forked.len(), 2, "both interpretations of 'if' are emitted");
    assert_ne!(forked[0].path_id, forked[1].path_id);

    let merges: Vec<_> = tokens
        .iter()
        .filter(|t| matches!(t.kind, StepTokenKind::PathMerge { .. }))
        .collect();
    assert_eq!(merges.len(), 1, "equivalent paths merge back");
    match merges[0].kind {
        StepTokenKind::PathMerge { target } => {
            assert!(target < merges[0].path_id, "lower id path is kept as base");
        }
        _ => unreachable!(),
    }
}

#[test]
fn diverged_paths_do_not_merge() {
    let mut lexer = lexer(Splitter::None);
    let mut interner = StringInterner::default();
    // 'ab' as one pair token or as two single chars: the hypotheses never
    // stand at the same position with the same token count again.
    let code = Code::from("ab.");
    let set = terminals(&[("pair", "ab"), ("single", "[a-z]"), ("dot", r"\.")]);
    lexer.start().unwrap();

    let mut merged = false;
    loop {
        let valid = uniform(&lexer, &set);
        let batch = match lexer.next_tokens(&code, &valid, &mut interner).unwrap() {
            Some(batch) => batch,
            None => break,
        };
        if batch
            .iter()
            .any(|t| matches!(t.kind, StepTokenKind::PathMerge { .. }))
        {
            merged = true;
        }
    }
    assert!(!merged);
}

#[test]
fn path_ids_are_never_reused() {
    let mut lexer = lexer(Splitter::None);
    let mut interner = StringInterner::default();
    let code = Code::from("aaa");
    let set = terminals(&[("one", "a"), ("two", "aa")]);
    lexer.start().unwrap();

    let tokens = drain(&mut lexer, &code, &set, &mut interner);
    let mut seen = std::collections::HashSet::new();
    for token in &tokens {
        if let StepTokenKind::Terminal(_) = token.kind {
            seen.insert(token.path_id);
        }
    }
    assert!(seen.len() >= 2, "ambiguity must fork fresh ids");
}

#[test]
fn space_splitter_skips_blanks() {
    let mut lexer = lexer(Splitter::Space);
    let mut interner = StringInterner::default();
    let code = Code::from("a   b");
    let set = terminals(&[("id", "[a-z]")]);
    lexer.start().unwrap();

    let tokens = drain(&mut lexer, &code, &set, &mut interner);
    let data: Vec<_> = tokens.iter().filter(|t| !t.is_control()).collect();
    assert_eq!(data.len(), 2);
    assert_eq!(interner.resolve(data[0].value), "a");
    assert_eq!(interner.resolve(data[1].value), "b");
}

#[test]
fn invalidated_path_markers_open_the_next_batch() {
    let mut lexer = lexer(Splitter::None);
    let mut interner = StringInterner::default();
    let code = Code::from("abc");
    let set = terminals(&[("id", "[a-z]+")]);
    let id = lexer.start().unwrap();

    lexer.invalidate_path(id);
    let valid = uniform(&lexer, &set);
    let batch = lexer
        .next_tokens(&code, &valid, &mut interner)
        .unwrap()
        .unwrap();
    assert!(matches!(batch[0].kind, StepTokenKind::PathRemoved));
    assert_eq!(batch[0].path_id, id);
    assert!(lexer.next_tokens(&code, &valid, &mut interner).unwrap().is_none());
}

#[test]
fn path_explosion_is_reported() {
    let mut lexer = StepLexer::new(
        "test.src",
        &Splitter::None,
        false,
        0.0,
        2,
        2,
        8,
        ExhaustionPolicy::Grow,
    )
    .unwrap();
    let mut interner = StringInterner::default();
    // Three-way ambiguity at every step with merging disabled by epsilon 0.
    let code = Code::from("aaaa");
    let set = terminals(&[("one", "a"), ("two", "aa"), ("three", "aaa")]);
    lexer.start().unwrap();

    let mut failed = false;
    for _ in 0..8 {
        let valid = uniform(&lexer, &set);
        match lexer.next_tokens(&code, &valid, &mut interner) {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(err) => {
                assert_eq!(err.kind, crate::ErrorKind::PathExplosion);
                failed = true;
                break;
            }
        }
    }
    assert!(failed, "the live path cap must trip");
}
