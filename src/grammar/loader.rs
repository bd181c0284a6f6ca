use super::{
    Grammar, GrammarFormat, NonTerminal, Production, Splitter, SymbolPart, Terminal,
};
use crate::{GrammarError, Warning};

/// The result of parsing one grammar file: the grammar record plus any
/// warnings the surface produced (e.g. the legacy `Include:` header).
#[derive(Debug)]
pub struct LoadedGrammar {
    pub grammar: Grammar,
    pub warnings: Vec<Warning>,
}

/// Parse the textual grammar surface into a [Grammar] record.
///
/// Recognized header lines:
/// `Grammar:`/`Extends Grammar:`, `TokenSplitter:`, `Inheritable:`,
/// `FormatType:`, `Inherits:` (legacy alias `Include:`), `ImportSemantics:`,
/// `CoordinateTokens:`, `StartProductions:`, `SyncTokens:`.
/// Everything else must be a production of the form
/// `name ::= part part … | alternative … [=> {callback}]` where parts are
/// `<NonTerm>`, `<NonTerm(ctx)>`, `"literal"`, `/regex/` or a bare identifier.
/// The first production of the file becomes a start production unless
/// `StartProductions:` is given.
pub fn parse_grammar_text(content: &str, file_name: &str) -> Result<LoadedGrammar, GrammarError> {
    let mut grammar = Grammar::new("");
    let mut warnings = Vec::new();
    let mut explicit_starts = false;
    let mut first_production: Option<String> = None;
    let mut terminal_order = 0usize;

    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = split_header(line) {
            match key {
                "Grammar" | "Extends Grammar" => grammar.name = value.to_string(),
                "TokenSplitter" => {
                    grammar.token_splitter = parse_splitter(value, file_name, line_no)?;
                }
                "Inheritable" => {
                    grammar.inheritable = parse_bool(value, file_name, line_no, "Inheritable")?;
                }
                "FormatType" => {
                    grammar.format_type = parse_format(value, file_name, line_no)?;
                }
                "Inherits" | "Include" => {
                    if key == "Include" {
                        warnings.push(Warning::new(
                            crate::ErrorKind::SyntaxError,
                            file_name,
                            crate::Position::new(line_no, 1),
                            "Legacy 'Include:' header; use 'Inherits:' instead.".into(),
                        ));
                    }
                    grammar.base_grammars = value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                "ImportSemantics" => {
                    grammar.import_semantics =
                        parse_bool(value, file_name, line_no, "ImportSemantics")?;
                }
                "CoordinateTokens" => {
                    grammar.coordinate_tokens =
                        parse_bool(value, file_name, line_no, "CoordinateTokens")?;
                }
                "StartProductions" => {
                    explicit_starts = true;
                    for name in value.split(',') {
                        let name = name.trim();
                        if !name.is_empty() {
                            grammar.start_productions.insert(name.to_string());
                        }
                    }
                }
                "SyncTokens" => {
                    for token in value.split(',') {
                        let token = token.trim().trim_matches('"');
                        if !token.is_empty() {
                            grammar.error_recovery.sync_tokens.insert(token.to_string());
                        }
                    }
                }
                _ => {
                    return Err(GrammarError::Malformed {
                        file: file_name.to_string(),
                        line: line_no,
                        message: format!("Unknown header '{}'.", key),
                    })
                }
            }
            continue;
        }

        let (lhs, rhs) = line.split_once("::=").ok_or_else(|| GrammarError::Malformed {
            file: file_name.to_string(),
            line: line_no,
            message: "Expected a header line or a production ('name ::= …').".into(),
        })?;

        let (name, context) = parse_lhs(lhs.trim(), file_name, line_no)?;
        let mut alternatives = Vec::new();
        for alt_text in split_alternatives(rhs) {
            let alternative = parse_alternative(
                &alt_text,
                &name,
                context.clone(),
                &mut grammar,
                &mut terminal_order,
                file_name,
                line_no,
            )?;
            alternatives.push(alternative);
        }
        if first_production.is_none() {
            first_production = Some(name.clone());
        }
        // Later definitions of a name within one file overwrite earlier ones.
        grammar.set_production(name, alternatives);
    }

    if grammar.name.is_empty() {
        return Err(GrammarError::Malformed {
            file: file_name.to_string(),
            line: 1,
            message: "Missing 'Grammar:' header.".into(),
        });
    }
    if !explicit_starts {
        if let Some(first) = first_production {
            grammar.start_productions.insert(first);
        }
    }
    for start in grammar.start_productions.clone() {
        if let Some(alternatives) = grammar.productions.get(&start) {
            for alternative in alternatives {
                if let Some(terminal) = alternative.leading_terminal() {
                    grammar.start_terminals.insert(terminal.name.clone());
                }
            }
        }
    }
    grammar.version = 1;

    Ok(LoadedGrammar { grammar, warnings })
}

fn split_header(line: &str) -> Option<(&str, &str)> {
    // A header is 'Key: value' where the key contains no '::=' marker.
    if line.contains("::=") {
        return None;
    }
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), value.trim()))
}

fn parse_bool(value: &str, file: &str, line: usize, key: &str) -> Result<bool, GrammarError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(GrammarError::Malformed {
            file: file.to_string(),
            line,
            message: format!("{} expects 'true' or 'false', found '{}'.", key, value),
        }),
    }
}

fn parse_splitter(value: &str, file: &str, line: usize) -> Result<Splitter, GrammarError> {
    match value {
        "None" => Ok(Splitter::None),
        "Space" => Ok(Splitter::Space),
        quoted if quoted.starts_with('"') && quoted.ends_with('"') && quoted.len() >= 2 => {
            Ok(Splitter::Pattern(quoted[1..quoted.len() - 1].to_string()))
        }
        _ => Err(GrammarError::Malformed {
            file: file.to_string(),
            line,
            message: format!(
                "TokenSplitter expects None, Space or a quoted regex, found '{}'.",
                value
            ),
        }),
    }
}

fn parse_format(value: &str, file: &str, line: usize) -> Result<GrammarFormat, GrammarError> {
    match value {
        "CEBNF" => Ok(GrammarFormat::CEBNF),
        "ANTLR4" => Ok(GrammarFormat::ANTLR4),
        "Bison" => Ok(GrammarFormat::Bison),
        "Flex" => Ok(GrammarFormat::Flex),
        "Yacc" => Ok(GrammarFormat::Yacc),
        "Lex" => Ok(GrammarFormat::Lex),
        "Minotaur" => Ok(GrammarFormat::Minotaur),
        _ => Err(GrammarError::Malformed {
            file: file.to_string(),
            line,
            message: format!("Unknown format type '{}'.", value),
        }),
    }
}

fn parse_lhs(
    lhs: &str,
    file: &str,
    line: usize,
) -> Result<(String, Option<String>), GrammarError> {
    let malformed = |message: String| GrammarError::Malformed {
        file: file.to_string(),
        line,
        message,
    };
    if lhs.is_empty() {
        return Err(malformed("Production name is empty.".into()));
    }
    if let Some((name, rest)) = lhs.split_once('(') {
        let context = rest
            .strip_suffix(')')
            .ok_or_else(|| malformed(format!("Unclosed context qualifier in '{}'.", lhs)))?;
        Ok((name.trim().to_string(), Some(context.trim().to_string())))
    } else {
        Ok((lhs.to_string(), None))
    }
}

/// Split a production body on `|`, ignoring bars inside quoted literals and
/// regex bodies.
fn split_alternatives(rhs: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut in_regex = false;
    let mut escaped = false;

    for c in rhs.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string || in_regex => {
                current.push(c);
                escaped = true;
            }
            '"' if !in_regex => {
                in_string = !in_string;
                current.push(c);
            }
            '/' if !in_string => {
                in_regex = !in_regex;
                current.push(c);
            }
            '|' if !in_string && !in_regex => {
                out.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    out.push(current.trim().to_string());
    out
}

fn parse_alternative(
    text: &str,
    production_name: &str,
    context: Option<String>,
    grammar: &mut Grammar,
    terminal_order: &mut usize,
    file: &str,
    line: usize,
) -> Result<Production, GrammarError> {
    let malformed = |message: String| GrammarError::Malformed {
        file: file.to_string(),
        line,
        message,
    };

    let (body, callback) = match text.split_once("=>") {
        Some((body, action)) => {
            let action = action.trim();
            let callback = action
                .strip_prefix('{')
                .and_then(|a| a.strip_suffix('}'))
                .ok_or_else(|| malformed(format!("Malformed callback tag '{}'.", action)))?;
            (body.trim(), Some(callback.trim().to_string()))
        }
        None => (text, None),
    };

    let mut parts = Vec::new();
    for token in tokenize_body(body, file, line)? {
        let part = match token {
            BodyToken::NonTerminal(name, ctx) => SymbolPart::NonTerminal(match ctx {
                Some(ctx) => NonTerminal::with_context(name, ctx),
                None => NonTerminal::new(name),
            }),
            BodyToken::Literal(value) => {
                let terminal = match grammar.terminal(&value) {
                    Some(existing) => existing.clone(),
                    None => {
                        let mut t = Terminal::literal(value.clone(), &value)
                            .map_err(|e| malformed(e))?;
                        t.order_important = grammar.coordinate_tokens;
                        t.terminal_order = *terminal_order;
                        *terminal_order += 1;
                        grammar.set_terminal(t)
                    }
                };
                SymbolPart::Terminal(terminal)
            }
            BodyToken::Regex(pattern) => {
                let terminal = match grammar.terminal(&pattern) {
                    Some(existing) => existing.clone(),
                    None => {
                        let mut t =
                            Terminal::new(pattern.clone(), &pattern).map_err(|e| malformed(e))?;
                        t.order_important = grammar.coordinate_tokens;
                        t.terminal_order = *terminal_order;
                        *terminal_order += 1;
                        grammar.set_terminal(t)
                    }
                };
                SymbolPart::Terminal(terminal)
            }
            BodyToken::Identifier(name) => {
                // A bare identifier refers to whichever symbol carries the name:
                // a terminal when one is registered, otherwise a non-terminal
                // resolved against the (possibly inherited) productions at parse
                // time.
                match grammar.terminal(&name) {
                    Some(existing) => SymbolPart::Terminal(existing.clone()),
                    None => SymbolPart::NonTerminal(NonTerminal::new(name)),
                }
            }
        };
        parts.push(part);
    }

    if parts.is_empty() {
        return Err(malformed(format!(
            "Production '{}' has an empty alternative.",
            production_name
        )));
    }

    let mut production = Production::new(production_name, parts);
    production.context = context;
    production.callback = callback;
    Ok(production)
}

enum BodyToken {
    NonTerminal(String, Option<String>),
    Literal(String),
    Regex(String),
    Identifier(String),
}

fn tokenize_body(body: &str, file: &str, line: usize) -> Result<Vec<BodyToken>, GrammarError> {
    let malformed = |message: String| GrammarError::Malformed {
        file: file.to_string(),
        line,
        message,
    };

    let mut tokens = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '<' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == '>')
                    .ok_or_else(|| malformed("Unclosed '<' in production body.".into()))?;
                let inner: String = chars[i + 1..i + close].iter().collect();
                let inner = inner.trim();
                if let Some((name, rest)) = inner.split_once('(') {
                    let ctx = rest
                        .strip_suffix(')')
                        .ok_or_else(|| malformed(format!("Unclosed context in '<{}>'.", inner)))?;
                    tokens.push(BodyToken::NonTerminal(
                        name.trim().to_string(),
                        Some(ctx.trim().to_string()),
                    ));
                } else {
                    tokens.push(BodyToken::NonTerminal(inner.to_string(), None));
                }
                i += close + 1;
            }
            '"' => {
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    match chars[j] {
                        '\\' if j + 1 < chars.len() => {
                            value.push(chars[j + 1]);
                            j += 2;
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => {
                            value.push(other);
                            j += 1;
                        }
                    }
                }
                if !closed {
                    return Err(malformed("Unclosed string literal in production body.".into()));
                }
                tokens.push(BodyToken::Literal(value));
                i = j + 1;
            }
            '/' => {
                let mut pattern = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    match chars[j] {
                        '\\' if j + 1 < chars.len() => {
                            // Keep the escape for the regex compiler; '\/' collapses.
                            if chars[j + 1] == '/' {
                                pattern.push('/');
                            } else {
                                pattern.push('\\');
                                pattern.push(chars[j + 1]);
                            }
                            j += 2;
                        }
                        '/' => {
                            closed = true;
                            break;
                        }
                        other => {
                            pattern.push(other);
                            j += 1;
                        }
                    }
                }
                if !closed {
                    return Err(malformed("Unclosed regex literal in production body.".into()));
                }
                tokens.push(BodyToken::Regex(pattern));
                i = j + 1;
            }
            _ => {
                let mut name = String::new();
                let mut j = i;
                while j < chars.len()
                    && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '$')
                {
                    name.push(chars[j]);
                    j += 1;
                }
                if name.is_empty() {
                    return Err(malformed(format!(
                        "Unexpected character '{}' in production body.",
                        c
                    )));
                }
                tokens.push(BodyToken::Identifier(name));
                i = j;
            }
        }
    }
    Ok(tokens)
}
