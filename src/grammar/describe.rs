use super::{Grammar, GrammarFormat, Splitter, SymbolPart};
use std::fmt::Write;

impl Grammar {
    /// Render the grammar back into the textual surface understood by
    /// [parse_grammar_text](super::parse_grammar_text). Terminals referenced by
    /// name render as regex or quoted literals exactly as they were declared.
    pub fn describe(&self) -> Result<String, std::fmt::Error> {
        let mut writer = String::new();
        writeln!(writer, "Grammar: {}", self.name)?;
        writeln!(writer, "Inheritable: {}", self.inheritable)?;
        if self.format_type != GrammarFormat::CEBNF {
            writeln!(writer, "FormatType: {:?}", self.format_type)?;
        }
        match &self.token_splitter {
            Splitter::None => {}
            Splitter::Space => writeln!(writer, "TokenSplitter: Space")?,
            Splitter::Pattern(p) => writeln!(writer, "TokenSplitter: \"{}\"", p)?,
        }
        if !self.base_grammars.is_empty() {
            writeln!(writer, "Inherits: {}", self.base_grammars.join(", "))?;
        }
        if self.import_semantics {
            writeln!(writer, "ImportSemantics: true")?;
        }
        if self.coordinate_tokens {
            writeln!(writer, "CoordinateTokens: true")?;
        }
        if !self.start_productions.is_empty() {
            let names: Vec<&str> = self.start_productions.iter().map(|s| s.as_str()).collect();
            writeln!(writer, "StartProductions: {}", names.join(", "))?;
        }
        if !self.error_recovery.sync_tokens.is_empty() {
            let tokens: Vec<String> = self
                .error_recovery
                .sync_tokens
                .iter()
                .map(|t| format!("\"{}\"", t))
                .collect();
            writeln!(writer, "SyncTokens: {}", tokens.join(", "))?;
        }
        writeln!(writer)?;

        for (name, alternatives) in &self.productions {
            let mut bodies = Vec::new();
            for alternative in alternatives {
                let mut body = String::new();
                for (index, part) in alternative.parts.iter().enumerate() {
                    if index > 0 {
                        body.push(' ');
                    }
                    match part {
                        SymbolPart::Terminal(t) => {
                            // Anchored wrapper added by the constructor is stripped
                            // back off for display.
                            let source = t
                                .pattern_str()
                                .strip_prefix("^(?:")
                                .and_then(|s| s.strip_suffix(')'))
                                .unwrap_or_else(|| t.pattern_str());
                            if source == regex::escape(&t.name) {
                                write!(body, "\"{}\"", t.name)?;
                            } else {
                                write!(body, "/{}/", source.replace('/', "\\/"))?;
                            }
                        }
                        SymbolPart::NonTerminal(nt) => match &nt.context {
                            Some(ctx) => write!(body, "<{}({})>", nt.name, ctx)?,
                            None => write!(body, "<{}>", nt.name)?,
                        },
                    }
                }
                if let Some(callback) = &alternative.callback {
                    write!(body, " => {{{}}}", callback)?;
                }
                bodies.push(body);
            }
            writeln!(writer, "{} ::= {}", name, bodies.join(" | "))?;
        }
        Ok(writer)
    }
}
