//! A small arithmetic grammar family: a base grammar, an extension supplying
//! the numeric terminal, an overriding dialect, a stratified precedence
//! grammar and an ambiguous keyword grammar.

use crate::Interpreter;

/// Base grammar: references `num` without defining it.
pub const ARITH: &str = "Grammar: Arith\n\
Inheritable: true\n\
expr ::= <num> \"+\" <num>\n";

/// Extension supplying the numeric terminal via inheritance.
pub const ARITH_EXT: &str = "Grammar: ArithExt\n\
Inherits: Arith\n\
num ::= /[0-9]+/\n";

/// Dialect overriding `expr` with subtraction.
pub const ARITH_EXT2: &str = "Grammar: ArithExt2\n\
Inherits: ArithExt\n\
expr ::= <num> \"-\" <num>\n";

/// Stratified expression grammar where `*` binds tighter than `+`.
pub const PRECEDENCE: &str = "Grammar: Prec\n\
expr ::= <term> \"+\" <expr> | <term>\n\
term ::= <factor> \"*\" <term> | <factor>\n\
factor ::= /[0-9]+/\n";

/// A grammar where `if` is both a keyword and an ordinary word.
pub const IF_AMBIGUOUS: &str = "Grammar: IfAmb\n\
stmt ::= \"if\" | <word>\n\
word ::= /[a-z]+/\n";

/// Statement grammar with synchronization tokens for error recovery.
pub const STATEMENTS: &str = "Grammar: Stmt\n\
SyncTokens: \";\", \"}\"\n\
stmt ::= <expr> \";\"\n\
expr ::= <id> \"+\" <id>\n\
id ::= /[a-z]+/\n";

/// An engine with the whole arithmetic family loaded.
pub fn arith_engine() -> Interpreter {
    let mut engine = Interpreter::default();
    engine.load_grammar(ARITH, "arith.grammar", true).unwrap();
    engine
        .load_grammar(ARITH_EXT, "arith_ext.grammar", true)
        .unwrap();
    engine
        .load_grammar(ARITH_EXT2, "arith_ext2.grammar", true)
        .unwrap();
    engine
}
