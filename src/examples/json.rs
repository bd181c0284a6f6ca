//! A JSON subset grammar: objects, arrays, strings, numbers and constants.
//! Strings do not support escape sequences; the subset exists to exercise
//! nested non-terminal expansion and fork pruning, not to be a JSON parser.

use crate::Interpreter;

pub const JSON: &str = "Grammar: Json\n\
TokenSplitter: Space\n\
value ::= <object> | <array> | <string> | <number> | <constant>\n\
object ::= \"{\" <members> \"}\" | \"{\" \"}\"\n\
members ::= <pair> \",\" <members> | <pair>\n\
pair ::= <string> \":\" <value>\n\
array ::= \"[\" <elements> \"]\" | \"[\" \"]\"\n\
elements ::= <value> \",\" <elements> | <value>\n\
string ::= /\"[^\"]*\"/\n\
number ::= /[0-9]+(\\.[0-9]+)?/\n\
constant ::= \"true\" | \"false\" | \"null\"\n";

pub fn json_engine() -> Interpreter {
    let mut engine = Interpreter::default();
    engine.load_grammar(JSON, "json.grammar", true).unwrap();
    engine
}
