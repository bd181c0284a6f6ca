//! Sample grammars exercising the engine end to end, used by the scenario
//! tests and handy as starting points for embedders.

pub mod arith;
pub mod json;

#[cfg(test)]
mod __tests__;
