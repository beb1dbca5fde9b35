//! Analysis of context-free grammars and construction of LR(1) parsers.

pub mod analyze;
pub mod grammar;
pub mod lr1;
pub mod normalize;
pub mod parser;
pub mod table;
pub mod types;
pub mod validate;

mod util;

pub use crate::{
    grammar::{AugmentedGrammar, Grammar, GrammarError, Item, EOF_TOKEN, START_TERM},
    normalize::{NormalizeError, Normalizer},
    parser::{BuildError, Config, Parser},
    table::{OnConflict, TableError},
    validate::validate,
};
pub use lrforge_runtime as runtime;
