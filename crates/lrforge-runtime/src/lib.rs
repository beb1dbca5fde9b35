//! Runtime implementation for `lrforge` parse tables.

pub mod definition;
pub mod parser;
pub mod token;
pub mod tree;

pub use crate::{
    definition::{ItemKind, ItemRef, Lookahead, ParseAction, ParserDef, Production},
    parser::{parse, ParseEngine, ParseError, ParseResult},
    token::{Position, Token},
    tree::Node,
};
