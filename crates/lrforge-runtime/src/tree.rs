//! Parse tree.

use crate::{definition::ItemKind, token::Token};
use std::fmt;

/// A node of the parse tree produced by a successful parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A completed reduction. The children correspond one-to-one to the
    /// items of the reduced rule.
    Rule { term: String, children: Vec<Node> },

    /// A shifted token.
    Token(Token),

    /// A zero-width prompt marker.
    Prompt(String),
}

impl Node {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Rule { .. } => ItemKind::Term,
            Self::Token(..) => ItemKind::Token,
            Self::Prompt(..) => ItemKind::Prompt,
        }
    }

    /// The term, token or prompt name of this node.
    pub fn name(&self) -> &str {
        match self {
            Self::Rule { term, .. } => term,
            Self::Token(token) => &token.name,
            Self::Prompt(name) => name,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Self::Rule { children, .. } => children,
            _ => &[],
        }
    }

    /// Collect the leaf tokens of this subtree in source order.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut tokens = vec![];
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Rule { children, .. } => stack.extend(children.iter().rev()),
                Self::Token(token) => tokens.push(token),
                Self::Prompt(..) => (),
            }
        }
        tokens
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule { term, children } => {
                write!(f, "{}[", term)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str("]")
            }
            Self::Token(token) if token.text.is_empty() => write!(f, "'{}'", token.name),
            Self::Token(token) => write!(f, "'{}'", token.text),
            Self::Prompt(name) => write!(f, "@{}", name),
        }
    }
}
