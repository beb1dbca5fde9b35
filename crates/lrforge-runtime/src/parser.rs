//! The implementation of the LR(1) parse engine.

use crate::{
    definition::{ItemKind, Lookahead, ParseAction, ParserDef},
    token::Token,
    tree::Node,
};
use std::fmt;

/// Parse a whole token stream against the given parser definition.
///
/// `error_cap` bounds the number of collected diagnostics. Zero means
/// unlimited.
pub fn parse<D, I>(definition: &D, tokens: I, error_cap: usize) -> Result<ParseResult, ParseError>
where
    D: ParserDef,
    I: IntoIterator<Item = Token>,
{
    let mut engine = ParseEngine::new(definition, error_cap);
    for token in tokens {
        if engine.is_stopped() {
            break;
        }
        engine.offer(token)?;
    }
    engine.finish()
}

/// The outcome of a parse.
///
/// `tree` is set only if the input was accepted without any diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub tree: Option<Node>,
    pub errors: Vec<String>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.tree.is_some() && self.errors.is_empty()
    }
}

/// The instance of LR(1) parser engine that is driven incrementally,
/// one token at a time.
pub struct ParseEngine<'d, D>
where
    D: ParserDef,
{
    definition: &'d D,
    error_cap: usize,
    states_stack: Vec<D::State>,
    nodes_stack: Vec<Node>,
    errors: Vec<String>,
    status: EngineStatus,
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum EngineStatus {
    Running,
    Accepted,
    Stopped,
}

impl<D> fmt::Debug for ParseEngine<'_, D>
where
    D: ParserDef,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseEngine")
            .field("states_stack", &self.states_stack)
            .field("nodes_stack", &self.nodes_stack)
            .field("errors", &self.errors)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl<'d, D> ParseEngine<'d, D>
where
    D: ParserDef,
{
    /// Create a parse engine using the specified parser definition.
    pub fn new(definition: &'d D, error_cap: usize) -> Self {
        Self {
            definition,
            error_cap,
            states_stack: vec![definition.initial_state()],
            nodes_stack: vec![],
            errors: vec![],
            status: EngineStatus::Running,
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_accepted(&self) -> bool {
        self.status == EngineStatus::Accepted
    }

    /// Whether the engine has stopped consuming input because the error
    /// cap has been reached.
    pub fn is_stopped(&self) -> bool {
        self.status == EngineStatus::Stopped
    }

    /// Feed one token, performing every reduction it triggers.
    pub fn offer(&mut self, token: Token) -> Result<(), ParseError> {
        match self.status {
            EngineStatus::Running => self.drive(Some(token)),
            EngineStatus::Accepted => {
                self.report(format!(
                    "unexpected token {:?} ({}) at {} after the input was accepted",
                    token.text, token.name, token.position
                ));
                Ok(())
            }
            EngineStatus::Stopped => Ok(()),
        }
    }

    /// Feed the end of input and return the parse result.
    pub fn finish(mut self) -> Result<ParseResult, ParseError> {
        if self.status == EngineStatus::Running {
            self.drive(None)?;
        }

        let tree = match self.status {
            EngineStatus::Accepted if self.errors.is_empty() => self.nodes_stack.pop(),
            _ => None,
        };
        Ok(ParseResult {
            tree,
            errors: self.errors,
        })
    }

    fn drive(&mut self, token: Option<Token>) -> Result<(), ParseError> {
        let definition = self.definition;
        loop {
            let current = *self
                .states_stack
                .last()
                .ok_or(ParseError::EmptyStateStack)?;
            let lookahead = match &token {
                Some(token) => Lookahead::Token(&token.name),
                None => Lookahead::End,
            };

            match definition.action(current, lookahead) {
                Some(ParseAction::Shift(next)) => {
                    let token = token.ok_or_else(|| ParseError::ShiftAtEnd {
                        state: format!("{:?}", current),
                    })?;
                    tracing::trace!("shift {:?} -> {:?}", token.name, next);
                    self.nodes_stack.push(Node::Token(token));
                    self.states_stack.push(next);
                    return Ok(());
                }

                Some(ParseAction::Reduce(rule)) => {
                    self.reduce(rule)?;
                    // the same lookahead is processed again.
                    continue;
                }

                Some(ParseAction::Accept) => {
                    if self.nodes_stack.len() != 1 {
                        return Err(ParseError::UnbalancedAccept {
                            count: self.nodes_stack.len(),
                        });
                    }
                    tracing::trace!("accept");
                    self.status = EngineStatus::Accepted;
                    if let Some(token) = token {
                        return self.offer(token);
                    }
                    return Ok(());
                }

                Some(ParseAction::Error(message)) => {
                    let message = match &token {
                        Some(token) => format!(
                            "{} (at token {:?} ({}) at {})",
                            message, token.text, token.name, token.position
                        ),
                        None => format!("{} (at end of input)", message),
                    };
                    self.reject(message, token.is_none());
                    return Ok(());
                }

                None => {
                    let expected = definition.expected_tokens(current).join(", ");
                    let expected = if expected.is_empty() {
                        "(nothing)".to_owned()
                    } else {
                        expected
                    };
                    let message = match &token {
                        Some(token) => format!(
                            "unexpected token {:?} ({}) at {}, expected one of: {}",
                            token.text, token.name, token.position, expected
                        ),
                        None => format!("unexpected end of input, expected one of: {}", expected),
                    };
                    // The offending token is dropped.
                    self.reject(message, token.is_none());
                    return Ok(());
                }
            }
        }
    }

    fn reduce(&mut self, rule: D::Rule) -> Result<(), ParseError> {
        let definition = self.definition;
        let production = definition.production(rule);
        let arity = production.arity();
        if self.nodes_stack.len() < arity || self.states_stack.len() <= arity {
            return Err(ParseError::StackUnderflow {
                rule: production.to_string(),
            });
        }

        let mut popped = self
            .nodes_stack
            .split_off(self.nodes_stack.len() - arity)
            .into_iter();
        self.states_stack
            .truncate(self.states_stack.len() - arity);

        let mut children = Vec::with_capacity(production.right.len());
        for item in &production.right {
            if item.kind == ItemKind::Prompt {
                children.push(Node::Prompt(item.name.to_owned()));
                continue;
            }
            let node = popped.next().ok_or_else(|| ParseError::StackUnderflow {
                rule: production.to_string(),
            })?;
            if node.kind() != item.kind || node.name() != item.name {
                return Err(ParseError::Inconsistent {
                    rule: production.to_string(),
                    expected: item.to_string(),
                    found: format!("{} `{}'", node.kind(), node.name()),
                });
            }
            children.push(node);
        }

        let exposed = *self
            .states_stack
            .last()
            .ok_or(ParseError::EmptyStateStack)?;
        let next = definition
            .goto(exposed, rule)
            .ok_or_else(|| ParseError::MissingGoto {
                state: format!("{:?}", exposed),
                term: production.left.to_owned(),
            })?;
        tracing::trace!("reduce {} -> goto {:?}", production, next);

        self.nodes_stack.push(Node::Rule {
            term: production.left.to_owned(),
            children,
        });
        self.states_stack.push(next);

        Ok(())
    }

    fn reject(&mut self, message: String, at_end: bool) {
        self.report(message);
        if at_end && self.status == EngineStatus::Running {
            self.status = EngineStatus::Stopped;
        }
    }

    fn report(&mut self, message: String) {
        tracing::debug!("parse diagnostic: {}", message);
        self.errors.push(message);
        if self.error_cap > 0 && self.errors.len() >= self.error_cap {
            self.status = EngineStatus::Stopped;
        }
    }
}

/// Failures that indicate a defect in the parse table rather than bad input.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("empty state stack")]
    EmptyStateStack,

    #[error("shift action at the end of input in state {state}")]
    ShiftAtEnd { state: String },

    #[error("stack underflow while reducing `{rule}'")]
    StackUnderflow { rule: String },

    #[error("inconsistent reduction of `{rule}': expected {expected}, found {found}")]
    Inconsistent {
        rule: String,
        expected: String,
        found: String,
    },

    #[error("no goto on `{term}' from state {state}")]
    MissingGoto { state: String, term: String },

    #[error("accepted with {count} nodes on the stack")]
    UnbalancedAccept { count: usize },
}
