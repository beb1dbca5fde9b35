//! The parser built from a grammar definition.

use crate::{
    grammar::{AugmentedGrammar, Grammar, GrammarError, Item, RuleID, EOF_TOKEN},
    lr1::{StateID, StateMachine},
    normalize::{NormalizeError, Normalizer},
    table::{Action, OnConflict, ParseTable, TableError},
    validate::validate,
};
use lrforge_runtime::{
    ItemKind, ItemRef, Lookahead, ParseAction, ParseEngine, ParseError, ParseResult, ParserDef,
    Production, Token,
};

/// The settings of the parser construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) on_conflict: OnConflict,
    pub(crate) normalize: bool,
    pub(crate) merge_duplicate_terms: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            on_conflict: OnConflict::Panic,
            normalize: true,
            merge_duplicate_terms: true,
        }
    }

    /// Set the policy for the conflicting table entries.
    pub fn on_conflict(&mut self, on_conflict: OnConflict) -> &mut Self {
        self.on_conflict = on_conflict;
        self
    }

    /// Specify whether to normalize the grammar before the construction.
    pub fn normalize(&mut self, enabled: bool) -> &mut Self {
        self.normalize = enabled;
        self
    }

    /// Specify whether the normalizer merges the terms with identical rules.
    pub fn merge_duplicate_terms(&mut self, enabled: bool) -> &mut Self {
        self.merge_duplicate_terms = enabled;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid grammar:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// An LR(1) parser for a grammar.
#[derive(Debug)]
pub struct Parser {
    grammar: AugmentedGrammar,
    states: StateMachine,
    table: ParseTable,
}

impl Parser {
    pub fn new(grammar: &Grammar, on_conflict: OnConflict) -> Result<Self, BuildError> {
        let mut config = Config::new();
        config.on_conflict(on_conflict);
        Self::with_config(grammar, &config)
    }

    pub fn with_config(grammar: &Grammar, config: &Config) -> Result<Self, BuildError> {
        let diagnostics = validate(grammar);
        if !diagnostics.is_empty() {
            return Err(BuildError::Invalid(diagnostics));
        }

        let grammar = if config.normalize {
            Normalizer::new(config).normalize(grammar)?
        } else {
            grammar.clone()
        };
        let grammar = grammar.augment()?;
        let states = StateMachine::build(&grammar);
        let table = ParseTable::generate(&grammar, &states, &config.on_conflict)?;

        Ok(Self {
            grammar,
            states,
            table,
        })
    }

    /// Parse a whole token stream.
    ///
    /// Bad input is reported through [`ParseResult::errors`], of which at
    /// most `error_cap` are collected (zero means unlimited).
    pub fn parse<I>(&self, tokens: I, error_cap: usize) -> Result<ParseResult, ParseError>
    where
        I: IntoIterator<Item = Token>,
    {
        lrforge_runtime::parse(self, tokens, error_cap)
    }

    /// Create an engine that is fed one token at a time.
    pub fn engine(&self, error_cap: usize) -> ParseEngine<'_, Self> {
        ParseEngine::new(self, error_cap)
    }

    /// The normalized and augmented grammar the parser was built from.
    pub fn grammar(&self) -> &AugmentedGrammar {
        &self.grammar
    }

    pub fn states(&self) -> &StateMachine {
        &self.states
    }

    pub fn table(&self) -> &ParseTable {
        &self.table
    }
}

impl ParserDef for Parser {
    type State = StateID;
    type Rule = RuleID;

    fn initial_state(&self) -> Self::State {
        StateID::START
    }

    fn action(
        &self,
        current: Self::State,
        lookahead: Lookahead<'_>,
    ) -> Option<ParseAction<'_, Self::State, Self::Rule>> {
        let token = match lookahead {
            // only the engine may produce the end of input.
            Lookahead::Token(EOF_TOKEN) => return None,
            Lookahead::Token(name) => self.grammar.find_token(name)?,
            Lookahead::End => self.grammar.eof(),
        };
        match self.table.action(current, Item::Token(token))? {
            Action::Shift(next) => Some(ParseAction::Shift(*next)),
            Action::Reduce(rule) => Some(ParseAction::Reduce(*rule)),
            Action::Accept => Some(ParseAction::Accept),
            Action::Error(message) => Some(ParseAction::Error(message.as_str())),
            Action::Goto(..) => None,
        }
    }

    fn goto(&self, current: Self::State, rule: Self::Rule) -> Option<Self::State> {
        let term = self.grammar[rule].term();
        match self.table.action(current, Item::Term(term))? {
            Action::Goto(next) => Some(*next),
            _ => None,
        }
    }

    fn production(&self, rule: Self::Rule) -> Production<'_> {
        let g = &self.grammar;
        let rule = &g[rule];
        Production {
            left: g[rule.term()].name(),
            right: rule
                .items()
                .iter()
                .map(|&item| ItemRef {
                    kind: match item {
                        Item::Term(..) => ItemKind::Term,
                        Item::Token(..) => ItemKind::Token,
                        Item::Prompt(..) => ItemKind::Prompt,
                    },
                    name: g.item_name(item),
                })
                .collect(),
        }
    }

    fn expected_tokens(&self, current: Self::State) -> Vec<&str> {
        self.table
            .expected_tokens(current)
            .into_iter()
            .map(|token| self.grammar[token].name())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::init_tracing;

    fn tokens(names: &str) -> Vec<Token> {
        names.chars().map(|c| Token::new(c.to_string(), c.to_string())).collect()
    }

    fn parens() -> Grammar {
        Grammar::define(|g| {
            g.set_start("S")?;
            g.new_rule("S")?
                .add_token("(")?
                .add_term("S")?
                .add_token(")")?;
            g.new_rule("S")?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn invalid_grammar() {
        let g = Grammar::define(|g| {
            g.new_rule("S")?.add_token("x")?;
            Ok(())
        })
        .unwrap();
        match Parser::new(&g, OnConflict::Panic) {
            Err(BuildError::Invalid(diagnostics)) => {
                assert_eq!(diagnostics, ["The start term is not specified"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn parser_definition() {
        init_tracing();
        let parser = Parser::new(&parens(), OnConflict::Panic).unwrap();
        let start = parser.initial_state();

        assert!(matches!(
            parser.action(start, Lookahead::Token("(")),
            Some(ParseAction::Shift(..))
        ));
        assert!(matches!(
            parser.action(start, Lookahead::End),
            Some(ParseAction::Reduce(..))
        ));
        assert_eq!(parser.action(start, Lookahead::Token("x")), None);
        assert_eq!(parser.action(start, Lookahead::Token(EOF_TOKEN)), None);
        assert_eq!(parser.expected_tokens(start), [EOF_TOKEN, "("]);

        let s = parser.grammar().find_term("S").unwrap();
        let wrap = parser.grammar().rules_of(s).next().unwrap().id();
        assert_eq!(parser.production(wrap).to_string(), "S := '(' S ')'");
        assert_eq!(parser.production(wrap).arity(), 3);
    }

    #[test]
    fn incremental_engine() {
        let parser = Parser::new(&parens(), OnConflict::Panic).unwrap();
        let mut engine = parser.engine(0);
        for token in tokens("()") {
            engine.offer(token).unwrap();
        }
        assert!(!engine.is_accepted());
        let result = engine.finish().unwrap();
        assert!(result.is_ok());
        assert_eq!(result.tree.unwrap().to_string(), "S['(' S[] ')']");
    }

    #[test]
    fn endless_reductions_abort_construction() {
        let g = Grammar::define(|g| {
            g.set_start("S")?;
            g.new_rule("S")?.add_term("S")?.add_term("A")?;
            g.new_rule("S")?.add_token("x")?;
            g.new_rule("A")?;
            Ok(())
        })
        .unwrap();

        let mut config = Config::new();
        config.normalize(false).on_conflict(OnConflict::PreferReduce);
        match Parser::with_config(&g, &config) {
            Err(BuildError::Table(TableError::GotoLoop { term, .. })) => assert_eq!(term, "S"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn without_normalization() {
        let g = Grammar::define(|g| {
            g.set_start("E")?;
            g.new_rule("E")?.add_term("E")?.add_token("+")?.add_token("n")?;
            g.new_rule("E")?.add_token("n")?;
            Ok(())
        })
        .unwrap();

        let mut config = Config::new();
        config.normalize(false);
        let parser = Parser::with_config(&g, &config).unwrap();
        assert_eq!(parser.grammar().find_term("E_tail"), None);

        let result = parser.parse(tokens("n+n"), 0).unwrap();
        assert_eq!(result.tree.unwrap().to_string(), "E[E['n'] '+' 'n']");
    }
}
