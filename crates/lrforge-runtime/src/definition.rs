//! Parser definition.

use std::fmt;

/// The trait for abstracting the generated LR(1) parse table.
pub trait ParserDef {
    /// The number to identify the state of LR(1) automaton.
    type State: Copy + fmt::Debug;

    /// The handle of a production rule.
    type Rule: Copy + fmt::Debug;

    /// Return the initial state number.
    fn initial_state(&self) -> Self::State;

    /// Return the action corresponding to the specified state number and
    /// lookahead token, or `None` if the table has no entry for them.
    fn action(
        &self,
        current: Self::State,
        lookahead: Lookahead<'_>,
    ) -> Option<ParseAction<'_, Self::State, Self::Rule>>;

    /// Return the state reached from `current` after reducing `rule`.
    fn goto(&self, current: Self::State, rule: Self::Rule) -> Option<Self::State>;

    /// Return the shape of the specified production rule.
    fn production(&self, rule: Self::Rule) -> Production<'_>;

    /// Return the names of the tokens that have an entry in the given state.
    fn expected_tokens(&self, current: Self::State) -> Vec<&str>;
}

impl<T: ?Sized> ParserDef for &T
where
    T: ParserDef,
{
    type State = T::State;
    type Rule = T::Rule;

    fn initial_state(&self) -> Self::State {
        (**self).initial_state()
    }

    fn action(
        &self,
        current: Self::State,
        lookahead: Lookahead<'_>,
    ) -> Option<ParseAction<'_, Self::State, Self::Rule>> {
        (**self).action(current, lookahead)
    }

    fn goto(&self, current: Self::State, rule: Self::Rule) -> Option<Self::State> {
        (**self).goto(current, rule)
    }

    fn production(&self, rule: Self::Rule) -> Production<'_> {
        (**self).production(rule)
    }

    fn expected_tokens(&self, current: Self::State) -> Vec<&str> {
        (**self).expected_tokens(current)
    }
}

/// The lookahead symbol passed to [`ParserDef::action`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Lookahead<'a> {
    /// A token with the given name.
    Token(&'a str),
    /// The synthesized end of input.
    End,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParseAction<'a, TState, TRule> {
    Shift(TState),
    Reduce(TRule),
    Accept,
    Error(&'a str),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Term,
    Token,
    Prompt,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term => f.write_str("term"),
            Self::Token => f.write_str("token"),
            Self::Prompt => f.write_str("prompt"),
        }
    }
}

/// A borrowed view of one item on the right-hand side of a production.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ItemRef<'a> {
    pub kind: ItemKind,
    pub name: &'a str,
}

impl fmt::Display for ItemRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ItemKind::Term => f.write_str(self.name),
            ItemKind::Token => write!(f, "'{}'", self.name),
            ItemKind::Prompt => write!(f, "@{}", self.name),
        }
    }
}

/// A borrowed view of a production rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production<'a> {
    pub left: &'a str,
    pub right: Vec<ItemRef<'a>>,
}

impl Production<'_> {
    /// The number of stack entries consumed by reducing this production.
    pub fn arity(&self) -> usize {
        self.right
            .iter()
            .filter(|item| item.kind != ItemKind::Prompt)
            .count()
    }
}

// `"LHS := R1 R2 R3"`
impl fmt::Display for Production<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :=", self.left)?;
        if self.right.is_empty() {
            return f.write_str(" ε");
        }
        for item in &self.right {
            write!(f, " {}", item)?;
        }
        Ok(())
    }
}
