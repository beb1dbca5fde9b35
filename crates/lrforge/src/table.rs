//! Calculation of the parse table with conflict resolution.

use crate::{
    grammar::{AugmentedGrammar, Grammar, Item, RuleID, TokenID},
    lr1::{StateID, StateMachine, Transition},
    types::{Map, Set},
    util::display_fn,
};
use std::fmt;

/// The action that the automaton in a state performs on a particular item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Read the lookahead token and transition to the specified state.
    Shift(StateID),

    /// Reduce to the specified production rule.
    Reduce(RuleID),

    /// Transition to the specified state after a reduction.
    Goto(StateID),

    Accept,

    /// Reject the lookahead token with the given message.
    ///
    /// Only inserted by conflict resolution with [`OnConflict::Reject`].
    Error(String),
}

impl Action {
    pub fn is_shift(&self) -> bool {
        matches!(self, Self::Shift(..))
    }

    pub fn is_reduce(&self) -> bool {
        matches!(self, Self::Reduce(..))
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| match self {
            Self::Shift(n) => write!(f, "shift({})", n),
            Self::Reduce(rule) => write!(f, "reduce({})", g[*rule].display(g)),
            Self::Goto(n) => write!(f, "goto({})", n),
            Self::Accept => f.write_str("accept"),
            Self::Error(message) => write!(f, "error({:?})", message),
        })
    }
}

/// The policy applied when two actions compete for the same table cell.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum OnConflict {
    /// Fail the table construction.
    #[default]
    Panic,
    /// Keep the action written first.
    UseFirst,
    /// Keep the action written last.
    UseLast,
    /// Choose the shift action if there is one.
    PreferShift,
    /// Choose the reduce action if there is one.
    PreferReduce,
    /// Replace both actions with an error action.
    Reject,
}

/// Two actions competing for the cell `(state, item)`.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub state: StateID,
    pub item: Item,
    pub prior: Action,
    pub new: Action,
}

impl Conflict {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            write!(
                f,
                "conflict in state {} on {}: {} vs {}",
                self.state,
                g.display_item(self.item),
                self.prior.display(g),
                self.new.display(g)
            )
        })
    }
}

impl OnConflict {
    /// Return the action that occupies the cell after the conflict.
    pub fn resolve(&self, g: &Grammar, conflict: Conflict) -> Result<Action, TableError> {
        let Conflict {
            state,
            item,
            prior,
            new,
        } = conflict;
        match self {
            Self::Panic => Err(TableError::Conflict {
                state,
                item: g.display_item(item).to_string(),
                prior: prior.display(g).to_string(),
                new: new.display(g).to_string(),
            }),
            Self::UseFirst => Ok(prior),
            Self::UseLast => Ok(new),
            Self::PreferShift if new.is_shift() && !prior.is_shift() => Ok(new),
            Self::PreferReduce if new.is_reduce() && !prior.is_reduce() => Ok(new),
            Self::PreferShift | Self::PreferReduce => Ok(prior),
            Self::Reject => {
                let conflict = Conflict {
                    state,
                    item,
                    prior,
                    new,
                };
                let message = conflict.display(g).to_string();
                Ok(Action::Error(message))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("conflicting actions in state {state} on {item}: {prior} vs {new}")]
    Conflict {
        state: StateID,
        item: String,
        prior: String,
        new: String,
    },

    #[error("infinite goto loop on `{term}' through states {}", join_states(.states))]
    GotoLoop { term: String, states: Vec<StateID> },
}

fn join_states(states: &[StateID]) -> String {
    states
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The sparse `(state, item) -> action` table.
#[derive(Debug, Clone)]
pub struct ParseTable {
    rows: Map<StateID, Map<Item, Action>>,
    eof: TokenID,
}

impl ParseTable {
    pub fn generate(
        g: &AugmentedGrammar,
        machine: &StateMachine,
        on_conflict: &OnConflict,
    ) -> Result<Self, TableError> {
        let mut table = Self {
            rows: Map::default(),
            eof: g.eof(),
        };
        let mut conflicts = 0;

        for state in machine.states() {
            let id = state.id();
            table.rows.entry(id).or_default();

            if state.is_accept() {
                conflicts += table.write(g, on_conflict, id, Item::Token(g.eof()), Action::Accept)?;
            }

            for (core, lookahead) in state.fragments() {
                if !core.is_end(g) {
                    continue;
                }
                for token in lookahead.iter() {
                    conflicts += table.write(
                        g,
                        on_conflict,
                        id,
                        Item::Token(token),
                        Action::Reduce(core.rule()),
                    )?;
                }
            }

            for transition in state.transitions() {
                let (item, action) = match *transition {
                    Transition::Shift(token, target) => (Item::Token(token), Action::Shift(target)),
                    Transition::Goto(term, target) => (Item::Term(term), Action::Goto(target)),
                };
                conflicts += table.write(g, on_conflict, id, item, action)?;
            }
        }

        table.check_goto_loops(g)?;

        tracing::debug!(
            "generated parse table: {} states, {} entries, {} conflicts resolved",
            table.rows.len(),
            table.len(),
            conflicts
        );
        Ok(table)
    }

    /// Write an action into a cell, returning the number of resolved conflicts.
    fn write(
        &mut self,
        g: &Grammar,
        on_conflict: &OnConflict,
        state: StateID,
        item: Item,
        action: Action,
    ) -> Result<usize, TableError> {
        let row = self.rows.entry(state).or_default();
        let prior = match row.get(&item) {
            None => {
                row.insert(item, action);
                return Ok(0);
            }
            Some(prior) if *prior == action => return Ok(0),
            Some(prior) => prior.clone(),
        };

        let conflict = Conflict {
            state,
            item,
            prior,
            new: action,
        };
        tracing::debug!("{}", conflict.display(g));
        let resolved = on_conflict.resolve(g, conflict)?;
        row.insert(item, resolved);
        Ok(1)
    }

    /// Detect reductions that return to a state without consuming input.
    ///
    /// For every `Goto(s, T) = t` and every token, the reductions the runner
    /// performs on that lookahead are replayed on the stack `[s, t]`. Seeing
    /// the same stack twice, or a stack that keeps growing, is an endless
    /// loop.
    fn check_goto_loops(&self, g: &Grammar) -> Result<(), TableError> {
        let tokens: Set<TokenID> = self
            .rows
            .values()
            .flat_map(|row| row.keys())
            .filter_map(|item| match item {
                Item::Token(token) => Some(*token),
                _ => None,
            })
            .collect();

        for (&origin, row) in &self.rows {
            for (&item, action) in row {
                let (Item::Term(term), Action::Goto(target)) = (item, action) else {
                    continue;
                };
                for &token in &tokens {
                    if let Some(states) = self.replay_reductions(g, origin, *target, token) {
                        tracing::debug!(
                            "goto loop on {}: {}",
                            g.display_item(Item::Token(token)),
                            join_states(&states)
                        );
                        return Err(TableError::GotoLoop {
                            term: g[term].name().to_owned(),
                            states,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Run the reductions on `token` from the stack `[origin, target]`.
    ///
    /// Returns the states entered by the gotos if the reductions never stop.
    /// Reductions that pop `origin` itself depend on the states below it and
    /// are covered by the replay from those states.
    fn replay_reductions(
        &self,
        g: &Grammar,
        origin: StateID,
        target: StateID,
        token: TokenID,
    ) -> Option<Vec<StateID>> {
        let limit = self.rows.len() + 2;
        let mut stack = vec![origin, target];
        let mut seen: Set<Vec<StateID>> = Set::default();
        let mut entered = vec![target];
        loop {
            if !seen.insert(stack.clone()) || stack.len() > limit {
                return Some(entered);
            }
            let top = *stack.last()?;
            let Some(Action::Reduce(rule)) = self.action(top, Item::Token(token)) else {
                return None;
            };
            let rule = &g[*rule];
            let arity = rule.basic_items().count();
            if arity >= stack.len() {
                return None;
            }
            stack.truncate(stack.len() - arity);
            let exposed = *stack.last()?;
            let Some(Action::Goto(next)) = self.action(exposed, Item::Term(rule.term())) else {
                return None;
            };
            stack.push(*next);
            entered.push(*next);
        }
    }

    pub fn action(&self, state: StateID, item: Item) -> Option<&Action> {
        self.rows.get(&state)?.get(&item)
    }

    /// The entries of a state, in the order they were written.
    pub fn row(&self, state: StateID) -> impl Iterator<Item = (Item, &Action)> + '_ {
        self.rows
            .get(&state)
            .into_iter()
            .flat_map(|row| row.iter().map(|(item, action)| (*item, action)))
    }

    /// The tokens that have a non-error action in the state.
    pub fn expected_tokens(&self, state: StateID) -> Vec<TokenID> {
        self.row(state)
            .filter_map(|(item, action)| match (item, action) {
                (_, Action::Error(..)) => None,
                (Item::Token(token), _) => Some(token),
                _ => None,
            })
            .collect()
    }

    pub fn eof(&self) -> TokenID {
        self.eof
    }

    /// The number of the filled cells.
    pub fn len(&self) -> usize {
        self.rows.values().map(|row| row.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            for (i, (id, row)) in self.rows.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "#### State {}", id)?;
                for (item, action) in row {
                    writeln!(f, "- {} => {}", g.display_item(*item), action.display(g))?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::init_tracing;

    fn dangling_else() -> AugmentedGrammar {
        Grammar::define(|g| {
            g.set_start("S")?;
            g.new_rule("S")?.add_token("i")?.add_term("S")?;
            g.new_rule("S")?
                .add_token("i")?
                .add_term("S")?
                .add_token("e")?
                .add_term("S")?;
            g.new_rule("S")?.add_token("x")?;
            Ok(())
        })
        .unwrap()
        .augment()
        .unwrap()
    }

    fn generate(g: &AugmentedGrammar, on_conflict: OnConflict) -> Result<ParseTable, TableError> {
        init_tracing();
        let machine = StateMachine::build(g);
        ParseTable::generate(g, &machine, &on_conflict)
    }

    #[test]
    fn parens_table() {
        let g = Grammar::define(|g| {
            g.set_start("S")?;
            g.new_rule("S")?
                .add_token("(")?
                .add_term("S")?
                .add_token(")")?;
            g.new_rule("S")?;
            Ok(())
        })
        .unwrap()
        .augment()
        .unwrap();
        let table = generate(&g, OnConflict::Panic).unwrap();
        let open = g.find_token("(").unwrap();
        let s = g.find_term("S").unwrap();
        let empty = g.rules_of(s).nth(1).unwrap().id();

        assert_eq!(
            table.action(StateID::START, Item::Token(open)),
            Some(&Action::Shift(StateID::new(1)))
        );
        assert_eq!(
            table.action(StateID::START, Item::Token(g.eof())),
            Some(&Action::Reduce(empty))
        );
        assert!(matches!(
            table.action(StateID::START, Item::Term(s)),
            Some(Action::Goto(..))
        ));
        assert_eq!(table.expected_tokens(StateID::START), [g.eof(), open]);
        assert!(table
            .row(StateID::new(2))
            .any(|(item, action)| item == Item::Token(g.eof()) && *action == Action::Accept));
    }

    #[test]
    fn panic_on_conflict() {
        let g = dangling_else();
        match generate(&g, OnConflict::Panic) {
            Err(TableError::Conflict {
                item, prior, new, ..
            }) => {
                assert_eq!(item, "'e'");
                assert_eq!(prior, "reduce(S := 'i' S)");
                assert!(new.starts_with("shift("), "{}", new);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn conflict_policies() {
        let g = dangling_else();
        let machine = StateMachine::build(&g);
        let e = g.find_token("e").unwrap();

        // the states that read `e` and may also reduce on it.
        let conflicted: Vec<StateID> = machine
            .states()
            .iter()
            .filter(|state| {
                state
                    .transitions()
                    .iter()
                    .any(|t| matches!(t, Transition::Shift(token, _) if *token == e))
                    && state
                        .fragments()
                        .any(|(core, lookahead)| core.is_end(&g) && lookahead.contains(e))
            })
            .map(|state| state.id())
            .collect();
        assert!(!conflicted.is_empty());

        let cells = |on_conflict: OnConflict| -> (ParseTable, Vec<Action>) {
            let table = ParseTable::generate(&g, &machine, &on_conflict).unwrap();
            let cells = conflicted
                .iter()
                .filter_map(|&state| table.action(state, Item::Token(e)).cloned())
                .collect();
            (table, cells)
        };

        assert!(cells(OnConflict::PreferShift).1.iter().all(Action::is_shift));
        assert!(cells(OnConflict::UseLast).1.iter().all(Action::is_shift));
        assert!(cells(OnConflict::PreferReduce).1.iter().all(Action::is_reduce));
        assert!(cells(OnConflict::UseFirst).1.iter().all(Action::is_reduce));

        let (table, rejected) = cells(OnConflict::Reject);
        assert!(rejected.iter().all(|action| matches!(
            action,
            Action::Error(message) if message.starts_with("conflict in state ")
        )));
        for &state in &conflicted {
            assert!(!table.expected_tokens(state).contains(&e));
        }
    }

    #[test]
    fn goto_loop() {
        // A and B derive each other through unit rules.
        let g = Grammar::define(|g| {
            g.set_start("S")?;
            g.new_rule("S")?.add_term("A")?;
            g.new_rule("A")?.add_term("B")?;
            g.new_rule("A")?.add_token("x")?;
            g.new_rule("B")?.add_term("A")?;
            g.new_rule("B")?.add_token("y")?;
            Ok(())
        })
        .unwrap()
        .augment()
        .unwrap();

        assert!(matches!(
            generate(&g, OnConflict::UseLast),
            Err(TableError::GotoLoop { .. })
        ));
    }

    #[test]
    fn goto_loop_through_nullable_suffix() {
        // After `S`, reducing `A := ε` and then `S := S A` returns to the
        // same state on the same lookahead.
        let g = Grammar::define(|g| {
            g.set_start("S")?;
            g.new_rule("S")?.add_term("S")?.add_term("A")?;
            g.new_rule("S")?.add_token("x")?;
            g.new_rule("A")?;
            Ok(())
        })
        .unwrap()
        .augment()
        .unwrap();

        match generate(&g, OnConflict::PreferReduce) {
            Err(TableError::GotoLoop { term, states }) => {
                assert_eq!(term, "S");
                assert!(states.len() >= 3, "{:?}", states);
                assert_eq!(states.first(), states.last());
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // Accepting instead of reducing leaves no loop behind.
        assert!(generate(&g, OnConflict::UseFirst).is_ok());
    }

    #[test]
    fn reductions_match_lookaheads() {
        let g = dangling_else();
        let machine = StateMachine::build(&g);
        let table = ParseTable::generate(&g, &machine, &OnConflict::PreferShift).unwrap();
        for state in machine.states() {
            for (item, action) in table.row(state.id()) {
                let (Item::Token(token), Action::Reduce(rule)) = (item, action) else {
                    continue;
                };
                assert!(state.fragments().any(|(core, lookahead)| {
                    core.rule() == *rule && core.is_end(&g) && lookahead.contains(token)
                }));
            }
        }
    }
}
