//! The construction of canonical LR(1) automaton.

use crate::{
    analyze::Analyzer,
    grammar::{AugmentedGrammar, Grammar, Item, RuleID, TermID, TokenID},
    types::{Map, Queue, TokenSet},
    util::display_fn,
};
use std::{
    collections::{btree_map::Entry, BTreeMap, VecDeque},
    fmt,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateID {
    raw: u32,
}

impl StateID {
    pub const START: Self = Self::new(0);

    pub(crate) const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub const fn into_raw(self) -> u32 {
        self.raw
    }
}

impl fmt::Display for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.raw)
    }
}

/// A rule with a cursor position. The cursor counts basic items only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentCore {
    rule: RuleID,
    index: usize,
}

impl FragmentCore {
    pub fn rule(&self) -> RuleID {
        self.rule
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The basic item right after the cursor, if any.
    pub fn cursor(&self, g: &Grammar) -> Option<Item> {
        g[self.rule].basic_items().nth(self.index)
    }

    /// Whether the cursor has reached the end of the rule.
    pub fn is_end(&self, g: &Grammar) -> bool {
        self.cursor(g).is_none()
    }

    fn advance(&self) -> Self {
        Self {
            rule: self.rule,
            index: self.index + 1,
        }
    }

    // `"(X := a . b c)"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            let rule = &g[self.rule];
            write!(f, "({} :=", g[rule.term()].name())?;
            let mut basic = 0;
            for &item in rule.items() {
                if item.is_basic() {
                    if basic == self.index {
                        f.write_str(" .")?;
                    }
                    basic += 1;
                }
                write!(f, " {}", g.display_item(item))?;
            }
            if self.index >= basic {
                f.write_str(" .")?;
            }
            f.write_str(")")
        })
    }
}

//  - key: the rule and the cursor position
//  - value: the lookahead tokens of the fragment
type FragmentSet = BTreeMap<FragmentCore, TokenSet>;

/// An outgoing edge of a state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Read the token and move to the state.
    Shift(TokenID, StateID),
    /// Move to the state after a reduction to the term.
    Goto(TermID, StateID),
}

impl Transition {
    pub fn target(&self) -> StateID {
        match self {
            Self::Shift(_, target) | Self::Goto(_, target) => *target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct State {
    id: StateID,
    fragments: FragmentSet,
    transitions: Vec<Transition>,
    accept: bool,
}

impl State {
    pub fn id(&self) -> StateID {
        self.id
    }

    /// The closed fragment set of this state, in a stable order.
    pub fn fragments(&self) -> impl Iterator<Item = (&FragmentCore, &TokenSet)> + '_ {
        self.fragments.iter()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions[..]
    }

    /// Whether this state reads the end of input, i.e. accepts.
    pub fn is_accept(&self) -> bool {
        self.accept
    }
}

/// The states of the LR(1) automaton of an augmented grammar.
#[derive(Debug, Clone)]
pub struct StateMachine {
    states: Vec<State>,
}

impl StateMachine {
    pub fn build(g: &AugmentedGrammar) -> Self {
        let mut builder = Builder {
            grammar: g,
            analyzer: Analyzer::new(g),
            states: vec![],
            index: Map::default(),
            pending: VecDeque::new(),
        };

        let mut seed = FragmentSet::new();
        let eof: TokenSet = [g.eof()].into_iter().collect();
        for rule in g.rules_of(g.start_term()) {
            seed.insert(
                FragmentCore {
                    rule: rule.id(),
                    index: 0,
                },
                eof.clone(),
            );
        }
        builder.closure(&mut seed);
        builder.intern(seed);

        while let Some(id) = builder.pending.pop_front() {
            builder.extract_transitions(id);
        }

        tracing::debug!("built {} LR(1) states", builder.states.len());
        Self {
            states: builder.states,
        }
    }

    pub fn states(&self) -> &[State] {
        &self.states[..]
    }

    pub fn state(&self, id: StateID) -> Option<&State> {
        self.states.get(id.raw as usize)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            for (i, state) in self.states.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }

                writeln!(f, "#### State {}", state.id)?;
                writeln!(f, "## fragments")?;
                for (core, lookahead) in &state.fragments {
                    write!(f, "- {}  [", core.display(g))?;
                    for (i, token) in lookahead.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        f.write_str(g[token].name())?;
                    }
                    f.write_str("]\n")?;
                }

                writeln!(f, "## transitions")?;
                for transition in &state.transitions {
                    match transition {
                        Transition::Shift(token, target) => {
                            writeln!(f, "- '{}' => shift({})", g[*token].name(), target)?;
                        }
                        Transition::Goto(term, target) => {
                            writeln!(f, "- {} => goto({})", g[*term].name(), target)?;
                        }
                    }
                }
                if state.accept {
                    writeln!(f, "## accept")?;
                }
            }
            Ok(())
        })
    }
}

struct Builder<'g> {
    grammar: &'g AugmentedGrammar,
    analyzer: Analyzer,
    states: Vec<State>,
    index: Map<FragmentSet, StateID>,
    pending: VecDeque<StateID>,
}

impl Builder<'_> {
    /// Add the fragments predicted by the terms at the cursors, merging the
    /// lookaheads of the fragments that share a core.
    fn closure(&self, fragments: &mut FragmentSet) {
        let g = self.grammar;
        let mut queue: Queue<FragmentCore> = fragments.keys().copied().collect();
        while let Some(core) = queue.pop() {
            // [X -> ... @ Y beta, L]
            let mut rest = g[core.rule].basic_items().skip(core.index);
            let Some(Item::Term(y)) = rest.next() else {
                continue;
            };
            let Some(outer) = fragments.get(&core) else {
                continue;
            };
            // First(beta L)
            let lookahead = self.analyzer.firsts_of(rest, outer);

            for rule in g.rules_of(y) {
                let new_core = FragmentCore {
                    rule: rule.id(),
                    index: 0,
                };
                match fragments.entry(new_core) {
                    Entry::Vacant(entry) => {
                        entry.insert(lookahead.clone());
                        queue.push(new_core);
                    }
                    Entry::Occupied(mut entry) => {
                        if entry.get_mut().union_with(&lookahead) {
                            queue.push(new_core);
                        }
                    }
                }
            }
        }
    }

    /// Return the state with the given closed fragment set, allocating it if needed.
    fn intern(&mut self, fragments: FragmentSet) -> StateID {
        if let Some(&id) = self.index.get(&fragments) {
            return id;
        }
        let id = StateID::new(self.states.len() as u32);
        tracing::trace!("new state {} with {} fragments", id, fragments.len());
        self.index.insert(fragments.clone(), id);
        self.states.push(State {
            id,
            fragments,
            transitions: vec![],
            accept: false,
        });
        self.pending.push_back(id);
        id
    }

    fn extract_transitions(&mut self, id: StateID) {
        let g = self.grammar;
        let eof = Item::Token(g.eof());

        let mut accept = false;
        let mut successors: Map<Item, FragmentSet> = Map::default();
        for (core, lookahead) in &self.states[id.raw as usize].fragments {
            let Some(item) = core.cursor(g) else {
                continue;
            };
            if item == eof {
                accept = true;
                continue;
            }
            successors
                .entry(item)
                .or_default()
                .insert(core.advance(), lookahead.clone());
        }

        let mut transitions = Vec::with_capacity(successors.len());
        for (item, mut fragments) in successors {
            self.closure(&mut fragments);
            let target = self.intern(fragments);
            match item {
                Item::Token(token) => transitions.push(Transition::Shift(token, target)),
                Item::Term(term) => transitions.push(Transition::Goto(term, target)),
                Item::Prompt(..) => (),
            }
        }

        let state = &mut self.states[id.raw as usize];
        state.transitions = transitions;
        state.accept = accept;
    }
}
