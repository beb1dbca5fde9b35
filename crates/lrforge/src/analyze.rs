//! Calculation of first sets, nullable terms and left recursion.

use crate::{
    grammar::{Grammar, Item, TermID},
    types::{Map, TokenSet},
};
use bit_set::BitSet;
use std::collections::VecDeque;

/// The facts derived for a single term.
#[derive(Debug, Clone)]
struct TermGroup {
    term: TermID,
    has_lambda: bool,
    /// The first set of the term.
    tokens: TokenSet,
    /// Terms that a rule of this term begins with, possibly after a nullable prefix.
    children: BitSet,
    /// The transitive closure of `children`.
    dependents: BitSet,
    /// The inverse of `dependents`.
    ancestors: BitSet,
    dirty: bool,
}

/// The first sets, lambda flags and left recursion of every term in a grammar.
#[derive(Debug, Clone)]
pub struct Analyzer {
    groups: Vec<TermGroup>,
    index: Map<TermID, usize>,
    empty: TokenSet,
}

impl Analyzer {
    pub fn new(g: &Grammar) -> Self {
        let n = g.term_count();
        let groups = (0..n)
            .filter_map(|i| g.term_at(i))
            .map(|term| TermGroup {
                term: term.id(),
                has_lambda: false,
                tokens: TokenSet::new(),
                children: BitSet::with_capacity(n),
                dependents: BitSet::with_capacity(n),
                ancestors: BitSet::with_capacity(n),
                dirty: true,
            })
            .collect::<Vec<_>>();
        let index = groups
            .iter()
            .enumerate()
            .map(|(i, group)| (group.term, i))
            .collect();

        let mut analyzer = Self {
            groups,
            index,
            empty: TokenSet::new(),
        };

        // The sets only grow and the flags only flip from false to true, so
        // this reaches a fixed point.
        let mut passes = 0;
        loop {
            let dirty: Vec<usize> = (0..analyzer.groups.len())
                .filter(|&x| analyzer.groups[x].dirty)
                .collect();
            if dirty.is_empty() {
                break;
            }
            passes += 1;

            for x in dirty {
                analyzer.groups[x].dirty = false;
                if analyzer.update(g, x) {
                    let ancestors = analyzer.groups[x].ancestors.clone();
                    for a in ancestors.iter() {
                        analyzer.groups[a].dirty = true;
                    }
                }
            }
        }
        tracing::debug!(
            "analyzed {} terms in {} passes",
            analyzer.groups.len(),
            passes
        );

        analyzer
    }

    /// Walk the rules of the `x`-th term once, returning whether anything changed.
    fn update(&mut self, g: &Grammar, x: usize) -> bool {
        let mut changed = false;
        for rule in g.rules_of(self.groups[x].term) {
            let mut reached_end = true;
            for item in rule.basic_items() {
                match item {
                    Item::Token(t) => {
                        changed |= self.groups[x].tokens.insert(t);
                        reached_end = false;
                        break;
                    }
                    Item::Term(t) => {
                        let Some(&c) = self.index.get(&t) else {
                            reached_end = false;
                            break;
                        };
                        changed |= self.join(x, c);
                        if !self.groups[c].has_lambda {
                            reached_end = false;
                            break;
                        }
                    }
                    Item::Prompt(..) => (),
                }
            }
            if reached_end && !self.groups[x].has_lambda {
                tracing::trace!("`{}' is nullable", g[self.groups[x].term].name());
                self.groups[x].has_lambda = true;
                changed = true;
            }
        }
        changed
    }

    /// Record that the `p`-th term begins with the `c`-th term.
    fn join(&mut self, p: usize, c: usize) -> bool {
        let mut changed = false;

        if self.groups[p].children.insert(c) {
            let mut sources = self.groups[p].ancestors.clone();
            sources.insert(p);
            let mut targets = self.groups[c].dependents.clone();
            targets.insert(c);
            for s in sources.iter() {
                self.groups[s].dependents.union_with(&targets);
            }
            for t in targets.iter() {
                self.groups[t].ancestors.union_with(&sources);
            }
            changed = true;
        }

        if p != c {
            let tokens = self.groups[c].tokens.clone();
            changed |= self.groups[p].tokens.union_with(&tokens);
        }

        changed
    }

    fn group(&self, term: TermID) -> Option<&TermGroup> {
        self.index.get(&term).map(|&i| &self.groups[i])
    }

    /// Whether the term can derive the empty sequence.
    pub fn has_lambda(&self, term: TermID) -> bool {
        self.group(term).map_or(false, |g| g.has_lambda)
    }

    /// The set of tokens that can begin a derivation of the term.
    pub fn first_set(&self, term: TermID) -> &TokenSet {
        self.group(term).map_or(&self.empty, |g| &g.tokens)
    }

    /// Whether `term` can derive a sequence beginning with `other`.
    pub fn depends_on(&self, term: TermID, other: TermID) -> bool {
        match (self.group(term), self.index.get(&other)) {
            (Some(group), Some(&other)) => group.dependents.contains(other),
            _ => false,
        }
    }

    pub fn is_left_recursive(&self, term: TermID) -> bool {
        self.depends_on(term, term)
    }

    /// Return the first left-recursive cycle, in term definition order.
    ///
    /// The path `[A0, A1, ..., Ak]` means that a rule of each term begins
    /// with the next one and a rule of `Ak` begins with `A0`. The path is
    /// empty if the grammar has no left recursion.
    pub fn find_first_left_recursion(&self) -> Vec<TermID> {
        let Some(target) = (0..self.groups.len()).find(|&x| self.groups[x].dependents.contains(x))
        else {
            return vec![];
        };

        // Breadth-first search over `children`, back to the target.
        let mut parents: Map<usize, usize> = Map::default();
        let mut queue = VecDeque::new();
        queue.push_back(target);
        while let Some(x) = queue.pop_front() {
            if self.groups[x].children.contains(target) {
                let mut path = vec![self.groups[x].term];
                let mut cur = x;
                while cur != target {
                    cur = parents[&cur];
                    path.push(self.groups[cur].term);
                }
                path.reverse();
                return path;
            }
            for c in self.groups[x].children.iter() {
                if c != target && !parents.contains_key(&c) {
                    parents.insert(c, x);
                    queue.push_back(c);
                }
            }
        }

        // unreachable while `dependents` is the closure of `children`.
        vec![]
    }

    /// Add the first tokens of `item` to `tokens`, returning whether the
    /// item can derive the empty sequence.
    ///
    /// Prompts contribute nothing and report no lambda.
    pub fn firsts(&self, item: Item, tokens: &mut TokenSet) -> bool {
        match item {
            Item::Token(t) => {
                tokens.insert(t);
                false
            }
            Item::Term(t) => match self.group(t) {
                Some(group) => {
                    tokens.union_with(&group.tokens);
                    group.has_lambda
                }
                None => false,
            },
            Item::Prompt(..) => false,
        }
    }

    /// `First(items fallback)`, skipping prompts.
    pub fn firsts_of<I>(&self, items: I, fallback: &TokenSet) -> TokenSet
    where
        I: IntoIterator<Item = Item>,
    {
        let mut tokens = TokenSet::new();
        for item in items.into_iter().filter(Item::is_basic) {
            if !self.firsts(item, &mut tokens) {
                return tokens;
            }
        }
        tokens.union_with(fallback);
        tokens
    }
}
