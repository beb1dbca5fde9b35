//! Utility types.

use crate::grammar::TokenID;
use std::{
    collections::VecDeque,
    hash::{Hash, Hasher},
};

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
pub type Set<T> = indexmap::IndexSet<T, BuildHasher>;

/// A set of tokens, used for first sets and lookaheads.
#[derive(Debug, Default, Clone)]
pub struct TokenSet {
    inner: bit_set::BitSet,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn contains(&self, id: TokenID) -> bool {
        self.inner.contains(id.into_raw() as usize)
    }
    pub fn insert(&mut self, id: TokenID) -> bool {
        self.inner.insert(id.into_raw() as usize)
    }
    /// Add the members of `other`, returning whether anything was added.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let before = self.inner.len();
        self.inner.union_with(&other.inner);
        self.inner.len() != before
    }
    pub fn is_superset(&self, other: &Self) -> bool {
        self.inner.is_superset(&other.inner)
    }
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
    pub fn len(&self) -> usize {
        self.inner.len()
    }
    pub fn iter(&self) -> impl Iterator<Item = TokenID> + '_ {
        self.inner.iter().map(|raw| TokenID::from_raw(raw as u32))
    }
}

// The equality must not depend on the capacity of the underlying bit vector.
impl PartialEq for TokenSet {
    fn eq(&self, other: &Self) -> bool {
        self.inner.iter().eq(other.inner.iter())
    }
}
impl Eq for TokenSet {}

impl Hash for TokenSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for raw in self.inner.iter() {
            raw.hash(state);
        }
    }
}

impl FromIterator<TokenID> for TokenSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = TokenID>,
    {
        Self {
            inner: iter.into_iter().map(|t| t.into_raw() as usize).collect(),
        }
    }
}

/// A FIFO queue that ignores values already waiting in it.
#[derive(Debug)]
pub struct Queue<T> {
    queue: VecDeque<T>,
    hash: Set<T>,
}
impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            hash: Set::default(),
        }
    }
}

impl<T> Queue<T>
where
    T: Clone + Eq + Hash,
{
    pub fn push(&mut self, value: T) {
        if self.hash.insert(value.clone()) {
            self.queue.push_back(value);
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let value = self.queue.pop_front()?;
        self.hash.swap_remove(&value);
        Some(value)
    }
}

impl<T> FromIterator<T> for Queue<T>
where
    T: Clone + Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::default();
        for value in iter {
            queue.push(value);
        }
        queue
    }
}
