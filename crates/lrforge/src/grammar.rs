//! Grammar types.

use crate::{types::Map, util::display_fn};
use std::{cmp::Ordering, fmt, ops::Deref, ops::Index};

pub use lrforge_runtime::ItemKind;

/// The name of the synthetic start term added by [`Grammar::augment`].
pub const START_TERM: &str = "$StartTerm";

/// The name of the synthetic end-of-input token added by [`Grammar::augment`].
pub const EOF_TOKEN: &str = "$EOFToken";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TermID {
    raw: u32,
}
impl TermID {
    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TokenID {
    raw: u32,
}
impl TokenID {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn into_raw(self) -> u32 {
        self.raw
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PromptID {
    raw: u32,
}
impl PromptID {
    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RuleID {
    raw: u32,
}
impl RuleID {
    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }
}

/// A symbol that may appear on the right-hand side of a rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Item {
    Term(TermID),
    Token(TokenID),
    Prompt(PromptID),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Term(..) => ItemKind::Term,
            Self::Token(..) => ItemKind::Token,
            Self::Prompt(..) => ItemKind::Prompt,
        }
    }

    /// Whether this item occupies a slot on the parse stack, i.e. is not a prompt.
    pub fn is_basic(&self) -> bool {
        !matches!(self, Self::Prompt(..))
    }
}

/// A nonterminal symbol.
#[derive(Debug, Clone)]
pub struct Term {
    id: TermID,
    name: String,
    rules: Vec<RuleID>,
}
impl Term {
    pub fn id(&self) -> TermID {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn rules(&self) -> &[RuleID] {
        &self.rules
    }
}

/// A terminal symbol.
#[derive(Debug, Clone)]
pub struct TokenItem {
    id: TokenID,
    name: String,
}
impl TokenItem {
    pub fn id(&self) -> TokenID {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A zero-width marker carried into the parse tree.
#[derive(Debug, Clone)]
pub struct Prompt {
    id: PromptID,
    name: String,
}
impl Prompt {
    pub fn id(&self) -> PromptID {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The type that represents a production rule in grammar.
#[derive(Debug, Clone)]
pub struct Rule {
    id: RuleID,
    term: TermID,
    items: Vec<Item>,
}
impl Rule {
    pub fn id(&self) -> RuleID {
        self.id
    }

    /// Return the left-hand side of this production.
    pub fn term(&self) -> TermID {
        self.term
    }

    /// Return the right-hand side of this production, prompts included.
    pub fn items(&self) -> &[Item] {
        &self.items[..]
    }

    /// Return the right-hand side without prompts.
    pub fn basic_items(&self) -> impl Iterator<Item = Item> + '_ {
        self.items.iter().copied().filter(Item::is_basic)
    }

    pub fn is_lambda(&self) -> bool {
        self.basic_items().next().is_none()
    }

    pub fn is_directly_recursive(&self) -> bool {
        self.items.contains(&Item::Term(self.term))
    }

    /// Whether this rule is `T := T`, which derives nothing new.
    pub fn is_nonproductive(&self) -> bool {
        let mut basic = self.basic_items();
        matches!((basic.next(), basic.next()), (Some(Item::Term(t)), None) if t == self.term)
    }

    // `"LHS := R1 R2 R3"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} :=", g[self.term].name())?;
            if self.items.is_empty() {
                return f.write_str(" ε");
            }
            for item in &self.items {
                write!(f, " {}", g.display_item(*item))?;
            }
            Ok(())
        })
    }
}

/// The grammar definition used to derive the parser tables.
///
/// Symbols are interned by name: asking twice for the same term, token or
/// prompt returns the same ID. Cloning a grammar produces a fully
/// independent copy.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    terms: Map<TermID, Term>,
    tokens: Map<TokenID, TokenItem>,
    prompts: Map<PromptID, Prompt>,
    rules: Map<RuleID, Rule>,
    term_names: Map<String, TermID>,
    token_names: Map<String, TokenID>,
    prompt_names: Map<String, PromptID>,
    start: Option<TermID>,
    error: Option<TokenID>,
    next_term_id: u32,
    next_token_id: u32,
    next_prompt_id: u32,
    next_rule_id: u32,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a grammar using the specified function.
    pub fn define<F>(f: F) -> Result<Self, GrammarError>
    where
        F: FnOnce(&mut Grammar) -> Result<(), GrammarError>,
    {
        let mut g = Grammar::new();
        f(&mut g)?;
        Ok(g)
    }

    /// Get or create the term with the specified name.
    pub fn term(&mut self, name: &str) -> Result<TermID, GrammarError> {
        let name = verify_name(name)?;
        Ok(self.intern_term(name))
    }

    /// Get or create the token with the specified name.
    pub fn token(&mut self, name: &str) -> Result<TokenID, GrammarError> {
        let name = verify_name(name)?;
        Ok(self.intern_token(name))
    }

    /// Get or create the prompt with the specified name.
    pub fn prompt(&mut self, name: &str) -> Result<PromptID, GrammarError> {
        let name = verify_name(name)?;
        let next_id = &mut self.next_prompt_id;
        let prompts = &mut self.prompts;
        let id = *self
            .prompt_names
            .entry(name.to_owned())
            .or_insert_with(|| {
                let id = PromptID::new(*next_id);
                *next_id += 1;
                prompts.insert(
                    id,
                    Prompt {
                        id,
                        name: name.to_owned(),
                    },
                );
                id
            });
        Ok(id)
    }

    /// Start a new rule for the specified term, creating the term if needed.
    ///
    /// The rule is a lambda rule until items are appended. If appending an
    /// item fails, the rule is removed from the grammar.
    pub fn new_rule(&mut self, term: &str) -> Result<RuleBuilder<'_>, GrammarError> {
        let term = self.term(term)?;
        let rule = self.push_rule(term, vec![]);
        Ok(RuleBuilder {
            grammar: self,
            rule,
        })
    }

    /// Specify the start term, creating it if needed.
    pub fn set_start(&mut self, name: &str) -> Result<TermID, GrammarError> {
        let id = self.term(name)?;
        self.start.replace(id);
        Ok(id)
    }

    /// Specify the error token, creating it if needed.
    pub fn set_error(&mut self, name: &str) -> Result<TokenID, GrammarError> {
        let id = self.token(name)?;
        self.error.replace(id);
        Ok(id)
    }

    pub fn start(&self) -> Option<TermID> {
        self.start
    }

    pub fn error(&self) -> Option<TokenID> {
        self.error
    }

    pub fn find_term(&self, name: &str) -> Option<TermID> {
        self.term_names.get(name.trim()).copied()
    }

    pub fn find_token(&self, name: &str) -> Option<TokenID> {
        self.token_names.get(name.trim()).copied()
    }

    pub fn find_prompt(&self, name: &str) -> Option<PromptID> {
        self.prompt_names.get(name.trim()).copied()
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> + '_ {
        self.terms.values()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenItem> + '_ {
        self.tokens.values()
    }

    pub fn prompts(&self) -> impl Iterator<Item = &Prompt> + '_ {
        self.prompts.values()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.values()
    }

    /// Iterate over the rules of `term` in definition order.
    pub fn rules_of(&self, term: TermID) -> impl Iterator<Item = &Rule> + '_ {
        self.terms
            .get(&term)
            .map(|term| &term.rules[..])
            .unwrap_or(&[])
            .iter()
            .map(move |rule| &self.rules[rule])
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains_item(&self, item: Item) -> bool {
        match item {
            Item::Term(t) => self.terms.contains_key(&t),
            Item::Token(t) => self.tokens.contains_key(&t),
            Item::Prompt(p) => self.prompts.contains_key(&p),
        }
    }

    pub(crate) fn term_at(&self, index: usize) -> Option<&Term> {
        self.terms.get_index(index).map(|(_, term)| term)
    }

    pub(crate) fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn item_name(&self, item: Item) -> &str {
        match item {
            Item::Term(t) => self[t].name(),
            Item::Token(t) => self[t].name(),
            Item::Prompt(p) => self[p].name(),
        }
    }

    pub fn display_item(&self, item: Item) -> impl fmt::Display + '_ {
        display_fn(move |f| match item {
            Item::Term(t) => f.write_str(self[t].name()),
            Item::Token(t) => write!(f, "'{}'", self[t].name()),
            Item::Prompt(p) => write!(f, "@{}", self[p].name()),
        })
    }

    /// The total order of items: terms before tokens before prompts, then
    /// by name.
    pub fn cmp_items(&self, a: Item, b: Item) -> Ordering {
        fn rank(item: Item) -> u8 {
            match item {
                Item::Term(..) => 0,
                Item::Token(..) => 1,
                Item::Prompt(..) => 2,
            }
        }
        rank(a)
            .cmp(&rank(b))
            .then_with(|| self.item_name(a).cmp(self.item_name(b)))
    }

    /// Whether two rules have the same term and the same item sequence.
    pub fn same_rule(&self, a: RuleID, b: RuleID) -> bool {
        let (a, b) = (&self.rules[&a], &self.rules[&b]);
        a.term == b.term && a.items == b.items
    }

    /// Return a copy of this grammar extended with `$StartTerm := <start> $EOFToken`.
    pub fn augment(&self) -> Result<AugmentedGrammar, GrammarError> {
        let start = self.start.ok_or(GrammarError::MissingStart)?;
        if !self.terms.contains_key(&start) {
            return Err(GrammarError::MissingStart);
        }
        if self.find_term(START_TERM).is_some() || self.find_token(EOF_TOKEN).is_some() {
            return Err(GrammarError::AlreadyAugmented);
        }

        let mut grammar = self.clone();
        let start_term = grammar.intern_term(START_TERM);
        let eof = grammar.intern_token(EOF_TOKEN);
        let start_rule = grammar.push_rule(start_term, vec![Item::Term(start), Item::Token(eof)]);
        grammar.start.replace(start_term);

        Ok(AugmentedGrammar {
            grammar,
            start_term,
            start_rule,
            eof,
        })
    }

    // ---- editing operations used by the normalizer ----

    fn intern_term(&mut self, name: &str) -> TermID {
        let next_id = &mut self.next_term_id;
        let terms = &mut self.terms;
        *self.term_names.entry(name.to_owned()).or_insert_with(|| {
            let id = TermID::new(*next_id);
            *next_id += 1;
            terms.insert(
                id,
                Term {
                    id,
                    name: name.to_owned(),
                    rules: vec![],
                },
            );
            id
        })
    }

    fn intern_token(&mut self, name: &str) -> TokenID {
        let next_id = &mut self.next_token_id;
        let tokens = &mut self.tokens;
        *self.token_names.entry(name.to_owned()).or_insert_with(|| {
            let id = TokenID::from_raw(*next_id);
            *next_id += 1;
            tokens.insert(
                id,
                TokenItem {
                    id,
                    name: name.to_owned(),
                },
            );
            id
        })
    }

    /// Create a term named after `base` that does not collide with any
    /// existing term.
    pub(crate) fn fresh_term(&mut self, base: &str) -> TermID {
        let mut name = format!("{}_tail", base);
        let mut n = 2;
        while self.term_names.contains_key(&name) {
            name = format!("{}_tail{}", base, n);
            n += 1;
        }
        self.intern_term(&name)
    }

    pub(crate) fn push_rule(&mut self, term: TermID, items: Vec<Item>) -> RuleID {
        let id = RuleID::new(self.next_rule_id);
        self.next_rule_id += 1;
        self.rules.insert(id, Rule { id, term, items });
        if let Some(term) = self.terms.get_mut(&term) {
            term.rules.push(id);
        }
        id
    }

    pub(crate) fn remove_rule(&mut self, id: RuleID) {
        if let Some(rule) = self.rules.shift_remove(&id) {
            if let Some(term) = self.terms.get_mut(&rule.term) {
                term.rules.retain(|r| *r != id);
            }
        }
    }

    /// Replace every rule of `term` with the given right-hand sides.
    pub(crate) fn replace_rules(&mut self, term: TermID, rights: Vec<Vec<Item>>) {
        let old = self
            .terms
            .get(&term)
            .map(|t| t.rules.clone())
            .unwrap_or_default();
        for rule in old {
            self.remove_rule(rule);
        }
        for items in rights {
            self.push_rule(term, items);
        }
    }

    /// Rewrite every reference to `from` into a reference to `to`, then drop `from`.
    pub(crate) fn substitute_term(&mut self, from: TermID, to: TermID) {
        for rule in self.rules.values_mut() {
            for item in &mut rule.items {
                if *item == Item::Term(from) {
                    *item = Item::Term(to);
                }
            }
        }
        if self.start == Some(from) {
            self.start = Some(to);
        }
        self.remove_term(from);
    }

    pub(crate) fn remove_term(&mut self, id: TermID) {
        let Some(term) = self.terms.shift_remove(&id) else {
            return;
        };
        for rule in term.rules {
            self.rules.shift_remove(&rule);
        }
        self.term_names.shift_remove(&term.name);
        if self.start == Some(id) {
            self.start = None;
        }
    }

    pub(crate) fn remove_token(&mut self, id: TokenID) {
        if let Some(token) = self.tokens.shift_remove(&id) {
            self.token_names.shift_remove(&token.name);
        }
        if self.error == Some(id) {
            self.error = None;
        }
    }

    pub(crate) fn remove_prompt(&mut self, id: PromptID) {
        if let Some(prompt) = self.prompts.shift_remove(&id) {
            self.prompt_names.shift_remove(&prompt.name);
        }
    }
}

impl Index<TermID> for Grammar {
    type Output = Term;
    fn index(&self, id: TermID) -> &Term {
        &self.terms[&id]
    }
}

impl Index<TokenID> for Grammar {
    type Output = TokenItem;
    fn index(&self, id: TokenID) -> &TokenItem {
        &self.tokens[&id]
    }
}

impl Index<PromptID> for Grammar {
    type Output = Prompt;
    fn index(&self, id: PromptID) -> &Prompt {
        &self.prompts[&id]
    }
}

impl Index<RuleID> for Grammar {
    type Output = Rule;
    fn index(&self, id: RuleID) -> &Rule {
        &self.rules[&id]
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## terms:")?;
        for term in self.terms.values() {
            write!(f, "{}", term.name)?;
            if Some(term.id) == self.start {
                write!(f, " (start)")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## tokens:")?;
        for token in self.tokens.values() {
            write!(f, "'{}'", token.name)?;
            if Some(token.id) == self.error {
                write!(f, " (error)")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## prompts:")?;
        for prompt in self.prompts.values() {
            writeln!(f, "@{}", prompt.name)?;
        }

        writeln!(f, "\n## rules:")?;
        for term in self.terms.values() {
            for rule in &term.rules {
                writeln!(f, "{}", self.rules[rule].display(self))?;
            }
        }

        Ok(())
    }
}

/// Appends items to a rule created by [`Grammar::new_rule`].
#[derive(Debug)]
pub struct RuleBuilder<'g> {
    grammar: &'g mut Grammar,
    rule: RuleID,
}

impl RuleBuilder<'_> {
    pub fn id(&self) -> RuleID {
        self.rule
    }

    pub fn add_term(&mut self, name: &str) -> Result<&mut Self, GrammarError> {
        let id = self.discard_on_error(|g| g.term(name))?;
        self.push(Item::Term(id));
        Ok(self)
    }

    pub fn add_token(&mut self, name: &str) -> Result<&mut Self, GrammarError> {
        let id = self.discard_on_error(|g| g.token(name))?;
        self.push(Item::Token(id));
        Ok(self)
    }

    pub fn add_prompt(&mut self, name: &str) -> Result<&mut Self, GrammarError> {
        let id = self.discard_on_error(|g| g.prompt(name))?;
        self.push(Item::Prompt(id));
        Ok(self)
    }

    fn discard_on_error<T, F>(&mut self, f: F) -> Result<T, GrammarError>
    where
        F: FnOnce(&mut Grammar) -> Result<T, GrammarError>,
    {
        f(self.grammar).map_err(|err| {
            self.grammar.remove_rule(self.rule);
            err
        })
    }

    fn push(&mut self, item: Item) {
        if let Some(rule) = self.grammar.rules.get_mut(&self.rule) {
            rule.items.push(item);
        }
    }
}

/// A grammar extended with the synthetic start rule
/// `$StartTerm := <start> $EOFToken`.
#[derive(Debug, Clone)]
pub struct AugmentedGrammar {
    grammar: Grammar,
    start_term: TermID,
    start_rule: RuleID,
    eof: TokenID,
}

impl AugmentedGrammar {
    pub fn start_term(&self) -> TermID {
        self.start_term
    }
    pub fn start_rule(&self) -> RuleID {
        self.start_rule
    }
    pub fn eof(&self) -> TokenID {
        self.eof
    }
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }
}

impl Deref for AugmentedGrammar {
    type Target = Grammar;
    fn deref(&self) -> &Grammar {
        &self.grammar
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("invalid symbol name: {:?}", name)]
    InvalidName { name: String },

    #[error("the start term is not specified")]
    MissingStart,

    #[error("the grammar has already been augmented")]
    AlreadyAugmented,
}

fn verify_name(name: &str) -> Result<&str, GrammarError> {
    let trimmed = name.trim();
    // `$` is reserved for the symbols added by `augment`.
    if trimmed.is_empty() || trimmed.starts_with('$') {
        return Err(GrammarError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(trimmed)
}
