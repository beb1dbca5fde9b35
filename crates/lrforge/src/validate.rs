//! Read-only checks over a grammar definition.

use crate::{
    grammar::{Grammar, Item, TermID},
    types::{Map, Set},
};

/// Check the grammar and return human readable diagnostics.
///
/// Validation never fails and never modifies the grammar. An empty result
/// means that the grammar has a start term, contains no duplicated terms or
/// rules and every symbol is reachable from the start term.
pub fn validate(g: &Grammar) -> Vec<String> {
    let mut diagnostics = vec![];

    if g.is_empty() {
        diagnostics.push("The grammar is empty".to_owned());
        return diagnostics;
    }

    let start = match g.start() {
        Some(start) if g.contains_item(Item::Term(start)) => Some(start),
        Some(..) => {
            diagnostics.push("The start term is not a member of the grammar".to_owned());
            None
        }
        None => {
            diagnostics.push("The start term is not specified".to_owned());
            None
        }
    };

    if let Some(error) = g.error() {
        if !g.contains_item(Item::Token(error)) {
            diagnostics.push("The error token is not a member of the grammar".to_owned());
        }
    }

    let mut names: Map<&str, usize> = Map::default();
    for term in g.terms() {
        *names.entry(term.name()).or_default() += 1;
    }
    for (name, count) in names {
        if count > 1 {
            diagnostics.push(format!("The term `{}' is defined {} times", name, count));
        }
    }

    for term in g.terms() {
        let rules = term.rules();
        if rules.is_empty() {
            tracing::warn!("The term `{}' has no associated rule", term.name());
        }
        for (i, &rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|&prev| g.same_rule(prev, rule)) {
                diagnostics.push(format!(
                    "Duplicate rule detected: `{}'",
                    g[rule].display(g)
                ));
            }
            if g[rule].is_nonproductive() {
                diagnostics.push(format!(
                    "Nonproductive rule detected: `{}'",
                    g[rule].display(g)
                ));
            }
        }
    }

    if let Some(start) = start {
        let touched = reachable_items(g, start);
        for term in g.terms() {
            if !touched.contains(&Item::Term(term.id())) {
                diagnostics.push(format!("The term `{}' is unreachable", term.name()));
            }
        }
        for token in g.tokens() {
            if Some(token.id()) != g.error() && !touched.contains(&Item::Token(token.id())) {
                diagnostics.push(format!("The token `{}' is unreachable", token.name()));
            }
        }
        for prompt in g.prompts() {
            if !touched.contains(&Item::Prompt(prompt.id())) {
                diagnostics.push(format!("The prompt `{}' is unreachable", prompt.name()));
            }
        }
    }

    for diagnostic in &diagnostics {
        tracing::debug!("validation: {}", diagnostic);
    }

    diagnostics
}

/// Depth-first touch over the rules reachable from `start`.
pub(crate) fn reachable_items(g: &Grammar, start: TermID) -> Set<Item> {
    let mut touched = Set::default();
    touched.insert(Item::Term(start));
    let mut stack = vec![start];
    while let Some(term) = stack.pop() {
        for rule in g.rules_of(term) {
            for &item in rule.items() {
                if touched.insert(item) {
                    if let Item::Term(t) = item {
                        stack.push(t);
                    }
                }
            }
        }
    }
    touched
}
