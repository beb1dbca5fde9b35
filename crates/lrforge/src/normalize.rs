//! Rewriting of grammars into a form suitable for LR(1) construction.

use crate::{
    analyze::Analyzer,
    grammar::{Grammar, Item, Rule, RuleID, TermID},
    parser::Config,
    validate::reachable_items,
};

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("left recursion could not be eliminated: {}", path.join(" -> "))]
    LeftRecursion { path: Vec<String> },
}

/// Removes degenerate rules, duplicated terms and left recursion.
#[derive(Debug)]
pub struct Normalizer {
    merge_duplicate_terms: bool,
}

impl Normalizer {
    pub fn new(config: &Config) -> Self {
        Self {
            merge_duplicate_terms: config.merge_duplicate_terms,
        }
    }

    /// Return a normalized copy of the grammar. The input is left untouched.
    pub fn normalize(&self, grammar: &Grammar) -> Result<Grammar, NormalizeError> {
        let mut g = grammar.clone();

        let removed = remove_nonproductive_rules(&mut g) + remove_duplicate_rules(&mut g);
        tracing::debug!("removed {} degenerate rules", removed);

        if self.merge_duplicate_terms {
            merge_duplicate_terms(&mut g);
        }

        eliminate_left_recursion(&mut g)?;

        // The tail terms introduced above may duplicate each other.
        if self.merge_duplicate_terms {
            merge_duplicate_terms(&mut g);
        }

        // Substitution may leave behind terms that nothing refers to.
        let removed = remove_unreachable_symbols(&mut g);
        tracing::debug!("removed {} unreachable symbols", removed);

        Ok(g)
    }
}

/// Remove the symbols that cannot be reached from the start term. The error
/// token is kept.
fn remove_unreachable_symbols(g: &mut Grammar) -> usize {
    let Some(start) = g.start() else {
        return 0;
    };
    let touched = reachable_items(g, start);

    let terms: Vec<TermID> = g
        .terms()
        .map(|t| t.id())
        .filter(|&t| !touched.contains(&Item::Term(t)))
        .collect();
    let tokens: Vec<_> = g
        .tokens()
        .map(|t| t.id())
        .filter(|&t| Some(t) != g.error() && !touched.contains(&Item::Token(t)))
        .collect();
    let prompts: Vec<_> = g
        .prompts()
        .map(|p| p.id())
        .filter(|&p| !touched.contains(&Item::Prompt(p)))
        .collect();

    for &term in &terms {
        tracing::trace!("remove unreachable term `{}'", g[term].name());
        g.remove_term(term);
    }
    for &token in &tokens {
        g.remove_token(token);
    }
    for &prompt in &prompts {
        g.remove_prompt(prompt);
    }
    terms.len() + tokens.len() + prompts.len()
}

/// Remove the rules of the form `T := T`.
fn remove_nonproductive_rules(g: &mut Grammar) -> usize {
    let targets: Vec<RuleID> = g
        .rules()
        .filter(|rule| rule.is_nonproductive())
        .map(Rule::id)
        .collect();
    for &rule in &targets {
        g.remove_rule(rule);
    }
    targets.len()
}

/// Remove the rules identical to an earlier rule of the same term.
fn remove_duplicate_rules(g: &mut Grammar) -> usize {
    let mut targets = vec![];
    for term in g.terms() {
        let rules = term.rules();
        for (i, &rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|&prev| g.same_rule(prev, rule)) {
                targets.push(rule);
            }
        }
    }
    for &rule in &targets {
        g.remove_rule(rule);
    }
    targets.len()
}

/// Whether `a` and `b` have the same rules once `b` is read as `a`.
fn is_duplicate_term(g: &Grammar, a: TermID, b: TermID) -> bool {
    let alias = |rule: &Rule| -> Vec<Item> {
        rule.items()
            .iter()
            .map(|&item| match item {
                Item::Term(t) if t == b => Item::Term(a),
                item => item,
            })
            .collect()
    };
    let left: Vec<Vec<Item>> = g.rules_of(a).map(alias).collect();
    let right: Vec<Vec<Item>> = g.rules_of(b).map(alias).collect();
    !left.is_empty() && left.len() == right.len() && left.iter().all(|r| right.contains(r))
}

fn merge_duplicate_terms(g: &mut Grammar) -> usize {
    let mut merged = 0;
    loop {
        let terms: Vec<TermID> = g.terms().map(|t| t.id()).collect();
        let found = terms.iter().enumerate().find_map(|(i, &a)| {
            terms[i + 1..]
                .iter()
                .find(|&&b| is_duplicate_term(g, a, b))
                .map(|&b| (a, b))
        });
        let Some((a, b)) = found else {
            break;
        };

        let (survivor, duplicate) = if g.start() == Some(b) { (b, a) } else { (a, b) };
        tracing::debug!(
            "merge `{}' into `{}'",
            g[duplicate].name(),
            g[survivor].name()
        );
        g.substitute_term(duplicate, survivor);
        remove_nonproductive_rules(g);
        remove_duplicate_rules(g);
        merged += 1;
    }
    merged
}

/// Whether a rule of `head` can derive a sequence beginning with `head`.
fn is_left_recursive_rule(analyzer: &Analyzer, rule: &Rule, head: TermID) -> bool {
    for item in rule.basic_items() {
        let Item::Term(t) = item else {
            return false;
        };
        if t == head || analyzer.depends_on(t, head) {
            return true;
        }
        if !analyzer.has_lambda(t) {
            return false;
        }
    }
    false
}

fn eliminate_left_recursion(g: &mut Grammar) -> Result<(), NormalizeError> {
    let limit = 8 * (g.term_count() + g.rules().count()).max(16);
    let mut rewrites = 0;

    loop {
        let analyzer = Analyzer::new(g);
        let path = analyzer.find_first_left_recursion();
        let Some(&head) = path.first() else {
            tracing::debug!("left recursion eliminated after {} rewrites", rewrites);
            return Ok(());
        };

        let path: Vec<String> = path.iter().map(|t| g[*t].name().to_owned()).collect();
        if rewrites >= limit {
            tracing::warn!("gave up eliminating left recursion: {}", path.join(" -> "));
            return Err(NormalizeError::LeftRecursion { path });
        }
        rewrites += 1;

        let has_direct = g
            .rules_of(head)
            .any(|rule| rule.basic_items().next() == Some(Item::Term(head)));
        if has_direct {
            if !split_direct_recursion(g, head) {
                tracing::warn!(
                    "the term `{}' has no alternative without left recursion",
                    g[head].name()
                );
                return Err(NormalizeError::LeftRecursion { path });
            }
        } else {
            substitute_leading_terms(g, &analyzer, head);
        }

        remove_nonproductive_rules(g);
        remove_duplicate_rules(g);
    }
}

/// Rewrite `A := A a1 | ... | b1 | ...` into
/// `A := b1 A_tail | ...` and `A_tail := a1 A_tail | ... | ε`.
///
/// Return `false` if every rule of `A` is directly left recursive.
fn split_direct_recursion(g: &mut Grammar, head: TermID) -> bool {
    let mut recursive = vec![];
    let mut others = vec![];
    for rule in g.rules_of(head) {
        let items = rule.items();
        match items.iter().position(Item::is_basic) {
            Some(pos) if items[pos] == Item::Term(head) => {
                // Prompts before the recursive term move to the head of the tail.
                let mut tail: Vec<Item> = items[..pos].to_vec();
                tail.extend_from_slice(&items[pos + 1..]);
                recursive.push(tail);
            }
            _ => others.push(items.to_vec()),
        }
    }
    if others.is_empty() {
        return false;
    }

    let name = g[head].name().to_owned();
    let tail = g.fresh_term(&name);
    tracing::debug!(
        "split {} left recursive rules of `{}' into `{}'",
        recursive.len(),
        name,
        g[tail].name()
    );

    let mut tail_rules: Vec<Vec<Item>> = recursive
        .into_iter()
        .map(|mut items| {
            items.push(Item::Term(tail));
            items
        })
        .collect();
    tail_rules.push(vec![]);
    g.replace_rules(tail, tail_rules);

    let head_rules = others
        .into_iter()
        .map(|mut items| {
            items.push(Item::Term(tail));
            items
        })
        .collect();
    g.replace_rules(head, head_rules);

    true
}

/// Expand the first basic item of every left recursive rule of `head` with
/// the rules of that item, shortening the recursion path by one step.
fn substitute_leading_terms(g: &mut Grammar, analyzer: &Analyzer, head: TermID) {
    let mut rights: Vec<Vec<Item>> = vec![];
    for rule in g.rules_of(head) {
        let items = rule.items();
        if !is_left_recursive_rule(analyzer, rule, head) {
            rights.push(items.to_vec());
            continue;
        }
        let Some(pos) = items.iter().position(Item::is_basic) else {
            rights.push(items.to_vec());
            continue;
        };
        let Item::Term(leading) = items[pos] else {
            rights.push(items.to_vec());
            continue;
        };
        tracing::trace!(
            "substitute `{}' in `{}'",
            g[leading].name(),
            rule.display(g)
        );
        for expansion in g.rules_of(leading) {
            let mut new_items = items[..pos].to_vec();
            new_items.extend_from_slice(expansion.items());
            new_items.extend_from_slice(&items[pos + 1..]);
            rights.push(new_items);
        }
    }
    g.replace_rules(head, rights);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{util::init_tracing, validate::validate};

    fn normalize(g: &Grammar) -> Result<Grammar, NormalizeError> {
        init_tracing();
        Normalizer::new(&Config::new()).normalize(g)
    }

    fn rules(g: &Grammar) -> Vec<String> {
        g.terms()
            .flat_map(|t| g.rules_of(t.id()))
            .map(|r| r.display(g).to_string())
            .collect()
    }

    #[test]
    fn removes_degenerate_rules() {
        let g = Grammar::define(|g| {
            g.set_start("S")?;
            g.new_rule("S")?.add_token("x")?;
            g.new_rule("S")?.add_term("S")?;
            g.new_rule("S")?.add_token("x")?;
            g.new_rule("S")?.add_token("x")?.add_prompt("p")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert_eq!(rules(&n), ["S := 'x'", "S := 'x' @p"]);
        // the input is untouched.
        assert_eq!(g.rules().count(), 4);
    }

    #[test]
    fn merges_duplicate_terms() {
        let g = Grammar::define(|g| {
            g.set_start("S")?;
            g.new_rule("S")?.add_term("A")?.add_token("+")?;
            g.new_rule("S")?.add_term("B")?.add_token("+")?;
            g.new_rule("A")?.add_token("x")?;
            g.new_rule("B")?.add_token("x")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert_eq!(n.find_term("B"), None);
        assert_eq!(rules(&n), ["S := A '+'", "A := 'x'"]);

        let mut config = Config::new();
        config.merge_duplicate_terms(false);
        let n = Normalizer::new(&config).normalize(&g).unwrap();
        assert_eq!(rules(&n), ["S := A '+'", "S := B '+'", "A := 'x'", "B := 'x'"]);
    }

    #[test]
    fn merge_keeps_start_term() {
        let g = Grammar::define(|g| {
            g.new_rule("A")?.add_token("x")?;
            g.new_rule("S")?.add_token("x")?;
            g.set_start("S")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert_eq!(n.find_term("A"), None);
        assert_eq!(n.start(), n.find_term("S"));
    }

    #[test]
    fn direct_left_recursion() {
        let g = Grammar::define(|g| {
            g.set_start("E")?;
            g.new_rule("E")?.add_term("E")?.add_token("+")?.add_token("n")?;
            g.new_rule("E")?.add_token("n")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert_eq!(
            n.to_string(),
            "## terms:\nE (start)\nE_tail\n\n## tokens:\n'+'\n'n'\n\n## prompts:\n\n## rules:\nE := 'n' E_tail\nE_tail := '+' 'n' E_tail\nE_tail := ε\n"
        );
    }

    #[test]
    fn prompts_move_into_the_tail() {
        let g = Grammar::define(|g| {
            g.set_start("E")?;
            g.new_rule("E")?
                .add_prompt("open")?
                .add_term("E")?
                .add_token("+")?
                .add_token("n")?;
            g.new_rule("E")?.add_token("n")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert_eq!(
            rules(&n),
            [
                "E := 'n' E_tail",
                "E_tail := @open '+' 'n' E_tail",
                "E_tail := ε"
            ]
        );
    }

    #[test]
    fn tail_names_do_not_collide() {
        let g = Grammar::define(|g| {
            g.set_start("E")?;
            g.new_rule("E")?.add_term("E")?.add_token("+")?;
            g.new_rule("E")?.add_term("E_tail")?;
            g.new_rule("E_tail")?.add_token("n")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert_eq!(
            rules(&n),
            [
                "E := E_tail E_tail2",
                "E_tail := 'n'",
                "E_tail2 := '+' E_tail2",
                "E_tail2 := ε"
            ]
        );
    }

    #[test]
    fn indirect_left_recursion() {
        let g = Grammar::define(|g| {
            g.set_start("A")?;
            g.new_rule("A")?.add_term("B")?.add_token("x")?;
            g.new_rule("A")?.add_token("a")?;
            g.new_rule("B")?.add_term("A")?.add_token("y")?;
            g.new_rule("B")?.add_token("b")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert!(Analyzer::new(&n).find_first_left_recursion().is_empty());
        assert_eq!(n.find_term("B"), None);
        assert_eq!(validate(&n), Vec::<String>::new());
        assert_eq!(
            rules(&n),
            [
                "A := 'b' 'x' A_tail",
                "A := 'a' A_tail",
                "A_tail := 'y' 'x' A_tail",
                "A_tail := ε",
            ]
        );
    }

    #[test]
    fn hidden_left_recursion() {
        let g = Grammar::define(|g| {
            g.set_start("A")?;
            g.new_rule("A")?.add_term("N")?.add_term("A")?.add_token("x")?;
            g.new_rule("A")?.add_token("y")?;
            g.new_rule("N")?;
            g.new_rule("N")?.add_token("n")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert!(Analyzer::new(&n).find_first_left_recursion().is_empty());
        assert_eq!(
            rules(&n),
            [
                "A := 'n' A 'x' A_tail",
                "A := 'y' A_tail",
                "A_tail := 'x' A_tail",
                "A_tail := ε",
            ]
        );
    }

    #[test]
    fn unreachable_symbols_are_removed() {
        let g = Grammar::define(|g| {
            g.set_start("S")?;
            g.set_error("error")?;
            g.new_rule("S")?.add_token("x")?;
            g.new_rule("T")?.add_token("t")?.add_prompt("p")?;
            Ok(())
        })
        .unwrap();
        let n = normalize(&g).unwrap();
        assert_eq!(
            n.to_string(),
            "## terms:\nS (start)\n\n## tokens:\n'error' (error)\n'x'\n\n## prompts:\n\n## rules:\nS := 'x'\n"
        );
    }

    #[test]
    fn unresolvable_left_recursion() {
        let g = Grammar::define(|g| {
            g.set_start("A")?;
            g.new_rule("A")?.add_term("A")?.add_token("x")?;
            Ok(())
        })
        .unwrap();
        match normalize(&g) {
            Err(NormalizeError::LeftRecursion { path }) => assert_eq!(path, ["A"]),
            Ok(g) => panic!("unexpected success:\n{}", g),
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let g = Grammar::define(|g| {
            g.set_start("E")?;
            g.new_rule("E")?.add_term("E")?.add_token("+")?.add_term("T")?;
            g.new_rule("E")?.add_term("T")?;
            g.new_rule("T")?.add_term("T")?.add_token("*")?.add_term("F")?;
            g.new_rule("T")?.add_term("F")?;
            g.new_rule("F")?.add_token("(")?.add_term("E")?.add_token(")")?;
            g.new_rule("F")?.add_token("n")?;
            Ok(())
        })
        .unwrap();
        let once = normalize(&g).unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once.to_string(), twice.to_string());
        assert!(Analyzer::new(&once).find_first_left_recursion().is_empty());
    }
}
