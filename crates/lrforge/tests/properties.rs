use lrforge::{
    analyze::Analyzer,
    grammar::{Grammar, GrammarError, Item},
    table::Action,
    validate, Config, Normalizer, OnConflict, Parser,
};

fn parens(g: &mut Grammar) -> Result<(), GrammarError> {
    g.set_start("S")?;
    g.new_rule("S")?
        .add_token("(")?
        .add_term("S")?
        .add_token(")")?;
    g.new_rule("S")?;
    Ok(())
}

fn arithmetic(g: &mut Grammar) -> Result<(), GrammarError> {
    g.set_start("E")?;
    g.new_rule("E")?.add_term("E")?.add_token("+")?.add_term("T")?;
    g.new_rule("E")?.add_term("T")?;
    g.new_rule("T")?.add_term("T")?.add_token("*")?.add_term("F")?;
    g.new_rule("T")?.add_term("F")?;
    g.new_rule("F")?.add_token("(")?.add_term("E")?.add_token(")")?;
    g.new_rule("F")?.add_token("n")?;
    Ok(())
}

fn dangling_else(g: &mut Grammar) -> Result<(), GrammarError> {
    g.set_start("S")?;
    g.new_rule("S")?.add_token("i")?.add_term("S")?;
    g.new_rule("S")?
        .add_token("i")?
        .add_term("S")?
        .add_token("e")?
        .add_term("S")?;
    g.new_rule("S")?.add_token("x")?;
    Ok(())
}

fn prompted_list(g: &mut Grammar) -> Result<(), GrammarError> {
    g.set_start("L")?;
    g.new_rule("L")?
        .add_term("L")?
        .add_token(",")?
        .add_term("I")?
        .add_prompt("push")?;
    g.new_rule("L")?.add_term("I")?.add_prompt("first")?;
    g.new_rule("I")?.add_token("id")?;
    g.new_rule("I")?.add_token("(")?.add_term("L")?.add_token(")")?;
    Ok(())
}

fn indirect(g: &mut Grammar) -> Result<(), GrammarError> {
    g.set_start("A")?;
    g.new_rule("A")?.add_term("B")?.add_token("x")?;
    g.new_rule("A")?.add_token("a")?;
    g.new_rule("B")?.add_term("A")?.add_token("y")?;
    g.new_rule("B")?.add_token("b")?;
    Ok(())
}

fn nullable(g: &mut Grammar) -> Result<(), GrammarError> {
    g.set_start("S")?;
    g.new_rule("S")?.add_term("A")?.add_term("B")?.add_token("c")?;
    g.new_rule("A")?.add_token("a")?;
    g.new_rule("A")?;
    g.new_rule("B")?.add_token("b")?;
    g.new_rule("B")?.add_prompt("none")?;
    Ok(())
}

macro_rules! define_tests {
    ($($name:ident),*$(,)?) => {$(
        mod $name {
            use super::*;

            fn grammar() -> Grammar {
                Grammar::define(super::$name).unwrap()
            }

            #[test]
            fn is_valid() {
                assert_eq!(validate(&grammar()), Vec::<String>::new());
            }

            #[test]
            fn normalization_is_idempotent() {
                let normalizer = Normalizer::new(&Config::new());
                let once = normalizer.normalize(&grammar()).unwrap();
                let twice = normalizer.normalize(&once).unwrap();
                assert_eq!(once.to_string(), twice.to_string());
            }

            #[test]
            fn normalized_grammar_is_valid() {
                let normalized = Normalizer::new(&Config::new())
                    .normalize(&grammar())
                    .unwrap();
                assert_eq!(validate(&normalized), Vec::<String>::new());
            }

            #[test]
            fn normalized_grammar_has_no_left_recursion() {
                let normalized = Normalizer::new(&Config::new())
                    .normalize(&grammar())
                    .unwrap();
                assert!(Analyzer::new(&normalized).find_first_left_recursion().is_empty());
            }

            #[test]
            fn reductions_match_lookaheads() {
                let parser = Parser::new(&grammar(), OnConflict::PreferShift).unwrap();
                let g = parser.grammar();
                for state in parser.states().states() {
                    for (item, action) in parser.table().row(state.id()) {
                        let (Item::Token(token), Action::Reduce(rule)) = (item, action) else {
                            continue;
                        };
                        assert!(
                            state.fragments().any(|(core, lookahead)| {
                                core.rule() == *rule && core.is_end(g) && lookahead.contains(token)
                            }),
                            "state {}: reduce({}) on {}",
                            state.id(),
                            g[*rule].display(g),
                            g.display_item(item),
                        );
                    }
                }
            }

            #[test]
            fn construction_is_deterministic() {
                let first = Parser::new(&grammar(), OnConflict::PreferShift).unwrap();
                let second = Parser::new(&grammar(), OnConflict::PreferShift).unwrap();
                assert_eq!(
                    first.grammar().to_string(),
                    second.grammar().to_string()
                );
                assert_eq!(
                    first.states().display(first.grammar()).to_string(),
                    second.states().display(second.grammar()).to_string()
                );
                assert_eq!(
                    first.table().display(first.grammar()).to_string(),
                    second.table().display(second.grammar()).to_string()
                );
            }
        }
    )*};
}

define_tests! {
    parens,
    arithmetic,
    dangling_else,
    prompted_list,
    indirect,
    nullable,
}

#[test]
fn unreachable_or_duplicated_symbols_are_reported() {
    let g = Grammar::define(|g| {
        parens(g)?;
        g.new_rule("S")?.add_token("(")?.add_term("S")?.add_token(")")?;
        g.new_rule("T")?.add_token("t")?;
        Ok(())
    })
    .unwrap();
    assert_eq!(
        validate(&g),
        [
            "Duplicate rule detected: `S := '(' S ')''",
            "The term `T' is unreachable",
            "The token `t' is unreachable",
        ]
    );
}

#[test]
fn equal_definitions_in_other_order_build_the_same_machine() {
    // The symbol IDs differ, but the names and the rules are the same.
    let first = Grammar::define(|g| {
        g.term("F")?;
        arithmetic(g)
    })
    .unwrap();
    let second = Grammar::define(arithmetic).unwrap();

    let first = Parser::new(&first, OnConflict::Panic).unwrap();
    let second = Parser::new(&second, OnConflict::Panic).unwrap();
    assert_ne!(first.grammar().to_string(), second.grammar().to_string());
    assert_eq!(
        first.states().display(first.grammar()).to_string(),
        second.states().display(second.grammar()).to_string()
    );
    assert_eq!(
        first.table().display(first.grammar()).to_string(),
        second.table().display(second.grammar()).to_string()
    );
}
