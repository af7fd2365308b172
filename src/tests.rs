use crate::core::attr::Schema;
use crate::core::expr::{optimize, resolve_leaf, ListLit, Test};
use crate::core::strings::StringTable;
use crate::core::value::AttributeValue;
use crate::{AttributeDef, AttributeKind, Engine, EngineError, Expr, MatchScratch, Truth};

fn schema() -> Vec<AttributeDef> {
    let mut defs: Vec<AttributeDef> = (0..9)
        .map(|i| AttributeDef::new(format!("attr{i}"), AttributeKind::Int))
        .collect();
    defs.push(AttributeDef::new("string_attr", AttributeKind::String));
    defs.push(AttributeDef::new("flag", AttributeKind::Bool));
    defs.push(AttributeDef::new("score", AttributeKind::Float));
    defs.push(AttributeDef::new("tags", AttributeKind::StringList));
    defs.push(AttributeDef::new("codes", AttributeKind::IntList));
    defs
}

fn engine() -> Engine<&'static str> {
    Engine::new(schema()).unwrap()
}

mod predicate {
    use super::*;

    fn resolve(attribute: &str, test: Test) -> crate::core::predicate::Predicate {
        let schema = Schema::new(schema()).unwrap();
        let strings = StringTable::new();
        resolve_leaf(attribute, &test, &schema, &strings).unwrap()
    }

    #[test]
    fn negate_is_an_involution() {
        let predicates = [
            resolve("flag", Test::Var),
            resolve("attr0", Test::Eq(10i64.into())),
            resolve("attr0", Test::Lt(10i64.into())),
            resolve("attr0", Test::In(vec![1i64, 2, 3].into())),
            resolve("codes", Test::AllOf(vec![1i64, 2].into())),
            resolve("attr0", Test::IsNull),
            resolve("tags", Test::IsEmpty),
        ];
        for predicate in predicates {
            assert_eq!(predicate.negate().negate(), predicate);
        }
    }

    #[test]
    fn negate_complements_defined_outcomes() {
        let cases = [
            (resolve("flag", Test::Var), AttributeValue::Bool(true)),
            (resolve("attr0", Test::Eq(10i64.into())), AttributeValue::Int(10)),
            (resolve("attr0", Test::Le(5i64.into())), AttributeValue::Int(7)),
            (
                resolve("attr0", Test::In(vec![1i64, 2, 3].into())),
                AttributeValue::Int(2),
            ),
            (
                resolve("codes", Test::OneOf(vec![4i64, 5].into())),
                AttributeValue::IntList(vec![5, 9]),
            ),
        ];
        for (predicate, value) in cases {
            let outcome = predicate.evaluate(&value);
            assert_ne!(outcome, Truth::Undefined);
            assert_eq!(predicate.negate().evaluate(&value), outcome.negate());
        }
    }

    #[test]
    fn missing_value_is_undefined() {
        let predicate = resolve("attr0", Test::Eq(10i64.into()));
        assert_eq!(
            predicate.evaluate(&AttributeValue::Undefined),
            Truth::Undefined
        );
    }

    #[test]
    fn set_membership_uses_sorted_haystack() {
        let predicate = resolve("attr0", Test::In(vec![120i64, 100, 110].into()));
        assert_eq!(predicate.evaluate(&AttributeValue::Int(110)), Truth::True);
        assert_eq!(predicate.evaluate(&AttributeValue::Int(115)), Truth::False);
        let negated = predicate.negate();
        assert_eq!(negated.evaluate(&AttributeValue::Int(115)), Truth::True);
    }

    #[test]
    fn list_operators() {
        let one_of = resolve("codes", Test::OneOf(vec![1i64, 2].into()));
        let none_of = resolve("codes", Test::NoneOf(vec![1i64, 2].into()));
        let all_of = resolve("codes", Test::AllOf(vec![1i64, 2].into()));
        let event = AttributeValue::IntList(vec![2, 7]);
        assert_eq!(one_of.evaluate(&event), Truth::True);
        assert_eq!(none_of.evaluate(&event), Truth::False);
        assert_eq!(all_of.evaluate(&event), Truth::False);
        let superset = AttributeValue::IntList(vec![2, 1, 9]);
        assert_eq!(all_of.evaluate(&superset), Truth::True);
    }

    #[test]
    fn all_of_is_vacuously_true_for_empty_probe() {
        let all_of = resolve("codes", Test::AllOf(ListLit::Int(Vec::new())));
        let not_all_of = resolve("codes", Test::NotAllOf(ListLit::Int(Vec::new())));
        let event = AttributeValue::IntList(vec![1]);
        assert_eq!(all_of.evaluate(&event), Truth::True);
        assert_eq!(not_all_of.evaluate(&event), Truth::False);
    }

    #[test]
    fn null_operators_inspect_missing_values() {
        let is_null = resolve("attr0", Test::IsNull);
        assert_eq!(is_null.evaluate(&AttributeValue::Undefined), Truth::True);
        assert_eq!(is_null.evaluate(&AttributeValue::Int(1)), Truth::False);

        let is_empty = resolve("tags", Test::IsEmpty);
        assert_eq!(
            is_empty.evaluate(&AttributeValue::StringList(Vec::new())),
            Truth::True
        );
        // A missing value is not an empty list.
        assert_eq!(is_empty.evaluate(&AttributeValue::Undefined), Truth::False);
        assert_eq!(
            is_empty.negate().evaluate(&AttributeValue::Undefined),
            Truth::True
        );
    }

    #[test]
    fn costs_scale_with_literal_sizes() {
        assert_eq!(resolve("attr0", Test::Eq(10i64.into())).cost, 0);
        assert_eq!(
            resolve("attr0", Test::In(vec![1i64, 2, 3].into())).cost,
            3
        );
        assert_eq!(
            resolve("codes", Test::OneOf(vec![1i64, 2, 3].into())).cost,
            6
        );
    }

    #[test]
    fn equal_predicates_share_an_id() {
        let first = resolve("attr0", Test::In(vec![3i64, 1, 2].into()));
        let second = resolve("attr0", Test::In(vec![1i64, 2, 3, 3].into()));
        assert_eq!(first, second);
        assert_eq!(first.id, second.id);
        let other_attribute = resolve("attr1", Test::In(vec![1i64, 2, 3].into()));
        assert_ne!(first.id, other_attribute.id);
    }
}

mod rewrite {
    use super::*;

    fn optimized(expr: &Expr) -> crate::core::expr::Optimized {
        let schema = Schema::new(schema()).unwrap();
        let strings = StringTable::new();
        optimize(expr, &schema, &strings).unwrap()
    }

    #[test]
    fn double_negation_cancels() {
        let expr = Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64));
        let doubled = Expr::not(Expr::not(expr.clone()));
        assert_eq!(optimized(&expr).id, optimized(&doubled).id);
    }

    #[test]
    fn commutative_operands_share_an_id() {
        let left = Expr::eq("attr0", 10i64);
        let right = Expr::in_set("attr1", vec![1i64, 2]);
        let ab = Expr::and(left.clone(), right.clone());
        let ba = Expr::and(right.clone(), left.clone());
        assert_eq!(optimized(&ab).id, optimized(&ba).id);
        let ab = Expr::or(left.clone(), right.clone());
        let ba = Expr::or(right, left);
        assert_eq!(optimized(&ab).id, optimized(&ba).id);
    }

    #[test]
    fn and_and_or_never_collide() {
        let left = Expr::eq("attr0", 10i64);
        let right = Expr::eq("attr1", 20i64);
        let and = Expr::and(left.clone(), right.clone());
        let or = Expr::or(left, right);
        assert_ne!(optimized(&and).id, optimized(&or).id);
    }

    #[test]
    fn de_morgan_forms_are_identified() {
        let x = Expr::eq("attr0", 10i64);
        let y = Expr::eq("attr1", 20i64);
        let negated_and = Expr::not(Expr::and(x.clone(), y.clone()));
        let or_of_negations = Expr::or(Expr::not(x.clone()), Expr::not(y.clone()));
        assert_eq!(optimized(&negated_and).id, optimized(&or_of_negations).id);

        let negated_or = Expr::not(Expr::or(x.clone(), y.clone()));
        let and_of_negations = Expr::and(Expr::not(x), Expr::not(y));
        assert_eq!(optimized(&negated_or).id, optimized(&and_of_negations).id);
    }

    #[test]
    fn negation_reaches_the_leaves() {
        let negated = Expr::not(Expr::eq("attr0", 10i64));
        let rewritten = Expr::ne("attr0", 10i64);
        assert_eq!(optimized(&negated).id, optimized(&rewritten).id);
    }

    #[test]
    fn children_are_ordered_by_cost() {
        use crate::core::expr::OptimizedOp;

        let expensive = Expr::in_set("attr0", vec![1i64, 2, 3, 4]);
        let cheap = Expr::eq("attr1", 20i64);
        let root = optimized(&Expr::and(expensive, cheap));
        match root.op {
            OptimizedOp::And(left, right) => {
                assert!(left.cost <= right.cost);
                assert_eq!(left.cost, 0);
                assert_eq!(right.cost, 4);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn connective_costs_accumulate() {
        let expr = Expr::and(
            Expr::eq("attr0", 10i64),
            Expr::or(Expr::eq("attr1", 20i64), Expr::eq("attr2", 30i64)),
        );
        // Or charges 60, And charges 50, the equality leaves are free.
        assert_eq!(optimized(&expr).cost, 110);
    }

    #[test]
    fn display_renders_the_tree() {
        let expr = Expr::and(
            Expr::eq("attr0", 10i64),
            Expr::not(Expr::or(Expr::var("flag"), Expr::is_null("attr1"))),
        );
        assert_eq!(
            expr.to_string(),
            "And(attr0 = 10, Not(Or(flag, attr1 is null)))"
        );
    }
}

mod dag {
    use super::*;

    #[test]
    fn rules_share_common_sub_expressions() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
            )
            .unwrap();
        assert_eq!(engine.node_count(), 3);
        engine
            .add_rule(
                "s2",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr2", 30i64)),
            )
            .unwrap();
        // One shared leaf for attr0 = 10: two roots, three leaves.
        assert_eq!(engine.node_count(), 5);
        engine.dag().assert_valid();
    }

    #[test]
    fn identical_rules_share_one_root() {
        let mut engine = engine();
        let rule = Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64));
        engine.add_rule("s1", &rule).unwrap();
        engine.add_rule("s2", &rule).unwrap();
        assert_eq!(engine.node_count(), 3);
        assert_eq!(engine.rule_count(), 2);
        engine.dag().assert_valid();

        let event = engine
            .event()
            .with_int("attr0", 10)
            .with_int("attr1", 20)
            .build()
            .unwrap();
        let mut matches = engine.matches(&event);
        matches.sort_unstable();
        assert_eq!(matches, vec!["s1", "s2"]);
    }

    #[test]
    fn removal_releases_unshared_nodes() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
            )
            .unwrap();
        engine
            .add_rule(
                "s2",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr2", 30i64)),
            )
            .unwrap();
        engine.remove_rule(&"s1");
        // Only the nodes the surviving rule needs remain.
        assert_eq!(engine.node_count(), 3);
        assert_eq!(engine.rule_count(), 1);
        engine.dag().assert_valid();

        let event = engine
            .event()
            .with_int("attr0", 10)
            .with_int("attr1", 20)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&event), Vec::<&str>::new());

        engine.remove_rule(&"s2");
        assert_eq!(engine.node_count(), 0);
        engine.dag().assert_valid();
    }

    #[test]
    fn removing_an_unknown_subscription_is_a_noop() {
        let mut engine = engine();
        engine.add_rule("s1", &Expr::eq("attr0", 10i64)).unwrap();
        engine.remove_rule(&"nope");
        assert_eq!(engine.rule_count(), 1);
        engine.dag().assert_valid();
    }

    #[test]
    fn re_registering_a_subscription_is_rejected() {
        let mut engine = engine();
        engine.add_rule("s1", &Expr::eq("attr0", 10i64)).unwrap();
        let error = engine
            .add_rule("s1", &Expr::eq("attr1", 20i64))
            .unwrap_err();
        assert!(matches!(error, EngineError::InvalidExpression(_)));
        assert_eq!(engine.rule_count(), 1);
        assert_eq!(engine.node_count(), 1);
        engine.dag().assert_valid();
    }

    #[test]
    fn and_roots_prime_only_the_access_leaf() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(
                    Expr::eq("attr0", 10i64),
                    Expr::in_set("attr1", vec![1i64, 2, 3]),
                ),
            )
            .unwrap();
        // The equality is the cheaper child, so it alone gates the rule.
        assert_eq!(engine.dag().frontier().count(), 1);
        engine.dag().assert_valid();
    }

    #[test]
    fn or_roots_prime_every_leaf() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::or(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
            )
            .unwrap();
        assert_eq!(engine.dag().frontier().count(), 2);
        engine.dag().assert_valid();
    }

    #[test]
    fn frontier_unions_or_paths_and_access_leaves() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::or(
                    Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
                    Expr::eq("attr2", 30i64),
                ),
            )
            .unwrap();
        // The Or wakes on either side: its plain leaf plus the And's access leaf.
        assert_eq!(engine.dag().frontier().count(), 2);
        engine.dag().assert_valid();
    }

    #[test]
    fn levels_follow_the_longest_path_to_a_leaf() {
        let mut engine = engine();
        engine
            .add_rule(
                "deep",
                &Expr::and(
                    Expr::eq("attr5", 60i64),
                    Expr::or(Expr::eq("attr6", 70i64), Expr::eq("attr7", 80i64)),
                ),
            )
            .unwrap();
        engine.add_rule("shallow", &Expr::eq("attr0", 10i64)).unwrap();
        assert_eq!(engine.dag().max_level(), 3);
        engine.remove_rule(&"deep");
        assert_eq!(engine.dag().max_level(), 1);
        engine.dag().assert_valid();
    }

    #[test]
    fn a_root_can_be_another_rules_child() {
        let mut engine = engine();
        let leaf = Expr::eq("attr0", 10i64);
        engine
            .add_rule("pair", &Expr::and(leaf.clone(), Expr::eq("attr1", 20i64)))
            .unwrap();
        engine.add_rule("single", &leaf).unwrap();
        // The single-predicate rule deduplicates onto the existing leaf.
        assert_eq!(engine.node_count(), 3);
        engine.dag().assert_valid();

        let event = engine
            .event()
            .with_int("attr0", 10)
            .with_int("attr1", 20)
            .build()
            .unwrap();
        let mut matches = engine.matches(&event);
        matches.sort_unstable();
        assert_eq!(matches, vec!["pair", "single"]);

        engine.remove_rule(&"pair");
        engine.dag().assert_valid();
        assert_eq!(engine.node_count(), 1);
        assert_eq!(engine.matches(&event), vec!["single"]);

        engine.remove_rule(&"single");
        assert_eq!(engine.node_count(), 0);
        engine.dag().assert_valid();
    }
}

mod matcher {
    use super::*;

    #[test]
    fn simple_and() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
            )
            .unwrap();

        let event = engine
            .event()
            .with_int("attr0", 10)
            .with_int("attr1", 20)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&event), vec!["s1"]);

        let partial = engine.event().with_int("attr0", 10).build().unwrap();
        assert_eq!(engine.matches(&partial), Vec::<&str>::new());
    }

    #[test]
    fn shared_leaves_feed_all_their_rules() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
            )
            .unwrap();
        engine
            .add_rule(
                "s2",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr2", 30i64)),
            )
            .unwrap();

        let event = engine
            .event()
            .with_int("attr0", 10)
            .with_int("attr1", 20)
            .with_int("attr2", 30)
            .build()
            .unwrap();
        let mut matches = engine.matches(&event);
        matches.sort_unstable();
        assert_eq!(matches, vec!["s1", "s2"]);
    }

    #[test]
    fn or_matches_once_even_when_both_sides_hold() {
        let mut engine = engine();
        engine
            .add_rule(
                "s3",
                &Expr::or(Expr::eq("attr3", 40i64), Expr::eq("attr4", 50i64)),
            )
            .unwrap();

        let one_side = engine.event().with_int("attr4", 50).build().unwrap();
        assert_eq!(engine.matches(&one_side), vec!["s3"]);

        let both_sides = engine
            .event()
            .with_int("attr3", 40)
            .with_int("attr4", 50)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&both_sides), vec!["s3"]);
    }

    #[test]
    fn nested_or_under_and() {
        let mut engine = engine();
        engine
            .add_rule(
                "s4",
                &Expr::and(
                    Expr::eq("attr5", 60i64),
                    Expr::or(Expr::eq("attr6", 70i64), Expr::eq("attr7", 80i64)),
                ),
            )
            .unwrap();

        let matching = engine
            .event()
            .with_int("attr5", 60)
            .with_int("attr7", 80)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&matching), vec!["s4"]);

        let gate_only = engine.event().with_int("attr5", 60).build().unwrap();
        assert_eq!(engine.matches(&gate_only), Vec::<&str>::new());
    }

    #[test]
    fn set_membership_rules() {
        let mut engine = engine();
        engine
            .add_rule(
                "s6",
                &Expr::and(
                    Expr::in_set("attr0", vec![100i64, 110, 120]),
                    Expr::in_set("attr1", vec![200i64, 210, 220]),
                ),
            )
            .unwrap();

        let matching = engine
            .event()
            .with_int("attr0", 110)
            .with_int("attr1", 220)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&matching), vec!["s6"]);

        let missing = engine
            .event()
            .with_int("attr0", 100)
            .with_int("attr1", 999)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&missing), Vec::<&str>::new());
    }

    #[test]
    fn and_short_circuits_without_touching_siblings() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(
                    Expr::eq("attr0", 10i64),
                    Expr::in_set("attr1", vec![1i64, 2, 3]),
                ),
            )
            .unwrap();

        let mut scratch = MatchScratch::new();
        let event = engine
            .event()
            .with_int("attr0", 99)
            .with_int("attr1", 2)
            .build()
            .unwrap();
        assert_eq!(engine.matches_with(&event, &mut scratch), Vec::<&str>::new());
        // The cheap gate failed, so the set predicate was never evaluated.
        assert_eq!(scratch.predicate_evals, 1);

        let event = engine
            .event()
            .with_int("attr0", 10)
            .with_int("attr1", 2)
            .build()
            .unwrap();
        assert_eq!(engine.matches_with(&event, &mut scratch), vec!["s1"]);
        assert_eq!(scratch.predicate_evals, 2);
    }

    #[test]
    fn undefined_children_suppress_matches_without_errors() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
            )
            .unwrap();
        let empty = engine.event().build().unwrap();
        assert_eq!(engine.matches(&empty), Vec::<&str>::new());
    }

    #[test]
    fn negated_rules_match_through_de_morgan() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::not(Expr::and(
                    Expr::eq("attr0", 10i64),
                    Expr::eq("attr1", 20i64),
                )),
            )
            .unwrap();

        let event = engine
            .event()
            .with_int("attr0", 11)
            .with_int("attr1", 20)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&event), vec!["s1"]);

        let excluded = engine
            .event()
            .with_int("attr0", 10)
            .with_int("attr1", 20)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&excluded), Vec::<&str>::new());
    }

    #[test]
    fn is_null_matches_missing_attributes() {
        let mut engine = engine();
        engine.add_rule("s1", &Expr::is_null("attr0")).unwrap();
        let empty = engine.event().build().unwrap();
        assert_eq!(engine.matches(&empty), vec!["s1"]);
        let present = engine.event().with_int("attr0", 1).build().unwrap();
        assert_eq!(engine.matches(&present), Vec::<&str>::new());
    }

    #[test]
    fn string_and_list_predicates_match() {
        let mut engine = engine();
        engine
            .add_rule("exact", &Expr::eq("string_attr", "adidas"))
            .unwrap();
        engine
            .add_rule(
                "brands",
                &Expr::in_set("string_attr", vec!["adidas", "nike"]),
            )
            .unwrap();
        engine
            .add_rule("tagged", &Expr::one_of("tags", vec!["sports", "sale"]))
            .unwrap();
        engine
            .add_rule("coded", &Expr::all_of("codes", vec![1i64, 2]))
            .unwrap();

        let event = engine
            .event()
            .with_string("string_attr", "adidas")
            .with_string_list("tags", &["outlet", "sale"])
            .with_int_list("codes", &[2, 1, 9])
            .build()
            .unwrap();
        let mut matches = engine.matches(&event);
        matches.sort_unstable();
        assert_eq!(matches, vec!["brands", "coded", "exact", "tagged"]);
    }

    #[test]
    fn boolean_variables_and_float_comparisons() {
        let mut engine = engine();
        engine
            .add_rule(
                "hot",
                &Expr::and(Expr::var("flag"), Expr::gt("score", 0.5f64)),
            )
            .unwrap();

        let matching = engine
            .event()
            .with_bool("flag", true)
            .with_float("score", 0.75)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&matching), vec!["hot"]);

        let cold = engine
            .event()
            .with_bool("flag", true)
            .with_float("score", 0.25)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&cold), Vec::<&str>::new());
    }

    #[test]
    fn adding_rules_never_unmatches_existing_ones() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
            )
            .unwrap();
        let event = engine
            .event()
            .with_int("attr0", 10)
            .with_int("attr1", 20)
            .with_int("attr2", 30)
            .build()
            .unwrap();
        assert_eq!(engine.matches(&event), vec!["s1"]);

        engine
            .add_rule(
                "s2",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr2", 30i64)),
            )
            .unwrap();
        let mut matches = engine.matches(&event);
        matches.sort_unstable();
        assert_eq!(matches, vec!["s1", "s2"]);
    }

    #[test]
    fn scratch_state_is_reusable_across_events() {
        let mut engine = engine();
        engine.add_rule("s1", &Expr::eq("attr0", 10i64)).unwrap();
        let mut scratch = MatchScratch::new();

        let hit = engine.event().with_int("attr0", 10).build().unwrap();
        let miss = engine.event().with_int("attr0", 11).build().unwrap();
        assert_eq!(engine.matches_with(&hit, &mut scratch), vec!["s1"]);
        assert_eq!(engine.matches_with(&miss, &mut scratch), Vec::<&str>::new());
        assert_eq!(engine.matches_with(&hit, &mut scratch), vec!["s1"]);
    }
}

mod engine_api {
    use super::*;

    #[test]
    fn duplicate_attributes_are_rejected() {
        let defs = vec![
            AttributeDef::new("attr0", AttributeKind::Int),
            AttributeDef::new("attr0", AttributeKind::String),
        ];
        let error = Engine::<u32>::new(defs).unwrap_err();
        assert_eq!(error, EngineError::DuplicateAttribute("attr0".to_string()));
    }

    #[test]
    fn unknown_attributes_are_rejected() {
        let mut engine = engine();
        let error = engine
            .add_rule("s1", &Expr::eq("nonexistent", 1i64))
            .unwrap_err();
        assert_eq!(
            error,
            EngineError::UnknownAttribute("nonexistent".to_string())
        );
        assert_eq!(engine.node_count(), 0);
    }

    #[test]
    fn kind_mismatches_are_rejected() {
        let mut engine = engine();
        let error = engine.add_rule("s1", &Expr::eq("attr0", true)).unwrap_err();
        assert!(matches!(error, EngineError::SchemaMismatch { .. }));

        let error = engine.add_rule("s2", &Expr::var("attr0")).unwrap_err();
        assert!(matches!(error, EngineError::SchemaMismatch { .. }));

        let error = engine
            .add_rule("s3", &Expr::is_empty("attr0"))
            .unwrap_err();
        assert!(matches!(error, EngineError::SchemaMismatch { .. }));

        // A failed insertion in the middle of a tree leaves the store empty.
        let error = engine
            .add_rule(
                "s4",
                &Expr::and(Expr::eq("attr0", 1i64), Expr::lt("string_attr", "x")),
            )
            .unwrap_err();
        assert!(matches!(error, EngineError::SchemaMismatch { .. }));
        assert_eq!(engine.node_count(), 0);
    }

    #[test]
    fn empty_set_haystacks_are_rejected() {
        let mut engine = engine();
        let error = engine
            .add_rule("s1", &Expr::in_set("attr0", Vec::<i64>::new()))
            .unwrap_err();
        assert!(matches!(error, EngineError::InvalidExpression(_)));
    }

    #[test]
    fn event_builder_reports_the_first_violation() {
        let engine = engine();
        let error = engine
            .event()
            .with_int("attr0", 1)
            .with_string("attr1", "oops")
            .with_int("nonexistent", 2)
            .build()
            .unwrap_err();
        assert!(matches!(error, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn shared_string_tables_agree_on_references() {
        use std::sync::Arc;

        let strings = Arc::new(StringTable::new());
        let first: Engine<u32> = Engine::with_strings(schema(), Arc::clone(&strings)).unwrap();
        let second: Engine<u32> = Engine::with_strings(schema(), Arc::clone(&strings)).unwrap();
        drop((first, second));

        let a = strings.intern("adidas");
        let b = strings.intern("nike");
        assert_ne!(a, b);
        assert_eq!(strings.intern("adidas"), a);
        assert_eq!(strings.resolve(a).as_deref(), Some("adidas"));
        assert_eq!(strings.len(), 2);
    }

    #[test]
    fn graphviz_dump_describes_the_dag() {
        let mut engine = engine();
        engine
            .add_rule(
                "s1",
                &Expr::and(Expr::eq("attr0", 10i64), Expr::eq("attr1", 20i64)),
            )
            .unwrap();
        let dot = engine.to_graphviz();
        assert!(dot.starts_with("digraph rules {"));
        assert!(dot.contains("attr0 = 10"));
        assert!(dot.contains("peripheries=2"));
        assert!(dot.contains("->"));
    }
}

mod props {
    use proptest::prelude::*;

    use super::*;

    fn arb_expr() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            (0u32..3, 0i64..5).prop_map(|(a, v)| Expr::eq(&format!("attr{a}"), v)),
            (0u32..3, 0i64..5).prop_map(|(a, v)| Expr::lt(&format!("attr{a}"), v)),
            (0u32..3, proptest::collection::vec(0i64..5, 1..4))
                .prop_map(|(a, vs)| Expr::in_set(&format!("attr{a}"), vs)),
        ];
        leaf.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::and(l, r)),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::or(l, r)),
                inner.prop_map(Expr::not),
            ]
        })
    }

    fn optimized_id(expr: &Expr) -> u64 {
        let schema = Schema::new(schema()).unwrap();
        let strings = StringTable::new();
        optimize(expr, &schema, &strings).unwrap().id
    }

    proptest! {
        #[test]
        fn double_negation_is_identity(expr in arb_expr()) {
            let doubled = Expr::not(Expr::not(expr.clone()));
            prop_assert_eq!(optimized_id(&expr), optimized_id(&doubled));
        }

        #[test]
        fn optimization_is_deterministic(expr in arb_expr()) {
            prop_assert_eq!(optimized_id(&expr), optimized_id(&expr));
        }

        #[test]
        fn connectives_are_commutative(left in arb_expr(), right in arb_expr()) {
            prop_assert_eq!(
                optimized_id(&Expr::and(left.clone(), right.clone())),
                optimized_id(&Expr::and(right.clone(), left.clone()))
            );
            prop_assert_eq!(
                optimized_id(&Expr::or(left.clone(), right.clone())),
                optimized_id(&Expr::or(right, left))
            );
        }

        #[test]
        fn de_morgan_holds_for_random_operands(left in arb_expr(), right in arb_expr()) {
            prop_assert_eq!(
                optimized_id(&Expr::not(Expr::and(left.clone(), right.clone()))),
                optimized_id(&Expr::or(Expr::not(left), Expr::not(right)))
            );
        }

        #[test]
        fn match_sets_are_deterministic(
            exprs in proptest::collection::vec(arb_expr(), 1..6),
            values in proptest::collection::vec(proptest::option::of(0i64..5), 3),
        ) {
            let mut engine: Engine<usize> = Engine::new(schema()).unwrap();
            for (subscription, expr) in exprs.iter().enumerate() {
                engine.add_rule(subscription, expr).unwrap();
            }
            let mut builder = engine.event();
            for (attribute, value) in values.iter().enumerate() {
                if let Some(value) = value {
                    builder = builder.with_int(&format!("attr{attribute}"), *value);
                }
            }
            let event = builder.build().unwrap();
            let mut first = engine.matches(&event);
            let mut second = engine.matches(&event);
            first.sort_unstable();
            second.sort_unstable();
            prop_assert_eq!(first, second);
            engine.dag().assert_valid();
        }

        #[test]
        fn structure_survives_arbitrary_removals(
            exprs in proptest::collection::vec(arb_expr(), 1..8),
        ) {
            let mut engine: Engine<usize> = Engine::new(schema()).unwrap();
            for (subscription, expr) in exprs.iter().enumerate() {
                engine.add_rule(subscription, expr).unwrap();
            }
            engine.dag().assert_valid();
            for subscription in (0..exprs.len()).step_by(2) {
                engine.remove_rule(&subscription);
                engine.dag().assert_valid();
            }
            for subscription in (1..exprs.len()).step_by(2) {
                engine.remove_rule(&subscription);
                engine.dag().assert_valid();
            }
            prop_assert_eq!(engine.node_count(), 0);
        }
    }
}
