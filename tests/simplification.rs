//! Worked simplification scenarios, from small rewrites to full
//! normalization of nested trees.

use serde_json::json;
use siftlogic::{field, EvaluationError, Filter, FilterError, Record, Rule, SimplifyOptions, Value};

fn simplified(rule: Rule) -> serde_json::Value {
    simplified_with(rule, SimplifyOptions::default())
}

fn simplified_with(rule: Rule, options: SimplifyOptions) -> serde_json::Value {
    let mut filter = Filter::with_options(options);
    filter.and_rule(rule).unwrap();
    filter.simplify().unwrap();
    filter.to_array()
}

#[test]
fn negation_complements() {
    for (rule, expected) in [
        (!field("f").eq(3), json!(["f", "!=", 3])),
        (!field("f").ne(3), json!(["f", "=", 3])),
        (!field("f").gte(3), json!(["f", "<", 3])),
        (!field("f").lte(3), json!(["f", ">", 3])),
        (
            !field("f").gt(3),
            json!(["or", ["f", "<", 3], ["f", "=", 3]]),
        ),
        (
            !field("f").lt(3),
            json!(["or", ["f", ">", 3], ["f", "=", 3]]),
        ),
        (
            !field("f").one_of(vec![1, 2]),
            json!(["f", "!in", [1, 2]]),
        ),
        // `in` lists under the threshold expand after the complement.
        (
            !field("f").none_of(vec![1, 2]),
            json!(["or", ["f", "=", 1], ["f", "=", 2]]),
        ),
    ] {
        assert_eq!(simplified(rule), expected);
    }
}

#[test]
fn double_negation_cancels() {
    assert_eq!(simplified(!!field("f").eq(3)), json!(["f", "=", 3]));
    assert_eq!(simplified(!!field("f").gt(3)), json!(["f", ">", 3]));
}

#[test]
fn de_morgan_distributes_over_operations() {
    let rule = !(field("a").eq(1) & field("b").eq(2));
    assert_eq!(
        simplified(rule),
        json!(["or", ["a", "!=", 1], ["b", "!=", 2]])
    );

    let rule = !(field("a").eq(1) | field("b").eq(2));
    assert_eq!(
        simplified(rule),
        json!(["and", ["a", "!=", 1], ["b", "!=", 2]])
    );
}

#[test]
fn negated_regexp_is_rejected() {
    let mut filter = Filter::new();
    filter.and_rule(!field("f").matches("^a")).unwrap();
    let err = filter.simplify().unwrap_err();
    assert!(matches!(
        err,
        FilterError::Evaluation(EvaluationError::UnsupportedNegation { .. })
    ));
}

#[test]
fn same_operator_bounds_unify_in_conjunctions() {
    assert_eq!(simplified(field("f").gt(3) & field("f").gt(5)), json!(["f", ">", 5]));
    assert_eq!(simplified(field("f").lt(3) & field("f").lt(5)), json!(["f", "<", 3]));
    assert_eq!(
        simplified(field("f").gte(3) & field("f").gt(3)),
        json!(["f", ">", 3])
    );
}

#[test]
fn bounds_widen_in_disjunctions() {
    assert_eq!(simplified(field("f").gt(3) | field("f").gt(5)), json!(["f", ">", 3]));
    assert_eq!(simplified(field("f").lt(3) | field("f").lt(5)), json!(["f", "<", 5]));
}

#[test]
fn duplicate_operands_collapse() {
    assert_eq!(simplified(field("f").eq(3) & field("f").eq(3)), json!(["f", "=", 3]));
    assert_eq!(simplified(field("f").eq(3) | field("f").eq(3)), json!(["f", "=", 3]));
}

#[test]
fn distinct_equalities_on_one_field_contradict() {
    assert_eq!(simplified(field("f").eq(3) & field("f").eq(4)), json!(["and"]));
}

#[test]
fn loose_equalities_unify_across_kinds() {
    assert_eq!(
        simplified(field("f").eq(3) & field("f").eq("3")),
        json!(["f", "=", 3])
    );
}

#[test]
fn equality_anchors_resolve_sibling_constraints() {
    assert_eq!(
        simplified(field("f").eq(4) & field("f").gt(3) & field("f").lt(10)),
        json!(["f", "=", 4])
    );
    assert_eq!(simplified(field("f").eq(3) & field("f").gt(3)), json!(["and"]));
    assert_eq!(
        simplified(field("f").eq(3) & field("f").one_of(vec![1, 2, 3])),
        json!(["f", "=", 3])
    );
    assert_eq!(
        simplified(field("f").eq(4) & field("f").one_of(vec![1, 2, 3])),
        json!(["and"])
    );
    assert_eq!(
        simplified(field("f").eq(3) & field("f").none_of(vec![3, 4])),
        json!(["and"])
    );
}

#[test]
fn in_lists_intersect_and_expand() {
    let rule = field("f").one_of(vec![1, 2, 3, 4]) & field("f").one_of(vec![3, 4, 5]);
    assert_eq!(
        simplified(rule),
        json!(["or", ["f", "=", 3], ["f", "=", 4]])
    );
}

#[test]
fn in_lists_union_in_disjunctions() {
    // Keep the lists above the expansion threshold so the union stays
    // visible as one `in`.
    let options = SimplifyOptions::new().in_threshold(1);
    let rule = field("f").one_of(vec![1, 2]) | field("f").one_of(vec![2, 3]);
    assert_eq!(
        simplified_with(rule, options),
        json!(["f", "in", [1, 2, 3]])
    );
}

#[test]
fn ranges_strain_in_lists() {
    let members: Vec<i64> = (1..=20).collect();
    let rule = field("f").one_of(members) & field("f").gt(10) & field("f").lte(12);
    assert_eq!(
        simplified(rule),
        json!(["or", ["f", "=", 11], ["f", "=", 12]])
    );
}

#[test]
fn incomparable_bound_stays_beside_a_compound_in_list() {
    let members: Vec<String> = (0..20).map(|i| format!("w{i:02}")).collect();
    let rule = field("f").one_of(members.clone()) & field("f").gt(3);

    let mut filter = Filter::new();
    filter.and_rule(rule).unwrap();
    let record = Record::new().set("f", "w05");
    assert!(!filter.matches(&record).unwrap());

    filter.simplify().unwrap();
    assert_eq!(
        filter.to_array(),
        json!(["and", ["f", "in", members], ["f", ">", 3]])
    );
    // The bound still rejects records with no numeric `f`.
    assert!(!filter.matches(&record).unwrap());
}

#[test]
fn not_null_strains_a_null_list_member() {
    let mut members: Vec<Value> = vec![Value::Null];
    members.extend((1..=19).map(Value::from));
    let rule = field("f").one_of(members) & field("f").is_not_null();
    assert_eq!(
        simplified(rule),
        json!(["f", "in", (1..=19).collect::<Vec<i64>>()])
    );
}

#[test]
fn not_in_absorbs_in_members() {
    let rule = field("f").one_of(vec![1, 2, 3, 4]) & field("f").none_of(vec![3, 4, 5, 6]);
    assert_eq!(
        simplified(rule),
        json!(["or", ["f", "=", 1], ["f", "=", 2]])
    );
}

#[test]
fn not_in_lists_union_in_conjunctions() {
    let rule = field("f").none_of(vec![1, 2]) & field("f").none_of(vec![2, 3]);
    assert_eq!(simplified(rule), json!(["f", "!in", [1, 2, 3]]));
}

#[test]
fn crossed_bounds_contradict() {
    assert_eq!(simplified(field("f").gt(5) & field("f").lt(3)), json!(["and"]));
    assert_eq!(simplified(field("f").gt(3) & field("f").lt(3)), json!(["and"]));
    assert_eq!(simplified(field("f").gte(3) & field("f").lt(3)), json!(["and"]));
}

#[test]
fn touching_inclusive_bounds_pin_a_value() {
    assert_eq!(
        simplified(field("f").gte(3) & field("f").lte(3)),
        json!(["f", "=", 3])
    );
}

#[test]
fn redundant_not_equal_is_dropped() {
    assert_eq!(
        simplified(field("f").gt(3) & field("f").ne(2)),
        json!(["f", ">", 3])
    );
    assert_eq!(
        simplified(field("f").gt(3) & field("f").ne(5)),
        json!(["and", ["f", ">", 3], ["f", "!=", 5]])
    );
}

#[test]
fn null_interactions() {
    assert_eq!(
        simplified(field("f").is_null() & field("f").gt(3)),
        json!(["and"])
    );
    assert_eq!(
        simplified(field("f").is_not_null() & field("f").gt(3)),
        json!(["f", ">", 3])
    );
    assert_eq!(
        simplified(field("f").is_null() & field("f").is_not_null()),
        json!(["and"])
    );
    // A lone `!= null` asserts presence and stays.
    assert_eq!(simplified(field("f").is_not_null()), json!(["f", "!=", null]));
}

#[test]
fn conjunctions_distribute_over_disjunctions() {
    let rule = field("a").eq(1) & (field("b").eq(2) | field("b").eq(3));
    assert_eq!(
        simplified(rule),
        json!([
            "or",
            ["and", ["a", "=", 1], ["b", "=", 2]],
            ["and", ["a", "=", 1], ["b", "=", 3]]
        ])
    );
}

#[test]
fn nested_disjunctions_produce_the_full_cross_product() {
    let rule = (field("a").eq(1) | field("a").eq(2)) & (field("b").eq(3) | field("b").eq(4));
    assert_eq!(
        simplified(rule),
        json!([
            "or",
            ["and", ["a", "=", 1], ["b", "=", 3]],
            ["and", ["a", "=", 1], ["b", "=", 4]],
            ["and", ["a", "=", 2], ["b", "=", 3]],
            ["and", ["a", "=", 2], ["b", "=", 4]]
        ])
    );
}

#[test]
fn resimplifying_after_adding_a_rule_is_sound() {
    let mut filter = Filter::new();
    filter
        .and_rule(field("a").eq(1) & (field("b").eq(2) | field("b").eq(3)))
        .unwrap();
    filter.simplify().unwrap();

    // The already-simplified cases ride along untouched.
    filter.or_rule(field("c").eq(4)).unwrap();
    filter.simplify().unwrap();
    assert_eq!(
        filter.to_array(),
        json!([
            "or",
            ["and", ["a", "=", 1], ["b", "=", 2]],
            ["and", ["a", "=", 1], ["b", "=", 3]],
            ["c", "=", 4]
        ])
    );
}

#[test]
fn three_way_distribution_yields_eight_cases() {
    let rule = (field("a").eq(1) | field("a").eq(2))
        & (field("b").eq(3) | field("b").eq(4))
        & (field("c").eq(5) | field("c").eq(6));
    assert_eq!(
        simplified(rule),
        json!([
            "or",
            ["and", ["a", "=", 1], ["b", "=", 3], ["c", "=", 5]],
            ["and", ["a", "=", 1], ["b", "=", 3], ["c", "=", 6]],
            ["and", ["a", "=", 1], ["b", "=", 4], ["c", "=", 5]],
            ["and", ["a", "=", 1], ["b", "=", 4], ["c", "=", 6]],
            ["and", ["a", "=", 2], ["b", "=", 3], ["c", "=", 5]],
            ["and", ["a", "=", 2], ["b", "=", 3], ["c", "=", 6]],
            ["and", ["a", "=", 2], ["b", "=", 4], ["c", "=", 5]],
            ["and", ["a", "=", 2], ["b", "=", 4], ["c", "=", 6]]
        ])
    );
}

#[test]
fn dead_branches_disappear() {
    let rule = (field("f").gt(5) & field("f").lt(3)) | field("g").eq(1);
    assert_eq!(simplified(rule), json!(["g", "=", 1]));
}

#[test]
fn fully_dead_disjunction_leaves_the_or_marker() {
    let rule = (field("f").gt(5) & field("f").lt(3)) | (field("g").eq(1) & field("g").eq(2));
    assert_eq!(simplified(rule), json!(["or"]));
}

#[test]
fn threshold_gates_in_expansion() {
    let under: Vec<i64> = (1..=14).collect();
    let over: Vec<i64> = (1..=15).collect();

    let exported = simplified(field("f").one_of(under.clone()));
    assert_eq!(exported[0], json!("or"));
    assert_eq!(exported.as_array().unwrap().len(), 15);

    assert_eq!(
        simplified(field("f").one_of(over.clone())),
        json!(["f", "in", over])
    );

    // A custom threshold moves the cut-off.
    let exported = simplified_with(
        field("f").one_of(over),
        SimplifyOptions::new().in_threshold(20),
    );
    assert_eq!(exported[0], json!("or"));
}

#[test]
fn unification_can_reopen_expansion() {
    let members: Vec<i64> = (1..=20).collect();
    let rule = field("f").one_of(members) & field("f").lt(3);
    assert_eq!(
        simplified(rule),
        json!(["or", ["f", "=", 1], ["f", "=", 2]])
    );
}

#[test]
fn not_equal_expansion_is_opt_in() {
    assert_eq!(simplified(field("f").ne(3)), json!(["f", "!=", 3]));
    assert_eq!(
        simplified_with(
            field("f").ne(3),
            SimplifyOptions::new().normalize_not_equal(true)
        ),
        json!(["or", ["f", ">", 3], ["f", "<", 3]])
    );
    // `!= null` has no range complement and never expands.
    assert_eq!(
        simplified_with(
            field("f").is_not_null(),
            SimplifyOptions::new().normalize_not_equal(true)
        ),
        json!(["f", "!=", null])
    );
}

#[test]
fn not_in_expansion_is_opt_in() {
    assert_eq!(
        simplified(field("f").none_of(vec![1, 2])),
        json!(["f", "!in", [1, 2]])
    );
    assert_eq!(
        simplified_with(
            field("f").none_of(vec![1, 2]),
            SimplifyOptions::new().normalize_not_in(true)
        ),
        json!(["and", ["f", "!=", 1], ["f", "!=", 2]])
    );
}

#[test]
fn dates_compare_as_dates() {
    let rule = field("born").gt("2018-07-04") & field("born").gt("2018-07-10");
    assert_eq!(
        simplified(rule),
        json!(["born", ">", "2018-07-10T00:00:00"])
    );
}

#[test]
fn infinite_and_nan_bounds_have_no_solution() {
    assert_eq!(simplified(field("f").gt(f64::INFINITY)), json!(["and"]));
    assert_eq!(simplified(field("f").lt(f64::NEG_INFINITY)), json!(["and"]));
    assert_eq!(simplified(field("f").gt(f64::NAN)), json!(["and"]));
    assert_eq!(simplified(field("f").one_of(Vec::<Value>::new())), json!(["and"]));
}

#[test]
fn force_logical_core_always_yields_the_shell() {
    let options = SimplifyOptions::new().logical_core(true);
    assert_eq!(
        simplified_with(field("f").eq(1), options.clone()),
        json!(["or", ["and", ["f", "=", 1]]])
    );
    assert_eq!(
        simplified_with(field("a").eq(1) | field("b").eq(2), options),
        json!(["or", ["and", ["a", "=", 1]], ["and", ["b", "=", 2]]])
    );
}

#[test]
fn mixed_fields_stay_separate() {
    let rule = field("a").gt(3) & field("b").gt(5) & field("a").gt(4);
    assert_eq!(
        simplified(rule),
        json!(["and", ["a", ">", 4], ["b", ">", 5]])
    );
}
