//! Condition model integration tests — building nested trees, rendering,
//! and leaf counting.

use stratflow_core::conditions::{
    add_condition, add_group, is_condition_tree_empty, remove_condition, render,
    set_group_logic, EMPTY_CONDITIONS, INVALID_CONDITION,
};
use stratflow_core::domain::{
    CompareOp, Condition, ConditionGroup, Expression, GroupLogic, IndicatorCatalogue,
    IndicatorSchema, MarketField,
};
use serde_json::json;

fn catalogue() -> IndicatorCatalogue {
    let mut c = IndicatorCatalogue::new();
    for (key, name) in [("RSI_1", "RSI"), ("EMA_1", "EMA")] {
        let mut schema = IndicatorSchema::new();
        schema.insert("name".into(), json!(name));
        c.insert(key, schema);
    }
    c
}

fn rsi(id: &str, op: CompareOp, value: f64) -> Condition {
    Condition::new(
        id,
        Expression::indicator("RSI_1", 14),
        op,
        Expression::constant(value),
    )
}

/// `(RSI < 30 OR RSI > 70) AND close crosses_above EMA` — three leaves,
/// one line, both sub-expressions joined by AND.
#[test]
fn nested_tree_counts_and_renders() {
    let mut root = ConditionGroup::empty_root("root");
    add_group(&mut root, &"root".into(), "g1", GroupLogic::Or).unwrap();
    add_condition(&mut root, &"g1".into(), rsi("c1", CompareOp::Lt, 30.0)).unwrap();
    add_condition(&mut root, &"g1".into(), rsi("c2", CompareOp::Gt, 70.0)).unwrap();
    add_condition(
        &mut root,
        &"root".into(),
        Condition::new(
            "c3",
            Expression::market(MarketField::Close),
            CompareOp::CrossesAbove,
            Expression::indicator("EMA_1", 21),
        ),
    )
    .unwrap();

    assert_eq!(root.count_leaves(), 3);
    let line = render(&root, &catalogue());
    assert_eq!(
        line,
        "(RSI(14) < 30 OR RSI(14) > 70) AND close crosses_above EMA(21)"
    );
    assert!(!line.contains('\n'));
}

#[test]
fn default_combinator_is_and_until_toggled() {
    let mut root = ConditionGroup::empty_root("root");
    assert_eq!(root.logic, GroupLogic::And);
    add_condition(&mut root, &"root".into(), rsi("c1", CompareOp::Lt, 30.0)).unwrap();
    add_condition(&mut root, &"root".into(), rsi("c2", CompareOp::Gt, 70.0)).unwrap();
    assert!(render(&root, &catalogue()).contains(" AND "));

    set_group_logic(&mut root, &"root".into(), GroupLogic::Or).unwrap();
    assert!(render(&root, &catalogue()).contains(" OR "));
}

#[test]
fn removing_all_leaves_yields_renderable_empty_root() {
    let mut root = ConditionGroup::empty_root("root");
    add_condition(&mut root, &"root".into(), rsi("c1", CompareOp::Lt, 30.0)).unwrap();
    remove_condition(&mut root, &"c1".into()).unwrap();

    assert!(is_condition_tree_empty(&root));
    assert_eq!(render(&root, &catalogue()), EMPTY_CONDITIONS);
}

#[test]
fn malformed_tree_renders_sentinel_not_panic() {
    let mut root = ConditionGroup::empty_root("root");
    add_condition(
        &mut root,
        &"root".into(),
        Condition::new(
            "c1",
            Expression::indicator("RSI_1", 14),
            CompareOp::IncreasingForN,
            Expression::constant(0.0),
        ),
    )
    .unwrap();
    // bar-count operator without a bar count
    assert_eq!(render(&root, &catalogue()), INVALID_CONDITION);
}

#[test]
fn deleting_and_readding_equivalent_condition_is_structurally_equal() {
    let mut a = ConditionGroup::empty_root("root");
    add_condition(&mut a, &"root".into(), rsi("c1", CompareOp::Lt, 30.0)).unwrap();
    add_condition(&mut a, &"root".into(), rsi("c2", CompareOp::Gt, 70.0)).unwrap();

    let mut b = a.clone();
    remove_condition(&mut b, &"c2".into()).unwrap();
    // re-add with a freshly generated id
    add_condition(&mut b, &"root".into(), rsi("c2-regen", CompareOp::Gt, 70.0)).unwrap();

    assert!(a.structurally_eq(&b));
    assert_eq!(render(&a, &catalogue()), render(&b, &catalogue()));
}
