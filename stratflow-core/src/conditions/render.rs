//! Deterministic rendering of condition trees for live preview.
//!
//! Rendering never panics. A tree that breaks a structural rule (depth,
//! operator parameters) renders as the fixed `INVALID_CONDITION` sentinel;
//! an operand whose indicator is missing from the catalogue renders as
//! `INDICATOR_NOT_FOUND` in place while the rest of the line survives.

use crate::domain::{
    CompareOp, Condition, ConditionGroup, ConditionNode, Expression, IndicatorCatalogue,
    PositionSelector, TimeContext,
};
use tracing::warn;

use super::{validate, ShapeViolation};

/// Sentinel for a structurally broken tree.
pub const INVALID_CONDITION: &str = "invalid condition";
/// Sentinel for an operand referencing a deleted/unknown indicator.
pub const INDICATOR_NOT_FOUND: &str = "indicator not found";
/// Rendering of an empty root group.
pub const EMPTY_CONDITIONS: &str = "no conditions";

fn fmt_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn render_expr(expr: &Expression, catalogue: &IndicatorCatalogue) -> String {
    match expr {
        Expression::Indicator {
            name,
            output,
            lookback,
        } => {
            if !catalogue.contains(name) {
                return INDICATOR_NOT_FOUND.to_string();
            }
            let display = catalogue.display_name(name);
            match output {
                Some(out) => format!("{display}({lookback}).{out}"),
                None => format!("{display}({lookback})"),
            }
        }
        Expression::MarketData { field, bar_offset } => {
            if *bar_offset == 0 {
                field.to_string()
            } else {
                format!("{field}[{bar_offset}]")
            }
        }
        Expression::PositionData { selector, metric } => match selector {
            PositionSelector::Vpi(vpi) => format!("pos(vpi:{vpi}).{metric}"),
            PositionSelector::Vpt(vpt) => format!("pos(vpt:{vpt}).{metric}"),
        },
        Expression::Time { component, context } => {
            let clock = match context {
                TimeContext::Exchange => "exchange",
                TimeContext::Utc => "utc",
            };
            format!("{component}@{clock}")
        }
        Expression::Math { left, op, right } => format!(
            "({} {op} {})",
            render_expr(left, catalogue),
            render_expr(right, catalogue)
        ),
        Expression::Constant { value } => fmt_number(*value),
    }
}

fn render_condition(condition: &Condition, catalogue: &IndicatorCatalogue) -> String {
    let lhs = render_expr(&condition.lhs, catalogue);
    match condition.op {
        CompareOp::Between | CompareOp::NotBetween => {
            // upper presence was checked by validation
            let rhs = render_expr(&condition.rhs, catalogue);
            let upper = condition
                .upper
                .as_ref()
                .map(|u| render_expr(u, catalogue))
                .unwrap_or_else(|| INVALID_CONDITION.to_string());
            format!("{lhs} {} {rhs} and {upper}", condition.op)
        }
        CompareOp::IncreasingForN | CompareOp::DecreasingForN => {
            let bars = condition.bars.unwrap_or(0);
            format!("{lhs} {} {bars} bars", condition.op)
        }
        _ => {
            let rhs = render_expr(&condition.rhs, catalogue);
            format!("{lhs} {} {rhs}", condition.op)
        }
    }
}

fn render_group(group: &ConditionGroup, catalogue: &IndicatorCatalogue) -> String {
    let parts: Vec<String> = group
        .children
        .iter()
        .map(|child| match child {
            ConditionNode::Leaf(c) => render_condition(c, catalogue),
            ConditionNode::Group(g) => format!("({})", render_group(g, catalogue)),
        })
        .collect();
    parts.join(&format!(" {} ", group.logic))
}

/// Render a condition tree as one deterministic human-readable line.
///
/// Structural violations other than missing indicators degrade the whole
/// line to `INVALID_CONDITION`; missing indicators degrade only the
/// affected operand.
pub fn render(root: &ConditionGroup, catalogue: &IndicatorCatalogue) -> String {
    if root.is_empty() {
        return EMPTY_CONDITIONS.to_string();
    }
    if let Err(violations) = validate(root, catalogue) {
        let structural: Vec<&ShapeViolation> = violations
            .iter()
            .filter(|v| !matches!(v, ShapeViolation::UnknownIndicator { .. }))
            .collect();
        if !structural.is_empty() {
            warn!(group = %root.id, ?structural, "condition tree failed shape validation");
            return INVALID_CONDITION.to_string();
        }
    }
    render_group(root, catalogue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{add_condition, add_group};
    use crate::domain::{GroupLogic, IndicatorSchema, MarketField};
    use serde_json::json;

    fn catalogue() -> IndicatorCatalogue {
        let mut c = IndicatorCatalogue::new();
        let mut rsi = IndicatorSchema::new();
        rsi.insert("name".into(), json!("RSI"));
        c.insert("RSI_1", rsi);
        let mut ema = IndicatorSchema::new();
        ema.insert("name".into(), json!("EMA"));
        c.insert("EMA_1", ema);
        c
    }

    #[test]
    fn renders_flat_and_group() {
        let mut root = ConditionGroup::empty_root("root");
        add_condition(
            &mut root,
            &"root".into(),
            Condition::new(
                "c1",
                Expression::indicator("RSI_1", 14),
                CompareOp::Lt,
                Expression::constant(30.0),
            ),
        )
        .unwrap();
        add_condition(
            &mut root,
            &"root".into(),
            Condition::new(
                "c2",
                Expression::market(MarketField::Close),
                CompareOp::CrossesAbove,
                Expression::indicator("EMA_1", 21),
            ),
        )
        .unwrap();
        assert_eq!(
            render(&root, &catalogue()),
            "RSI(14) < 30 AND close crosses_above EMA(21)"
        );
    }

    #[test]
    fn renders_nested_group_parenthesized() {
        let mut root = ConditionGroup::empty_root("root");
        add_group(&mut root, &"root".into(), "g1", GroupLogic::Or).unwrap();
        add_condition(
            &mut root,
            &"g1".into(),
            Condition::new(
                "c1",
                Expression::indicator("RSI_1", 14),
                CompareOp::Lt,
                Expression::constant(30.0),
            ),
        )
        .unwrap();
        add_condition(
            &mut root,
            &"g1".into(),
            Condition::new(
                "c2",
                Expression::indicator("RSI_1", 14),
                CompareOp::Gt,
                Expression::constant(70.0),
            ),
        )
        .unwrap();
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
        assert_eq!(
            render(&root, &catalogue()),
            "(RSI(14) < 30 OR RSI(14) > 70) AND close crosses_above EMA(21)"
        );
    }

    #[test]
    fn missing_indicator_degrades_operand_only() {
        let mut root = ConditionGroup::empty_root("root");
        add_condition(
            &mut root,
            &"root".into(),
            Condition::new(
                "c1",
                Expression::indicator("GONE_1", 9),
                CompareOp::Gt,
                Expression::constant(1.0),
            ),
        )
        .unwrap();
        assert_eq!(render(&root, &catalogue()), "indicator not found > 1");
    }

    #[test]
    fn structural_violation_renders_sentinel() {
        let mut root = ConditionGroup::empty_root("root");
        add_condition(
            &mut root,
            &"root".into(),
            Condition::new(
                "c1",
                Expression::indicator("RSI_1", 14),
                CompareOp::Between,
                Expression::constant(30.0),
            ),
        )
        .unwrap();
        // between without an upper bound is malformed
        assert_eq!(render(&root, &catalogue()), INVALID_CONDITION);
    }

    #[test]
    fn empty_root_renders_placeholder() {
        let root = ConditionGroup::empty_root("root");
        assert_eq!(render(&root, &catalogue()), EMPTY_CONDITIONS);
    }

    #[test]
    fn between_renders_both_bounds() {
        let mut root = ConditionGroup::empty_root("root");
        add_condition(
            &mut root,
            &"root".into(),
            Condition::new(
                "c1",
                Expression::indicator("RSI_1", 14),
                CompareOp::Between,
                Expression::constant(30.0),
            )
            .with_upper(Expression::constant(70.0)),
        )
        .unwrap();
        assert_eq!(render(&root, &catalogue()), "RSI(14) between 30 and 70");
    }

    #[test]
    fn bar_count_operator_renders_count() {
        let mut root = ConditionGroup::empty_root("root");
        add_condition(
            &mut root,
            &"root".into(),
            Condition::new(
                "c1",
                Expression::market(MarketField::Close),
                CompareOp::IncreasingForN,
                Expression::constant(0.0),
            )
            .with_bars(3),
        )
        .unwrap();
        assert_eq!(render(&root, &catalogue()), "close increasing_for 3 bars");
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut root = ConditionGroup::empty_root("root");
        add_condition(
            &mut root,
            &"root".into(),
            Condition::new(
                "c1",
                Expression::indicator("RSI_1", 14),
                CompareOp::Lt,
                Expression::constant(30.5),
            ),
        )
        .unwrap();
        let cat = catalogue();
        assert_eq!(render(&root, &cat), render(&root, &cat));
    }
}
