//! Condition trees — the boolean expression model carried by signal nodes.
//!
//! A tree is a recursive structure of AND/OR groups whose leaves are
//! comparisons between two typed operand expressions. The core validates
//! shape only; truth evaluation against market data happens downstream.

use super::ids::{ConditionId, GroupId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a group combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupLogic {
    And,
    Or,
}

impl fmt::Display for GroupLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupLogic::And => write!(f, "AND"),
            GroupLogic::Or => write!(f, "OR"),
        }
    }
}

/// A node in the condition tree: either a nested group or a leaf comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ConditionNode {
    Group(ConditionGroup),
    Leaf(Condition),
}

/// A recursive AND/OR group.
///
/// # Invariants
/// - A non-root group with zero children is pruned from its parent by every
///   editing operation.
/// - The root group may legally be empty ("no condition configured"). Its
///   truth value in that state is the evaluator's decision, not ours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub id: GroupId,
    pub logic: GroupLogic,
    pub children: Vec<ConditionNode>,
}

impl ConditionGroup {
    /// An empty root group — the canonical "no condition configured" state.
    pub fn empty_root(id: impl Into<GroupId>) -> Self {
        Self {
            id: id.into(),
            logic: GroupLogic::And,
            children: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Count terminal conditions, ignoring group nodes.
    pub fn count_leaves(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                ConditionNode::Group(g) => g.count_leaves(),
                ConditionNode::Leaf(_) => 1,
            })
            .sum()
    }

    /// Structural equality ignoring generated group/condition ids.
    ///
    /// Deleting a condition and re-adding an equivalent one produces fresh
    /// ids; this comparison treats the two trees as the same strategy.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        self.logic == other.logic
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| match (a, b) {
                    (ConditionNode::Group(x), ConditionNode::Group(y)) => x.structurally_eq(y),
                    (ConditionNode::Leaf(x), ConditionNode::Leaf(y)) => x.structurally_eq(y),
                    _ => false,
                })
    }
}

/// A leaf comparison between two operand expressions.
///
/// `upper` is only meaningful for `Between`/`NotBetween` (the inclusive
/// upper bound; `rhs` is the lower). `bars` is only meaningful for
/// `IncreasingForN`/`DecreasingForN`. Shape validation enforces presence;
/// extra fields on other operators are retained but ignored downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    pub lhs: Expression,
    pub op: CompareOp,
    pub rhs: Expression,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<Expression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bars: Option<u32>,
}

impl Condition {
    pub fn new(
        id: impl Into<ConditionId>,
        lhs: Expression,
        op: CompareOp,
        rhs: Expression,
    ) -> Self {
        Self {
            id: id.into(),
            lhs,
            op,
            rhs,
            upper: None,
            bars: None,
        }
    }

    pub fn with_upper(mut self, upper: Expression) -> Self {
        self.upper = Some(upper);
        self
    }

    pub fn with_bars(mut self, bars: u32) -> Self {
        self.bars = Some(bars);
        self
    }

    /// Structural equality ignoring the generated condition id.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        self.lhs == other.lhs
            && self.op == other.op
            && self.rhs == other.rhs
            && self.upper == other.upper
            && self.bars == other.bars
    }

    /// Does either side (transitively, through math and the upper bound)
    /// reference the given indicator key?
    pub fn references_indicator(&self, key: &str) -> bool {
        self.lhs.references_indicator(key)
            || self.rhs.references_indicator(key)
            || self
                .upper
                .as_ref()
                .is_some_and(|u| u.references_indicator(key))
    }
}

/// Comparison operators.
///
/// Crossing and pattern operators are stateful across bars — they need a
/// lookback window and are evaluated by the execution engine. The core only
/// validates the parameters they require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    CrossesAbove,
    CrossesBelow,
    Between,
    NotBetween,
    IncreasingForN,
    DecreasingForN,
    BouncingOff,
    RejectingFrom,
}

impl CompareOp {
    /// Does this operator require the `upper` bound expression?
    pub fn requires_upper(self) -> bool {
        matches!(self, CompareOp::Between | CompareOp::NotBetween)
    }

    /// Does this operator require the `bars` count parameter?
    pub fn requires_bars(self) -> bool {
        matches!(self, CompareOp::IncreasingForN | CompareOp::DecreasingForN)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
            CompareOp::CrossesAbove => "crosses_above",
            CompareOp::CrossesBelow => "crosses_below",
            CompareOp::Between => "between",
            CompareOp::NotBetween => "not_between",
            CompareOp::IncreasingForN => "increasing_for",
            CompareOp::DecreasingForN => "decreasing_for",
            CompareOp::BouncingOff => "bouncing_off",
            CompareOp::RejectingFrom => "rejecting_from",
        };
        write!(f, "{s}")
    }
}

/// Arithmetic operators inside `Expression::Math`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
        };
        write!(f, "{s}")
    }
}

/// OHLCV field referenced by a market-data operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl fmt::Display for MarketField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketField::Open => "open",
            MarketField::High => "high",
            MarketField::Low => "low",
            MarketField::Close => "close",
            MarketField::Volume => "volume",
        };
        write!(f, "{s}")
    }
}

/// How a position-data operand selects the position it reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum PositionSelector {
    /// Target one position by its globally unique VPI.
    Vpi(String),
    /// Target the positions sharing a user-defined tag.
    Vpt(String),
}

/// Which metric of the selected position is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMetric {
    EntryPrice,
    Pnl,
    Lots,
}

impl fmt::Display for PositionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionMetric::EntryPrice => "entry_price",
            PositionMetric::Pnl => "pnl",
            PositionMetric::Lots => "lots",
        };
        write!(f, "{s}")
    }
}

/// Clock component referenced by a time operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeComponent {
    Hour,
    Minute,
    ClockTime,
    DayOfWeek,
}

impl fmt::Display for TimeComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeComponent::Hour => "hour",
            TimeComponent::Minute => "minute",
            TimeComponent::ClockTime => "time",
            TimeComponent::DayOfWeek => "day_of_week",
        };
        write!(f, "{s}")
    }
}

/// Which clock the time operand reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeContext {
    Exchange,
    Utc,
}

/// A typed operand expression.
///
/// `Indicator.name` references a key in the indicator catalogue owned by
/// the start node — the join point the dependency tracker walks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    Indicator {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        lookback: u32,
    },
    MarketData {
        field: MarketField,
        bar_offset: u32,
    },
    PositionData {
        selector: PositionSelector,
        metric: PositionMetric,
    },
    Time {
        component: TimeComponent,
        context: TimeContext,
    },
    Math {
        left: Box<Expression>,
        op: MathOp,
        right: Box<Expression>,
    },
    Constant {
        value: f64,
    },
}

impl Expression {
    pub fn indicator(name: impl Into<String>, lookback: u32) -> Self {
        Expression::Indicator {
            name: name.into(),
            output: None,
            lookback,
        }
    }

    pub fn market(field: MarketField) -> Self {
        Expression::MarketData {
            field,
            bar_offset: 0,
        }
    }

    pub fn constant(value: f64) -> Self {
        Expression::Constant { value }
    }

    /// Does this expression (transitively, through math) reference the
    /// given indicator key?
    pub fn references_indicator(&self, key: &str) -> bool {
        match self {
            Expression::Indicator { name, .. } => name == key,
            Expression::Math { left, right, .. } => {
                left.references_indicator(key) || right.references_indicator(key)
            }
            Expression::MarketData { .. }
            | Expression::PositionData { .. }
            | Expression::Time { .. }
            | Expression::Constant { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsi_lt_30(id: &str) -> Condition {
        Condition::new(
            id,
            Expression::indicator("RSI_1", 14),
            CompareOp::Lt,
            Expression::constant(30.0),
        )
    }

    #[test]
    fn count_leaves_recurses_through_groups() {
        let tree = ConditionGroup {
            id: "root".into(),
            logic: GroupLogic::And,
            children: vec![
                ConditionNode::Group(ConditionGroup {
                    id: "g1".into(),
                    logic: GroupLogic::Or,
                    children: vec![
                        ConditionNode::Leaf(rsi_lt_30("c1")),
                        ConditionNode::Leaf(rsi_lt_30("c2")),
                    ],
                }),
                ConditionNode::Leaf(rsi_lt_30("c3")),
            ],
        };
        assert_eq!(tree.count_leaves(), 3);
    }

    #[test]
    fn structural_equality_ignores_ids() {
        let a = ConditionGroup {
            id: "root-a".into(),
            logic: GroupLogic::And,
            children: vec![ConditionNode::Leaf(rsi_lt_30("c1"))],
        };
        let b = ConditionGroup {
            id: "root-b".into(),
            logic: GroupLogic::And,
            children: vec![ConditionNode::Leaf(rsi_lt_30("c99"))],
        };
        assert!(a.structurally_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn indicator_reference_found_through_nested_math() {
        let expr = Expression::Math {
            left: Box::new(Expression::Math {
                left: Box::new(Expression::indicator("EMA_1", 21)),
                op: MathOp::Mul,
                right: Box::new(Expression::constant(1.02)),
            }),
            op: MathOp::Add,
            right: Box::new(Expression::market(MarketField::Close)),
        };
        assert!(expr.references_indicator("EMA_1"));
        assert!(!expr.references_indicator("RSI_1"));
    }

    #[test]
    fn operator_parameter_requirements() {
        assert!(CompareOp::Between.requires_upper());
        assert!(CompareOp::NotBetween.requires_upper());
        assert!(!CompareOp::Gt.requires_upper());
        assert!(CompareOp::IncreasingForN.requires_bars());
        assert!(!CompareOp::CrossesAbove.requires_bars());
    }

    #[test]
    fn condition_serialization_roundtrip() {
        let cond = rsi_lt_30("c1").with_bars(5);
        let json = serde_json::to_string(&cond).unwrap();
        let back: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(cond, back);
    }
}
