//! Condition model operations — building, editing, validating, and pruning
//! condition trees. Shape only; no evaluation against market data.
//!
//! Editing invariant: a non-root group emptied by a removal is pruned from
//! its parent, cascading upward. The root group survives empty.

pub mod render;

use crate::domain::{
    Condition, ConditionGroup, ConditionId, ConditionNode, GroupId, GroupLogic, IndicatorCatalogue,
};
use thiserror::Error;

pub use render::{render, EMPTY_CONDITIONS, INDICATOR_NOT_FOUND, INVALID_CONDITION};

/// Trees deeper than this are treated as malformed (cyclic-looking data
/// from a bad import); rendering degrades to the sentinel.
pub const MAX_TREE_DEPTH: usize = 32;

/// Errors from condition-tree edits. Unknown ids indicate caller bugs.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("group {0} not found in condition tree")]
    GroupNotFound(GroupId),

    #[error("condition {0} not found in condition tree")]
    ConditionNotFound(ConditionId),
}

/// One shape rule broken by a condition tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeViolation {
    #[error("condition tree exceeds maximum depth {MAX_TREE_DEPTH}")]
    DepthExceeded,

    #[error("condition {0} uses a range operator without an upper bound")]
    MissingUpperBound(ConditionId),

    #[error("condition {0} uses a bar-count operator without a bar count")]
    MissingBarCount(ConditionId),

    #[error("condition {condition} references unknown indicator '{name}'")]
    UnknownIndicator {
        condition: ConditionId,
        name: String,
    },

    #[error("nested group {0} is empty")]
    EmptyNestedGroup(GroupId),
}

// ─── Editing ─────────────────────────────────────────────────────────

fn find_group_mut<'a>(
    group: &'a mut ConditionGroup,
    id: &GroupId,
) -> Option<&'a mut ConditionGroup> {
    if &group.id == id {
        return Some(group);
    }
    group.children.iter_mut().find_map(|child| match child {
        ConditionNode::Group(g) => find_group_mut(g, id),
        ConditionNode::Leaf(_) => None,
    })
}

/// Append a leaf condition to the identified group.
pub fn add_condition(
    root: &mut ConditionGroup,
    group_id: &GroupId,
    condition: Condition,
) -> Result<(), ConditionError> {
    let group = find_group_mut(root, group_id)
        .ok_or_else(|| ConditionError::GroupNotFound(group_id.clone()))?;
    group.children.push(ConditionNode::Leaf(condition));
    Ok(())
}

/// Insert a nested group under the identified parent. The new group starts
/// empty with its own AND/OR toggle, enabling shapes like
/// `(A AND B) OR (C AND D)`.
pub fn add_group(
    root: &mut ConditionGroup,
    parent_id: &GroupId,
    new_id: impl Into<GroupId>,
    logic: GroupLogic,
) -> Result<(), ConditionError> {
    let parent = find_group_mut(root, parent_id)
        .ok_or_else(|| ConditionError::GroupNotFound(parent_id.clone()))?;
    parent.children.push(ConditionNode::Group(ConditionGroup {
        id: new_id.into(),
        logic,
        children: Vec::new(),
    }));
    Ok(())
}

/// Flip a group's AND/OR combinator.
pub fn set_group_logic(
    root: &mut ConditionGroup,
    group_id: &GroupId,
    logic: GroupLogic,
) -> Result<(), ConditionError> {
    let group = find_group_mut(root, group_id)
        .ok_or_else(|| ConditionError::GroupNotFound(group_id.clone()))?;
    group.logic = logic;
    Ok(())
}

fn remove_rec(group: &mut ConditionGroup, id: &ConditionId) -> bool {
    if let Some(index) = group.children.iter().position(|child| {
        matches!(child, ConditionNode::Leaf(c) if &c.id == id)
    }) {
        group.children.remove(index);
        return true;
    }
    for index in 0..group.children.len() {
        if let ConditionNode::Group(child) = &mut group.children[index] {
            if remove_rec(child, id) {
                if child.is_empty() {
                    group.children.remove(index);
                }
                return true;
            }
        }
    }
    false
}

/// Remove a leaf by id. A group emptied by the removal is itself removed
/// from its parent, cascading; the root group may end up empty.
pub fn remove_condition(
    root: &mut ConditionGroup,
    condition_id: &ConditionId,
) -> Result<(), ConditionError> {
    if remove_rec(root, condition_id) {
        Ok(())
    } else {
        Err(ConditionError::ConditionNotFound(condition_id.clone()))
    }
}

/// Editor predicate: "no condition configured".
pub fn is_condition_tree_empty(root: &ConditionGroup) -> bool {
    root.count_leaves() == 0
}

// ─── Validation ──────────────────────────────────────────────────────

fn validate_rec(
    group: &ConditionGroup,
    catalogue: &IndicatorCatalogue,
    depth: usize,
    is_root: bool,
    violations: &mut Vec<ShapeViolation>,
) {
    if depth > MAX_TREE_DEPTH {
        violations.push(ShapeViolation::DepthExceeded);
        return;
    }
    if !is_root && group.is_empty() {
        violations.push(ShapeViolation::EmptyNestedGroup(group.id.clone()));
    }
    for child in &group.children {
        match child {
            ConditionNode::Group(g) => {
                validate_rec(g, catalogue, depth + 1, false, violations);
            }
            ConditionNode::Leaf(c) => validate_condition(c, catalogue, violations),
        }
    }
}

fn validate_condition(
    condition: &Condition,
    catalogue: &IndicatorCatalogue,
    violations: &mut Vec<ShapeViolation>,
) {
    if condition.op.requires_upper() && condition.upper.is_none() {
        violations.push(ShapeViolation::MissingUpperBound(condition.id.clone()));
    }
    if condition.op.requires_bars() && !condition.bars.is_some_and(|b| b >= 1) {
        violations.push(ShapeViolation::MissingBarCount(condition.id.clone()));
    }
    let mut exprs = vec![&condition.lhs, &condition.rhs];
    exprs.extend(condition.upper.as_ref());
    while let Some(expr) = exprs.pop() {
        match expr {
            crate::domain::Expression::Indicator { name, .. } => {
                if !catalogue.contains(name) {
                    violations.push(ShapeViolation::UnknownIndicator {
                        condition: condition.id.clone(),
                        name: name.clone(),
                    });
                }
            }
            crate::domain::Expression::Math { left, right, .. } => {
                exprs.push(left);
                exprs.push(right);
            }
            _ => {}
        }
    }
}

/// Check every shape rule. An empty error list means the tree is
/// renderable and safe to hand to the execution engine.
pub fn validate(
    root: &ConditionGroup,
    catalogue: &IndicatorCatalogue,
) -> Result<(), Vec<ShapeViolation>> {
    let mut violations = Vec::new();
    validate_rec(root, catalogue, 0, true, &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

// ─── Copy-on-write pruning ───────────────────────────────────────────

/// Result of rebuilding a subtree around removed conditions.
///
/// `Unchanged` lets callers skip re-writing nodes whose tree was not
/// touched — the observable structure-sharing guarantee the dependency
/// tracker relies on (an unaffected node's revision must not move).
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEdit {
    Unchanged,
    Replaced(ConditionGroup),
    /// Only produced for nested groups; the parent drops them.
    Removed,
}

fn strip_rec(group: &ConditionGroup, key: &str, is_root: bool) -> TreeEdit {
    let mut changed = false;
    let mut children = Vec::with_capacity(group.children.len());
    for child in &group.children {
        match child {
            ConditionNode::Leaf(c) if c.references_indicator(key) => changed = true,
            ConditionNode::Leaf(_) => children.push(child.clone()),
            ConditionNode::Group(g) => match strip_rec(g, key, false) {
                TreeEdit::Unchanged => children.push(child.clone()),
                TreeEdit::Replaced(ng) => {
                    changed = true;
                    children.push(ConditionNode::Group(ng));
                }
                TreeEdit::Removed => changed = true,
            },
        }
    }
    if !changed {
        TreeEdit::Unchanged
    } else if children.is_empty() && !is_root {
        TreeEdit::Removed
    } else {
        TreeEdit::Replaced(ConditionGroup {
            id: group.id.clone(),
            logic: group.logic,
            children,
        })
    }
}

/// Rebuild the tree with every condition referencing `key` removed
/// (transitively through math and the upper bound). Emptied nested groups
/// disappear; an emptied root survives as an empty group.
pub fn strip_indicator(root: &ConditionGroup, key: &str) -> TreeEdit {
    strip_rec(root, key, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompareOp, Expression, MarketField};

    fn leaf(id: &str, indicator: &str) -> Condition {
        Condition::new(
            id,
            Expression::indicator(indicator, 14),
            CompareOp::Lt,
            Expression::constant(30.0),
        )
    }

    fn nested_tree() -> ConditionGroup {
        // root AND [ g1 OR [c1, c2], c3 ]
        let mut root = ConditionGroup::empty_root("root");
        add_group(&mut root, &"root".into(), "g1", GroupLogic::Or).unwrap();
        add_condition(&mut root, &"g1".into(), leaf("c1", "RSI_1")).unwrap();
        add_condition(&mut root, &"g1".into(), leaf("c2", "RSI_1")).unwrap();
        add_condition(&mut root, &"root".into(), leaf("c3", "EMA_1")).unwrap();
        root
    }

    #[test]
    fn add_to_unknown_group_fails() {
        let mut root = ConditionGroup::empty_root("root");
        let err = add_condition(&mut root, &"ghost".into(), leaf("c1", "RSI_1")).unwrap_err();
        assert!(matches!(err, ConditionError::GroupNotFound(_)));
    }

    #[test]
    fn removing_last_leaf_prunes_nested_group() {
        let mut root = nested_tree();
        remove_condition(&mut root, &"c1".into()).unwrap();
        assert_eq!(root.count_leaves(), 2);
        remove_condition(&mut root, &"c2".into()).unwrap();
        // g1 is now empty and must be gone
        assert_eq!(root.children.len(), 1);
        assert!(matches!(&root.children[0], ConditionNode::Leaf(c) if c.id == "c3".into()));
    }

    #[test]
    fn root_survives_empty() {
        let mut root = ConditionGroup::empty_root("root");
        add_condition(&mut root, &"root".into(), leaf("c1", "RSI_1")).unwrap();
        remove_condition(&mut root, &"c1".into()).unwrap();
        assert!(is_condition_tree_empty(&root));
        assert_eq!(root.id, "root".into());
    }

    #[test]
    fn cascade_prunes_multiple_levels() {
        // root [ g1 [ g2 [ c1 ] ] ]
        let mut root = ConditionGroup::empty_root("root");
        add_group(&mut root, &"root".into(), "g1", GroupLogic::And).unwrap();
        add_group(&mut root, &"g1".into(), "g2", GroupLogic::Or).unwrap();
        add_condition(&mut root, &"g2".into(), leaf("c1", "RSI_1")).unwrap();
        remove_condition(&mut root, &"c1".into()).unwrap();
        assert!(root.children.is_empty());
    }

    #[test]
    fn validation_reports_operator_parameter_gaps() {
        let mut catalogue = IndicatorCatalogue::new();
        catalogue.insert("RSI_1", Default::default());
        let mut root = ConditionGroup::empty_root("root");
        let between = Condition::new(
            "c1",
            Expression::indicator("RSI_1", 14),
            CompareOp::Between,
            Expression::constant(30.0),
        );
        add_condition(&mut root, &"root".into(), between).unwrap();
        let violations = validate(&root, &catalogue).unwrap_err();
        assert_eq!(
            violations,
            vec![ShapeViolation::MissingUpperBound("c1".into())]
        );
    }

    #[test]
    fn validation_flags_unknown_indicator_inside_math() {
        let catalogue = IndicatorCatalogue::new();
        let mut root = ConditionGroup::empty_root("root");
        let cond = Condition::new(
            "c1",
            Expression::Math {
                left: Box::new(Expression::indicator("GHOST", 5)),
                op: crate::domain::MathOp::Add,
                right: Box::new(Expression::market(MarketField::Close)),
            },
            CompareOp::Gt,
            Expression::constant(0.0),
        );
        add_condition(&mut root, &"root".into(), cond).unwrap();
        let violations = validate(&root, &catalogue).unwrap_err();
        assert!(matches!(
            violations[0],
            ShapeViolation::UnknownIndicator { ref name, .. } if name == "GHOST"
        ));
    }

    #[test]
    fn validation_rejects_runaway_depth() {
        let mut root = ConditionGroup::empty_root("root");
        let mut parent: GroupId = "root".into();
        for i in 0..MAX_TREE_DEPTH + 1 {
            let id = format!("g{i}");
            add_group(&mut root, &parent, id.as_str(), GroupLogic::And).unwrap();
            parent = GroupId::new(id);
        }
        add_condition(&mut root, &parent, leaf("c1", "RSI_1")).unwrap();
        let violations = validate(&root, &IndicatorCatalogue::new()).unwrap_err();
        assert!(violations.contains(&ShapeViolation::DepthExceeded));
    }

    #[test]
    fn strip_reports_unchanged_for_unrelated_indicator() {
        let root = nested_tree();
        assert_eq!(strip_indicator(&root, "MACD_1"), TreeEdit::Unchanged);
    }

    #[test]
    fn strip_removes_leaves_and_emptied_groups() {
        let root = nested_tree();
        let TreeEdit::Replaced(stripped) = strip_indicator(&root, "RSI_1") else {
            panic!("expected a rebuild");
        };
        // g1 lost both children and is gone; c3 survives
        assert_eq!(stripped.children.len(), 1);
        assert_eq!(stripped.count_leaves(), 1);
    }

    #[test]
    fn strip_empties_root_but_keeps_it() {
        let root = nested_tree();
        let TreeEdit::Replaced(after_rsi) = strip_indicator(&root, "RSI_1") else {
            panic!("expected a rebuild");
        };
        let TreeEdit::Replaced(after_both) = strip_indicator(&after_rsi, "EMA_1") else {
            panic!("expected a rebuild");
        };
        assert!(after_both.children.is_empty());
        assert_eq!(after_both.id, "root".into());
    }

    #[test]
    fn strip_leaves_untouched_siblings_identical() {
        let root = nested_tree();
        let TreeEdit::Replaced(stripped) = strip_indicator(&root, "EMA_1") else {
            panic!("expected a rebuild");
        };
        // the g1 subtree was not touched and compares identical, ids included
        assert_eq!(stripped.children[0], root.children[0]);
    }
}
