//! StratFlow Core — the consistency engine behind a node-graph strategy
//! builder.
//!
//! The graph is a set of typed nodes (start, signal, action, retry, end)
//! edited independently per node; this crate keeps the whole thing
//! semantically consistent without a central transaction mechanism:
//! - Condition expression model (AND/OR trees over typed operands)
//! - Position registry (graph-wide VPI uniqueness, stable priorities)
//! - Post-execution risk engine (SL/TSL exclusivity, re-entry settings)
//! - Re-entry group synchronizer (cross-node limit convergence)
//! - Indicator dependency tracker (usage search, cascading pruning)
//!
//! No rendering, no backtesting, no order routing, no indicator math —
//! those live in downstream collaborators that consume this model.

pub mod conditions;
pub mod domain;
pub mod maintenance;
pub mod persist;
pub mod registry;
pub mod risk;
pub mod store;
pub mod sync;
pub mod tracker;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the shared store and every domain type are
    /// Send + Sync, so a future worker thread cannot force a retrofit.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Node>();
        require_sync::<domain::Node>();
        require_send::<domain::NodeData>();
        require_sync::<domain::NodeData>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::ConditionGroup>();
        require_sync::<domain::ConditionGroup>();
        require_send::<domain::Expression>();
        require_sync::<domain::Expression>();
        require_send::<domain::PostExecutionConfig>();
        require_sync::<domain::PostExecutionConfig>();
        require_send::<domain::IndicatorCatalogue>();
        require_sync::<domain::IndicatorCatalogue>();
        require_send::<store::InMemoryGraphStore>();
        require_sync::<store::InMemoryGraphStore>();
        require_send::<persist::StrategyDocument>();
        require_sync::<persist::StrategyDocument>();
    }
}
