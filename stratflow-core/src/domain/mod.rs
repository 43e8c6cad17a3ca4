//! Domain types for the strategy-graph core.

pub mod condition;
pub mod edge;
pub mod ids;
pub mod indicator;
pub mod node;
pub mod position;
pub mod risk;

pub use condition::{
    CompareOp, Condition, ConditionGroup, ConditionNode, Expression, GroupLogic, MarketField,
    MathOp, PositionMetric, PositionSelector, TimeComponent, TimeContext,
};
pub use edge::Edge;
pub use ids::{ConditionId, GroupId, NodeId, PositionId};
pub use indicator::{IndicatorCatalogue, IndicatorSchema};
pub use node::{
    ActionData, ExitData, ModifyData, Node, NodeData, NodeKind, RetryData, SignalData, StartData,
};
pub use position::{
    sorted_by_priority, OptionDetails, OrderType, Position, PositionPatch, PositionType,
    ProductType, StrikeType, DEFAULT_PREMIUM_STRIKE_VALUE,
};
pub use risk::{
    FeatureConfig, FeaturePatch, PostExecutionConfig, ReEntryConfig, RiskFeature, TriggerType,
    WaitTimeUnit,
};
