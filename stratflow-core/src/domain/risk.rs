//! Post-execution risk configuration — stop-loss, trailing-stop and
//! take-profit settings attached to exit nodes, plus the re-entry config
//! shared with retry nodes.
//!
//! These are stored editor settings, not live risk state. The invariant
//! that matters here: stop-loss and trailing-stop are mutually exclusive;
//! enabling one forces the other off (enforced by the risk engine).

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a feature's trigger level is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Percentage,
    Points,
    Pnl,
}

/// Unit for the post-trigger wait window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitTimeUnit {
    Seconds,
    Minutes,
}

/// Re-entry settings: either a retry node's direct config or nested inside
/// a risk feature of an exit node.
///
/// Members sharing a `group_number` present one logical `max_re_entries`
/// limit; the synchronizer keeps the copies converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReEntryConfig {
    pub enabled: bool,
    pub group_number: u32,
    pub max_re_entries: u32,
}

impl Default for ReEntryConfig {
    /// The config installed on first enable.
    fn default() -> Self {
        Self {
            enabled: true,
            group_number: 1,
            max_re_entries: 1,
        }
    }
}

/// One risk feature (stop-loss, trailing-stop, or take-profit).
///
/// Trigger-specific fields that don't match the current `trigger_type` are
/// retained, not rejected — forward-compatible storage; downstream
/// evaluation ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub enabled: bool,
    pub trigger_type: TriggerType,
    pub trigger_value: f64,
    /// Trailing distance; meaningful for the trailing-stop feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail_by: Option<f64>,
    /// Wait for a market order window after the trigger fires.
    pub wait_for_market: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u32>,
    pub wait_time_unit: WaitTimeUnit,
    /// Offset applied to the limit price of the exit order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_buffer: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub re_entry: Option<ReEntryConfig>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_type: TriggerType::Percentage,
            trigger_value: 0.0,
            trail_by: None,
            wait_for_market: false,
            wait_time: None,
            wait_time_unit: WaitTimeUnit::Seconds,
            limit_buffer: None,
            re_entry: None,
        }
    }
}

/// Patch merged into one feature by `update_feature`. `None` leaves the
/// field untouched; nested `Option`s can explicitly clear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturePatch {
    pub trigger_type: Option<TriggerType>,
    pub trigger_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trail_by: Option<Option<f64>>,
    pub wait_for_market: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<Option<u32>>,
    pub wait_time_unit: Option<WaitTimeUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_buffer: Option<Option<f64>>,
    pub max_re_entries: Option<u32>,
    pub group_number: Option<u32>,
}

impl FeaturePatch {
    pub fn apply_to(&self, feature: &mut FeatureConfig) {
        if let Some(trigger_type) = self.trigger_type {
            feature.trigger_type = trigger_type;
        }
        if let Some(trigger_value) = self.trigger_value {
            feature.trigger_value = trigger_value;
        }
        if let Some(trail_by) = self.trail_by {
            feature.trail_by = trail_by;
        }
        if let Some(wait_for_market) = self.wait_for_market {
            feature.wait_for_market = wait_for_market;
        }
        if let Some(wait_time) = self.wait_time {
            feature.wait_time = wait_time;
        }
        if let Some(wait_time_unit) = self.wait_time_unit {
            feature.wait_time_unit = wait_time_unit;
        }
        if let Some(limit_buffer) = self.limit_buffer {
            feature.limit_buffer = limit_buffer;
        }
        if let Some(re_entry) = feature.re_entry.as_mut() {
            if let Some(max) = self.max_re_entries {
                re_entry.max_re_entries = max;
            }
            if let Some(group) = self.group_number {
                re_entry.group_number = group;
            }
        }
    }
}

/// The three post-execution features of an exit node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostExecutionConfig {
    #[serde(default)]
    pub stop_loss: FeatureConfig,
    #[serde(default)]
    pub trailing_stop: FeatureConfig,
    #[serde(default)]
    pub take_profit: FeatureConfig,
}

impl PostExecutionConfig {
    pub fn feature(&self, feature: RiskFeature) -> &FeatureConfig {
        match feature {
            RiskFeature::StopLoss => &self.stop_loss,
            RiskFeature::TrailingStop => &self.trailing_stop,
            RiskFeature::TakeProfit => &self.take_profit,
        }
    }

    pub fn feature_mut(&mut self, feature: RiskFeature) -> &mut FeatureConfig {
        match feature {
            RiskFeature::StopLoss => &mut self.stop_loss,
            RiskFeature::TrailingStop => &mut self.trailing_stop,
            RiskFeature::TakeProfit => &mut self.take_profit,
        }
    }
}

/// Selector for one of the three features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFeature {
    StopLoss,
    TrailingStop,
    TakeProfit,
}

impl RiskFeature {
    pub const ALL: [RiskFeature; 3] = [
        RiskFeature::StopLoss,
        RiskFeature::TrailingStop,
        RiskFeature::TakeProfit,
    ];
}

impl fmt::Display for RiskFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskFeature::StopLoss => "stop_loss",
            RiskFeature::TrailingStop => "trailing_stop",
            RiskFeature::TakeProfit => "take_profit",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_enable_defaults() {
        let re = ReEntryConfig::default();
        assert!(re.enabled);
        assert_eq!(re.group_number, 1);
        assert_eq!(re.max_re_entries, 1);
    }

    #[test]
    fn patch_retains_mismatched_trigger_fields() {
        // trail_by on a percentage stop-loss is stored, not rejected
        let mut feature = FeatureConfig {
            enabled: true,
            trigger_type: TriggerType::Percentage,
            ..FeatureConfig::default()
        };
        let patch = FeaturePatch {
            trail_by: Some(Some(5.0)),
            ..FeaturePatch::default()
        };
        patch.apply_to(&mut feature);
        assert_eq!(feature.trail_by, Some(5.0));
        assert_eq!(feature.trigger_type, TriggerType::Percentage);
    }

    #[test]
    fn patch_skips_re_entry_fields_when_absent() {
        let mut feature = FeatureConfig::default();
        let patch = FeaturePatch {
            max_re_entries: Some(7),
            ..FeaturePatch::default()
        };
        patch.apply_to(&mut feature);
        assert!(feature.re_entry.is_none());
    }

    #[test]
    fn config_serialization_roundtrip() {
        let mut config = PostExecutionConfig::default();
        config.stop_loss.enabled = true;
        config.stop_loss.trigger_value = 2.5;
        config.stop_loss.re_entry = Some(ReEntryConfig {
            enabled: true,
            group_number: 3,
            max_re_entries: 4,
        });
        let json = serde_json::to_string(&config).unwrap();
        let back: PostExecutionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
