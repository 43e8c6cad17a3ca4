//! Positions — the orders owned by action nodes.
//!
//! Every action node (entry, exit, alert, modify) carries an ordered list
//! of positions. The registry enforces the identity rules; the types here
//! only define shape and defaults.

use super::ids::PositionId;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Default strike value applied when `Premium` is first selected.
pub const DEFAULT_PREMIUM_STRIKE_VALUE: f64 = 100.0;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    Buy,
    Sell,
}

/// Order placement style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

/// Product/margin class of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Intraday,
    Delivery,
}

/// Option strike selection.
///
/// Serialized as the UI strings: `"ATM"`, `"ITM1"`..`"ITM15"`,
/// `"OTM1"`..`"OTM15"`, `"premium"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeType {
    Atm,
    /// In-the-money by N strikes, 1..=15.
    Itm(u8),
    /// Out-of-the-money by N strikes, 1..=15.
    Otm(u8),
    /// Select the strike closest to a target premium; requires
    /// `OptionDetails.strike_value`.
    Premium,
}

impl fmt::Display for StrikeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeType::Atm => write!(f, "ATM"),
            StrikeType::Itm(n) => write!(f, "ITM{n}"),
            StrikeType::Otm(n) => write!(f, "OTM{n}"),
            StrikeType::Premium => write!(f, "premium"),
        }
    }
}

impl std::str::FromStr for StrikeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let depth = |rest: &str| -> Result<u8, String> {
            let n: u8 = rest
                .parse()
                .map_err(|_| format!("invalid strike depth in '{s}'"))?;
            if (1..=15).contains(&n) {
                Ok(n)
            } else {
                Err(format!("strike depth out of range 1..=15 in '{s}'"))
            }
        };
        match s {
            "ATM" => Ok(StrikeType::Atm),
            "premium" => Ok(StrikeType::Premium),
            _ if s.starts_with("ITM") => depth(&s[3..]).map(StrikeType::Itm),
            _ if s.starts_with("OTM") => depth(&s[3..]).map(StrikeType::Otm),
            _ => Err(format!("unknown strike type '{s}'")),
        }
    }
}

impl Serialize for StrikeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StrikeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Option leg details for derivative positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDetails {
    pub strike_type: StrikeType,
    /// Target premium; required when `strike_type` is `Premium`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strike_value: Option<f64>,
    /// Days to expiry bucket (0 = nearest weekly).
    pub expiry_offset: u32,
}

impl OptionDetails {
    pub fn atm() -> Self {
        Self {
            strike_type: StrikeType::Atm,
            strike_value: None,
            expiry_offset: 0,
        }
    }
}

/// One order belonging to an action node.
///
/// # Identity invariants (enforced by the registry)
/// - `vpi` is unique across every position of every action node in the
///   whole graph. The empty string is exempt.
/// - `vpt` is a user label, non-unique.
/// - `priority` orders execution among positions fired by the same signal;
///   ties break by insertion order (stable sort).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub vpi: String,
    pub vpt: String,
    pub priority: u32,
    pub position_type: PositionType,
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    pub lots: u32,
    pub product_type: ProductType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_details: Option<OptionDetails>,
}

impl Position {
    /// The defaults applied to a freshly created position.
    pub fn with_defaults(id: PositionId, vpi: String, priority: u32) -> Self {
        Self {
            id,
            vpi,
            vpt: String::new(),
            priority,
            position_type: PositionType::Buy,
            order_type: OrderType::Market,
            limit_price: None,
            lots: 1,
            product_type: ProductType::Intraday,
            option_details: None,
        }
    }
}

/// Field-wise patch merged into a position by `update_position`.
///
/// `None` leaves the field untouched. Option-valued fields use a nested
/// `Option` so a patch can explicitly clear them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionPatch {
    pub vpi: Option<String>,
    pub vpt: Option<String>,
    pub priority: Option<u32>,
    pub position_type: Option<PositionType>,
    pub order_type: Option<OrderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Option<f64>>,
    pub lots: Option<u32>,
    pub product_type: Option<ProductType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_details: Option<Option<OptionDetails>>,
}

impl PositionPatch {
    pub fn vpi(vpi: impl Into<String>) -> Self {
        Self {
            vpi: Some(vpi.into()),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, position: &mut Position) {
        if let Some(vpi) = &self.vpi {
            position.vpi = vpi.clone();
        }
        if let Some(vpt) = &self.vpt {
            position.vpt = vpt.clone();
        }
        if let Some(priority) = self.priority {
            position.priority = priority;
        }
        if let Some(position_type) = self.position_type {
            position.position_type = position_type;
        }
        if let Some(order_type) = self.order_type {
            position.order_type = order_type;
        }
        if let Some(limit_price) = self.limit_price {
            position.limit_price = limit_price;
        }
        if let Some(lots) = self.lots {
            position.lots = lots;
        }
        if let Some(option_details) = &self.option_details {
            position.option_details = option_details.clone();
        }
    }
}

/// Stable execution order: ascending priority, insertion order on ties.
pub fn sorted_by_priority(positions: &[Position]) -> Vec<&Position> {
    let mut out: Vec<&Position> = positions.iter().collect();
    out.sort_by_key(|p| p.priority);
    out
}
