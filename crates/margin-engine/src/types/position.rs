use serde::{Deserialize, Serialize};

use super::ids::ObjectId;

/// Direction of a leveraged position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// Borrow quote, hold base.
    Long,
    /// Borrow base, hold quote.
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }

    /// Order direction that opens a position on this side.
    pub fn opening_direction(&self) -> OrderDirection {
        match self {
            Self::Long => OrderDirection::Bid,
            Self::Short => OrderDirection::Ask,
        }
    }

    /// Order direction that unwinds a position on this side.
    pub fn closing_direction(&self) -> OrderDirection {
        match self {
            Self::Long => OrderDirection::Ask,
            Self::Short => OrderDirection::Bid,
        }
    }
}

/// Market order direction against the pool's base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Bid,
    Ask,
}

impl OrderDirection {
    pub fn is_bid(&self) -> bool {
        matches!(self, Self::Bid)
    }
}

/// Where a resolved side/collateral came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintSource {
    /// Local metadata record written at open time.
    Metadata,
    /// Derived from balances and debts.
    Inferred,
}

/// Locally persisted hint about a container, written when it was opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionMetadataRecord {
    pub container_id: ObjectId,
    pub pool_id: ObjectId,
    pub side: PositionSide,
    pub collateral_asset_symbol: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Raw integer balances exactly as decoded, before unit scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawBalances {
    pub base_asset: u64,
    pub quote_asset: u64,
    pub base_debt: u64,
    pub quote_debt: u64,
}

/// An active leveraged position reconciled from chain state and local hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub container_id: ObjectId,
    pub pool_id: ObjectId,
    pub pool_name: String,
    pub base_symbol: String,
    pub quote_symbol: String,

    pub side: PositionSide,
    pub collateral_symbol: String,
    pub hint_source: HintSource,

    pub base_asset: f64,
    pub quote_asset: f64,
    pub base_debt: f64,
    pub quote_debt: f64,
    pub raw: RawBalances,

    /// Oracle prices the ledger used for its own risk accounting.
    pub base_price: f64,
    pub quote_price: f64,

    pub risk_ratio: f64,
    pub assets_usd: f64,
    pub debts_usd: f64,
    pub liquidation_price: f64,
}

impl Position {
    pub fn equity_usd(&self) -> f64 {
        self.assets_usd - self.debts_usd
    }

    /// Any outstanding debt at all, however small. Judged on native units
    /// so dust debt still needs a repay before withdrawal.
    pub fn has_debt(&self) -> bool {
        self.raw.base_debt > 0 || self.raw.quote_debt > 0
    }

    /// Exposure over equity. `1.0` for debt-free positions.
    pub fn leverage(&self) -> f64 {
        let equity = self.equity_usd();
        if equity <= 0.0 {
            return f64::INFINITY;
        }
        self.assets_usd / equity
    }

    /// Symbol of the asset this position borrows.
    pub fn borrowed_symbol(&self) -> &str {
        match self.side {
            PositionSide::Long => &self.quote_symbol,
            PositionSide::Short => &self.base_symbol,
        }
    }

    /// Raw debt of the borrowed asset.
    pub fn borrowed_raw(&self) -> u64 {
        match self.side {
            PositionSide::Long => self.raw.quote_debt,
            PositionSide::Short => self.raw.base_debt,
        }
    }
}
