use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::constants::{DEFAULT_LIQUIDATION_RISK_RATIO, DEFAULT_MIN_BORROW_RISK_RATIO};
use crate::core::risk::RiskParams;
use crate::errors::EngineError;
use crate::types::ObjectId;

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub app: AppConfig,
    pub network: NetworkConfig,
    pub markets: MarketsConfig,
    pub oracle: OracleConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// File path for the `json` and `sqlite` backends.
    #[serde(default)]
    pub path: String,
}

// ---------------------------------------------------------------------------
// network.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub network_name: String,
    pub rpc_url: String,
    /// Package that defines the margin manager module.
    pub margin_package_id: ObjectId,
    /// Registry object that indexes containers by owner.
    pub margin_registry_id: ObjectId,
}

// ---------------------------------------------------------------------------
// markets.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MarketsConfig {
    pub pools: Vec<PoolConfig>,
    pub coins: HashMap<String, CoinConfig>,
    #[serde(default)]
    pub risk_params: HashMap<ObjectId, RiskParamsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub id: ObjectId,
    pub name: String,
    pub base_symbol: String,
    pub quote_symbol: String,
    /// Smallest order, in base-asset units.
    #[serde(with = "rust_decimal::serde::str")]
    pub min_size: Decimal,
    /// Order quantity increment, in base-asset units.
    #[serde(with = "rust_decimal::serde::str")]
    pub tick_size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinConfig {
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub image_url: String,
    /// Oracle feed id; `None` for coins that are never fetched.
    #[serde(default)]
    pub oracle_feed_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RiskParamsConfig {
    pub min_borrow_risk_ratio: f64,
    pub liquidation_risk_ratio: f64,
}

impl Default for RiskParamsConfig {
    fn default() -> Self {
        Self {
            min_borrow_risk_ratio: DEFAULT_MIN_BORROW_RISK_RATIO,
            liquidation_risk_ratio: DEFAULT_LIQUIDATION_RISK_RATIO,
        }
    }
}

impl MarketsConfig {
    pub fn pool(&self, id: &ObjectId) -> Result<&PoolConfig, EngineError> {
        self.pools
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| EngineError::UnknownPool(id.to_string()))
    }

    pub fn coin(&self, symbol: &str) -> Result<&CoinConfig, EngineError> {
        self.coins
            .get(symbol)
            .ok_or_else(|| EngineError::UnknownCoin(symbol.to_string()))
    }

    pub fn decimals(&self, symbol: &str) -> Result<u8, EngineError> {
        self.coin(symbol).map(|c| c.decimals)
    }

    /// Risk parameters for a pool, falling back to the documented defaults.
    ///
    /// Fails only for a configured entry that violates the ratio rules.
    pub fn risk_params(&self, pool_id: &ObjectId) -> Result<RiskParams, EngineError> {
        let raw = self.risk_params.get(pool_id).copied().unwrap_or_default();
        RiskParams::new(raw.min_borrow_risk_ratio, raw.liquidation_risk_ratio)
    }
}

// ---------------------------------------------------------------------------
// oracle.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    pub base_url: String,
    pub poll_interval_seconds: u64,
    pub request_timeout_seconds: u64,
}
