//! Risk math for margin positions.
//!
//! Pure functions over USD-denominated inputs. Ratios are `assets / debts`,
//! so higher is safer and a debt-free position has an infinite ratio.
//! [`RiskParams`] is the only way to hand pool ratios to this module, which
//! keeps `R <= 1` out of every division below.

use serde::Serialize;

use crate::constants::{DEFAULT_LIQUIDATION_RISK_RATIO, DEFAULT_MIN_BORROW_RISK_RATIO};
use crate::errors::EngineError;
use crate::types::PositionSide;

// ---------------------------------------------------------------------------
// Validated pool parameters
// ---------------------------------------------------------------------------

/// Per-pool risk thresholds, checked on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskParams {
    min_borrow_risk_ratio: f64,
    liquidation_risk_ratio: f64,
}

impl RiskParams {
    /// Both ratios must be finite and above 1, and liquidation must sit below
    /// the borrow threshold.
    pub fn new(min_borrow_risk_ratio: f64, liquidation_risk_ratio: f64) -> Result<Self, EngineError> {
        if !min_borrow_risk_ratio.is_finite() || min_borrow_risk_ratio <= 1.0 {
            return Err(EngineError::Config(format!(
                "min_borrow_risk_ratio ({min_borrow_risk_ratio}) must be > 1"
            )));
        }
        if !liquidation_risk_ratio.is_finite() || liquidation_risk_ratio <= 1.0 {
            return Err(EngineError::Config(format!(
                "liquidation_risk_ratio ({liquidation_risk_ratio}) must be > 1"
            )));
        }
        if liquidation_risk_ratio >= min_borrow_risk_ratio {
            return Err(EngineError::Config(format!(
                "liquidation_risk_ratio ({liquidation_risk_ratio}) must be < min_borrow_risk_ratio ({min_borrow_risk_ratio})"
            )));
        }
        Ok(Self {
            min_borrow_risk_ratio,
            liquidation_risk_ratio,
        })
    }

    pub fn min_borrow_risk_ratio(&self) -> f64 {
        self.min_borrow_risk_ratio
    }

    pub fn liquidation_risk_ratio(&self) -> f64 {
        self.liquidation_risk_ratio
    }

    /// Leverage cap for `side` under this pool's borrow threshold.
    pub fn max_leverage(&self, side: PositionSide) -> f64 {
        max_leverage(self.min_borrow_risk_ratio, side)
    }
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            min_borrow_risk_ratio: DEFAULT_MIN_BORROW_RISK_RATIO,
            liquidation_risk_ratio: DEFAULT_LIQUIDATION_RISK_RATIO,
        }
    }
}

// ---------------------------------------------------------------------------
// Pure helper functions
// ---------------------------------------------------------------------------

/// `assets / debts`, or `+inf` when there is no debt.
pub fn risk_ratio(assets_usd: f64, debts_usd: f64) -> f64 {
    if debts_usd <= 0.0 {
        return f64::INFINITY;
    }
    assets_usd / debts_usd
}

/// Highest leverage a fresh position may open with, floored to 0.1.
///
/// Long: `R / (R - 1)`. Short: `1 / (R - 1)`. Callers hold `R > 1`; see
/// [`checked_max_leverage`] for unvalidated input.
pub fn max_leverage(min_borrow_risk_ratio: f64, side: PositionSide) -> f64 {
    let r = min_borrow_risk_ratio;
    let raw = match side {
        PositionSide::Long => r / (r - 1.0),
        PositionSide::Short => 1.0 / (r - 1.0),
    };
    floor_to_tenth(raw)
}

/// [`max_leverage`] that rejects `R <= 1` as a configuration error.
pub fn checked_max_leverage(min_borrow_risk_ratio: f64, side: PositionSide) -> Result<f64, EngineError> {
    if !min_borrow_risk_ratio.is_finite() || min_borrow_risk_ratio <= 1.0 {
        return Err(EngineError::Config(format!(
            "min_borrow_risk_ratio ({min_borrow_risk_ratio}) must be > 1"
        )));
    }
    Ok(max_leverage(min_borrow_risk_ratio, side))
}

/// Smallest collateral (USD) that keeps `exposure_usd` at the borrow threshold.
pub fn min_collateral_usd(exposure_usd: f64, min_borrow_risk_ratio: f64) -> f64 {
    exposure_usd * (1.0 - 1.0 / min_borrow_risk_ratio)
}

/// Risk ratio after adding `delta_collateral` (asset units, may be negative).
///
/// Debt is backed out of the current ratio. At or below 1 the current ratio is
/// returned unchanged.
pub fn modified_risk_ratio(
    current_collateral: f64,
    delta_collateral: f64,
    collateral_price_usd: f64,
    current_risk_ratio: f64,
) -> f64 {
    if current_risk_ratio <= 1.0 {
        return current_risk_ratio;
    }
    let assets_usd = current_collateral * collateral_price_usd;
    let debts_usd = if current_risk_ratio.is_infinite() {
        0.0
    } else {
        assets_usd / current_risk_ratio
    };
    let new_assets_usd = assets_usd + delta_collateral * collateral_price_usd;
    risk_ratio(new_assets_usd, debts_usd)
}

/// Base-asset USD price at which the position reaches the liquidation ratio.
///
/// Debt against zero exposure is already past liquidation: a long reports
/// `+∞`, a short `-∞`.
pub fn liquidation_price(
    base_price_usd: f64,
    debt_usd: f64,
    exposure_usd: f64,
    liquidation_risk_ratio: f64,
    side: PositionSide,
) -> f64 {
    let liq_factor = if debt_usd == 0.0 {
        0.0
    } else {
        liquidation_risk_ratio * debt_usd / exposure_usd
    };
    match side {
        PositionSide::Long => base_price_usd * liq_factor,
        PositionSide::Short => base_price_usd * (2.0 - liq_factor),
    }
}

fn floor_to_tenth(value: f64) -> f64 {
    // Nudge past representation error so 5.0 stays 5.0 rather than 4.9.
    ((value * 10.0) + 1e-9).floor() / 10.0
}
