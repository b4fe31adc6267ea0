//! Transaction plan construction.
//!
//! Every lifecycle transition becomes an ordered list of [`PlanStep`]s. The
//! builder never talks to the ledger; [`super::position_manager`] decides
//! when to simulate and when to submit.
//!
//! Amounts enter as display units, are converted to native `u64` through
//! `Decimal`, and any step that would move a zero amount is left out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decoder::ManagerState;
use super::price_view::PriceView;
use super::units::{
    ceil_to_increment, decimal_from_f64, floor_to_increment, native_to_decimal, to_native,
    to_native_ceil,
};
use crate::config::{MarketsConfig, PoolConfig};
use crate::constants::{NEGLIGIBLE_AMOUNT, REPAY_INTEREST_BUFFER};
use crate::errors::EngineError;
use crate::types::{
    ContainerRef, ObjectId, PlanStep, Position, PositionSide, RawBalances, SimulationResult,
    TransactionPlan, WalletAddress,
};

/// Leverage slack for requests made at exactly the floored cap.
const LEVERAGE_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A request to open (or add to) a leveraged position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub pool_id: ObjectId,
    pub side: PositionSide,
    /// Must be the pool's base or quote symbol.
    pub collateral_symbol: String,
    /// Collateral deposited, in collateral units.
    pub collateral_amount: f64,
    pub leverage: f64,
}

/// Sized amounts for an open, before plan assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenSizing {
    /// Collateral expressed in base-asset units.
    pub base_amount: f64,
    pub exposure_usd: f64,
    pub collateral_usd: f64,
    pub debt_usd: f64,
    /// Native units of the borrowed asset. Zero means no borrow step.
    pub borrow_native: u64,
    /// Native base units. Zero means no order step.
    pub order_native: u64,
}

/// How a full close unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStrategy {
    /// No debt: withdraw both balances.
    WithdrawOnly,
    /// Order would fall under the pool minimum: repay from the wallet.
    DirectRepay,
    /// Closing market order, repay from proceeds.
    MarketClose,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct TransactionPlanBuilder {
    markets: Arc<MarketsConfig>,
    next_order_id: AtomicU64,
}

impl TransactionPlanBuilder {
    pub fn new(markets: Arc<MarketsConfig>) -> Self {
        let seed = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self {
            markets,
            next_order_id: AtomicU64::new(seed),
        }
    }

    pub fn markets(&self) -> &MarketsConfig {
        &self.markets
    }

    fn client_order_id(&self) -> u64 {
        self.next_order_id.fetch_add(1, Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Open
    // -----------------------------------------------------------------------

    /// Borrow and order sizes for `request` at current prices.
    pub fn size_open(&self, request: &OpenRequest, prices: &PriceView) -> Result<OpenSizing, EngineError> {
        let pool = self.markets.pool(&request.pool_id)?;
        let params = self.markets.risk_params(&pool.id)?;

        if request.collateral_symbol != pool.base_symbol && request.collateral_symbol != pool.quote_symbol {
            return Err(EngineError::invalid(format!(
                "collateral {} is not traded in {}",
                request.collateral_symbol, pool.name
            )));
        }
        if !request.collateral_amount.is_finite() || request.collateral_amount <= 0.0 {
            return Err(EngineError::invalid(format!(
                "collateral amount must be > 0, got {}",
                request.collateral_amount
            )));
        }
        let cap = params.max_leverage(request.side);
        if !request.leverage.is_finite() || request.leverage < 1.0 || request.leverage > cap + LEVERAGE_EPSILON {
            return Err(EngineError::invalid(format!(
                "leverage {} outside [1, {cap}] for {} {}",
                request.leverage,
                pool.name,
                request.side.as_str()
            )));
        }

        let base_price = prices.usd(&pool.base_symbol)?;
        let collateral_price = prices.usd(&request.collateral_symbol)?;

        let collateral_usd = request.collateral_amount * collateral_price;
        let base_amount = collateral_usd / base_price;
        let exposure_usd = base_amount * base_price * request.leverage;
        let debt_usd = exposure_usd - collateral_usd;

        let borrowed = borrowed_symbol(pool, request.side);
        let borrow_native = if request.leverage > 1.0 {
            if debt_usd <= 0.0 {
                return Err(EngineError::invalid(format!(
                    "leverage {} produces no debt",
                    request.leverage
                )));
            }
            let borrow_amount = debt_usd / prices.usd(borrowed)?;
            let native = to_native(decimal_from_f64(borrow_amount)?, self.markets.decimals(borrowed)?)?;
            if native == 0 {
                return Err(EngineError::invalid("borrow amount rounds to zero"));
            }
            native
        } else {
            0
        };

        // Spending the collateral itself trades the whole exposure; when the
        // collateral already is the acquired asset only the borrowed part
        // goes through the book.
        let spends_collateral = match request.side {
            PositionSide::Long => request.collateral_symbol == pool.quote_symbol,
            PositionSide::Short => request.collateral_symbol == pool.base_symbol,
        };
        let order_base = if spends_collateral {
            base_amount * request.leverage
        } else {
            base_amount * (request.leverage - 1.0)
        };
        let order_qty = floor_to_increment(decimal_from_f64(order_base)?, pool.tick_size);
        let order_native = if order_qty.is_zero() {
            0
        } else {
            if order_qty < pool.min_size {
                return Err(EngineError::invalid(format!(
                    "order size {order_qty} below {} minimum {}",
                    pool.name, pool.min_size
                )));
            }
            to_native(order_qty, self.markets.decimals(&pool.base_symbol)?)?
        };

        Ok(OpenSizing {
            base_amount,
            exposure_usd,
            collateral_usd,
            debt_usd,
            borrow_native,
            order_native,
        })
    }

    /// Open in a pool where the wallet has no container yet: create, fund,
    /// borrow, trade and share in one plan.
    pub fn open_new(&self, request: &OpenRequest, prices: &PriceView) -> Result<TransactionPlan, EngineError> {
        let mut plan = TransactionPlan::new();
        plan.push(PlanStep::CreateContainer {
            pool_id: request.pool_id.clone(),
        });
        self.push_open_steps(&mut plan, ContainerRef::Created, request, prices)?;
        plan.push(PlanStep::ShareContainer);
        debug!(steps = plan.len(), pool = %request.pool_id.short(), "built first-time open plan");
        Ok(plan)
    }

    /// Open against an existing container.
    pub fn open_existing(
        &self,
        container: &ObjectId,
        request: &OpenRequest,
        prices: &PriceView,
    ) -> Result<TransactionPlan, EngineError> {
        let mut plan = TransactionPlan::new();
        self.push_open_steps(&mut plan, ContainerRef::Existing(container.clone()), request, prices)?;
        debug!(steps = plan.len(), container = %container.short(), "built open plan");
        Ok(plan)
    }

    fn push_open_steps(
        &self,
        plan: &mut TransactionPlan,
        container: ContainerRef,
        request: &OpenRequest,
        prices: &PriceView,
    ) -> Result<(), EngineError> {
        let pool = self.markets.pool(&request.pool_id)?;
        let sizing = self.size_open(request, prices)?;
        let deposit_native = to_native(
            decimal_from_f64(request.collateral_amount)?,
            self.markets.decimals(&request.collateral_symbol)?,
        )?;
        if deposit_native == 0 {
            return Err(EngineError::invalid("collateral amount rounds to zero"));
        }

        plan.push(PlanStep::Deposit {
            container: container.clone(),
            pool_id: pool.id.clone(),
            coin: request.collateral_symbol.clone(),
            amount: deposit_native,
        });
        if sizing.borrow_native > 0 {
            plan.push(PlanStep::Borrow {
                container: container.clone(),
                pool_id: pool.id.clone(),
                coin: borrowed_symbol(pool, request.side).to_string(),
                amount: sizing.borrow_native,
            });
        }
        if sizing.order_native > 0 {
            plan.push(PlanStep::PlaceMarketOrder {
                container,
                pool_id: pool.id.clone(),
                direction: request.side.opening_direction(),
                quantity: sizing.order_native,
                client_order_id: self.client_order_id(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Single operations
    // -----------------------------------------------------------------------

    pub fn deposit(&self, position: &Position, coin: &str, amount: f64) -> Result<TransactionPlan, EngineError> {
        let native = self.position_amount(position, coin, amount)?;
        let mut plan = TransactionPlan::new();
        plan.push(PlanStep::Deposit {
            container: ContainerRef::Existing(position.container_id.clone()),
            pool_id: position.pool_id.clone(),
            coin: coin.to_string(),
            amount: native,
        });
        Ok(plan)
    }

    pub fn borrow(&self, position: &Position, coin: &str, amount: f64) -> Result<TransactionPlan, EngineError> {
        let native = self.position_amount(position, coin, amount)?;
        let mut plan = TransactionPlan::new();
        plan.push(PlanStep::Borrow {
            container: ContainerRef::Existing(position.container_id.clone()),
            pool_id: position.pool_id.clone(),
            coin: coin.to_string(),
            amount: native,
        });
        Ok(plan)
    }

    /// `amount: None` repays all debt in `coin`.
    pub fn repay(&self, position: &Position, coin: &str, amount: Option<f64>) -> Result<TransactionPlan, EngineError> {
        let amount = match amount {
            Some(a) => Some(self.position_amount(position, coin, a)?),
            None => {
                self.position_coin(position, coin)?;
                None
            }
        };
        let mut plan = TransactionPlan::new();
        plan.push(PlanStep::Repay {
            container: ContainerRef::Existing(position.container_id.clone()),
            pool_id: position.pool_id.clone(),
            coin: coin.to_string(),
            amount,
        });
        Ok(plan)
    }

    fn position_coin(&self, position: &Position, coin: &str) -> Result<(), EngineError> {
        if coin != position.base_symbol && coin != position.quote_symbol {
            return Err(EngineError::invalid(format!(
                "{coin} is not traded in {}",
                position.pool_name
            )));
        }
        Ok(())
    }

    fn position_amount(&self, position: &Position, coin: &str, amount: f64) -> Result<u64, EngineError> {
        self.position_coin(position, coin)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EngineError::invalid(format!("amount must be > 0, got {amount}")));
        }
        let native = to_native(decimal_from_f64(amount)?, self.markets.decimals(coin)?)?;
        if native == 0 {
            return Err(EngineError::invalid(format!("{amount} {coin} rounds to zero")));
        }
        Ok(native)
    }

    // -----------------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------------

    /// Base quantity (display units) of the order that unwinds `fraction` of
    /// the position. Longs sell held base, floored to the tick; shorts buy
    /// back base debt, ceiled to the tick.
    pub fn closing_quantity(&self, position: &Position, fraction: Decimal) -> Result<Decimal, EngineError> {
        let pool = self.markets.pool(&position.pool_id)?;
        let base_decimals = self.markets.decimals(&pool.base_symbol)?;
        Ok(match position.side {
            PositionSide::Long => {
                let held = native_to_decimal(position.raw.base_asset, base_decimals)?;
                floor_to_increment(held * fraction, pool.tick_size)
            }
            PositionSide::Short => {
                let owed = native_to_decimal(position.raw.base_debt, base_decimals)?;
                ceil_to_increment(owed * fraction, pool.tick_size)
            }
        })
    }

    pub fn close_strategy(&self, position: &Position) -> Result<CloseStrategy, EngineError> {
        if !position.has_debt() {
            return Ok(CloseStrategy::WithdrawOnly);
        }
        let pool = self.markets.pool(&position.pool_id)?;
        let quantity = self.closing_quantity(position, Decimal::ONE)?;
        if quantity < pool.min_size {
            Ok(CloseStrategy::DirectRepay)
        } else {
            Ok(CloseStrategy::MarketClose)
        }
    }

    fn closing_order(&self, position: &Position, quantity: Decimal) -> Result<PlanStep, EngineError> {
        let base_decimals = self.markets.decimals(&position.base_symbol)?;
        Ok(PlanStep::PlaceMarketOrder {
            container: existing(position),
            pool_id: position.pool_id.clone(),
            direction: position.side.closing_direction(),
            quantity: to_native(quantity, base_decimals)?,
            client_order_id: self.client_order_id(),
        })
    }

    /// Closing order, settle, repay all debt. Shared head of the market-close
    /// simulation and final plan.
    fn push_market_unwind(&self, plan: &mut TransactionPlan, position: &Position) -> Result<(), EngineError> {
        let quantity = self.closing_quantity(position, Decimal::ONE)?;
        plan.push(self.closing_order(position, quantity)?);
        plan.push(PlanStep::WithdrawSettled {
            container: existing(position),
            pool_id: position.pool_id.clone(),
        });
        plan.push(PlanStep::Repay {
            container: existing(position),
            pool_id: position.pool_id.clone(),
            coin: position.borrowed_symbol().to_string(),
            amount: None,
        });
        Ok(())
    }

    /// Market close up to the repay, plus a state read.
    pub fn market_close_simulation(&self, position: &Position) -> Result<TransactionPlan, EngineError> {
        let mut plan = TransactionPlan::new();
        self.push_market_unwind(&mut plan, position)?;
        plan.push(read_state(position));
        Ok(plan)
    }

    /// Final market close with withdraw amounts learned from simulation.
    pub fn market_close(
        &self,
        position: &Position,
        withdraw_base: u64,
        withdraw_quote: u64,
        recipient: &WalletAddress,
    ) -> Result<TransactionPlan, EngineError> {
        let mut plan = TransactionPlan::new();
        self.push_market_unwind(&mut plan, position)?;
        push_withdraw_and_transfer(&mut plan, position, withdraw_base, withdraw_quote, recipient);
        debug!(steps = plan.len(), container = %position.container_id.short(), "built market close plan");
        Ok(plan)
    }

    /// Wallet deposit that covers the borrowed-asset debt plus an interest
    /// buffer.
    fn direct_repay_deposit(&self, position: &Position) -> Result<PlanStep, EngineError> {
        let coin = position.borrowed_symbol();
        let decimals = self.markets.decimals(coin)?;
        let owed = native_to_decimal(position.borrowed_raw(), decimals)?;
        let amount = to_native_ceil(owed * (Decimal::ONE + REPAY_INTEREST_BUFFER), decimals)?;
        Ok(PlanStep::Deposit {
            container: existing(position),
            pool_id: position.pool_id.clone(),
            coin: coin.to_string(),
            amount,
        })
    }

    fn push_direct_repay(&self, plan: &mut TransactionPlan, position: &Position) -> Result<(), EngineError> {
        plan.push(self.direct_repay_deposit(position)?);
        plan.push(PlanStep::Repay {
            container: existing(position),
            pool_id: position.pool_id.clone(),
            coin: position.borrowed_symbol().to_string(),
            amount: None,
        });
        Ok(())
    }

    pub fn direct_repay_simulation(&self, position: &Position) -> Result<TransactionPlan, EngineError> {
        let mut plan = TransactionPlan::new();
        self.push_direct_repay(&mut plan, position)?;
        plan.push(read_state(position));
        Ok(plan)
    }

    pub fn direct_repay_close(
        &self,
        position: &Position,
        withdraw_base: u64,
        withdraw_quote: u64,
        recipient: &WalletAddress,
    ) -> Result<TransactionPlan, EngineError> {
        let mut plan = TransactionPlan::new();
        self.push_direct_repay(&mut plan, position)?;
        push_withdraw_and_transfer(&mut plan, position, withdraw_base, withdraw_quote, recipient);
        debug!(steps = plan.len(), container = %position.container_id.short(), "built direct repay close plan");
        Ok(plan)
    }

    /// Debt-free close: withdraw the balances discovery reported.
    pub fn withdraw_only_close(&self, position: &Position, recipient: &WalletAddress) -> TransactionPlan {
        let mut plan = TransactionPlan::new();
        push_withdraw_and_transfer(
            &mut plan,
            position,
            position.raw.base_asset,
            position.raw.quote_asset,
            recipient,
        );
        plan
    }

    /// Unwind `fraction` of the position and repay the matching share of
    /// debt. Proceeds stay in the container.
    pub fn partial_close(&self, position: &Position, fraction: Decimal) -> Result<TransactionPlan, EngineError> {
        if fraction <= Decimal::ZERO || fraction >= Decimal::ONE {
            return Err(EngineError::invalid(format!(
                "partial close fraction must be in (0, 1), got {fraction}"
            )));
        }
        let pool = self.markets.pool(&position.pool_id)?;
        let quantity = self.closing_quantity(position, fraction)?;
        if quantity < pool.min_size {
            return Err(EngineError::invalid(format!(
                "partial close size {quantity} below {} minimum {}",
                pool.name, pool.min_size
            )));
        }

        let mut plan = TransactionPlan::new();
        plan.push(self.closing_order(position, quantity)?);
        plan.push(PlanStep::WithdrawSettled {
            container: existing(position),
            pool_id: position.pool_id.clone(),
        });

        let coin = position.borrowed_symbol();
        let decimals = self.markets.decimals(coin)?;
        let owed = native_to_decimal(position.borrowed_raw(), decimals)?;
        let repay_native = to_native(owed * fraction, decimals)?;
        if repay_native > 0 {
            plan.push(PlanStep::Repay {
                container: existing(position),
                pool_id: position.pool_id.clone(),
                coin: coin.to_string(),
                amount: Some(repay_native),
            });
        }
        debug!(steps = plan.len(), %fraction, "built partial close plan");
        Ok(plan)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn existing(position: &Position) -> ContainerRef {
    ContainerRef::Existing(position.container_id.clone())
}

fn read_state(position: &Position) -> PlanStep {
    PlanStep::ReadState {
        container: existing(position),
        pool_id: position.pool_id.clone(),
    }
}

fn borrowed_symbol(pool: &PoolConfig, side: PositionSide) -> &str {
    match side {
        PositionSide::Long => &pool.quote_symbol,
        PositionSide::Short => &pool.base_symbol,
    }
}

/// Withdraw each non-zero balance and transfer the withdrawn objects out.
/// Nothing is pushed when both amounts are zero.
fn push_withdraw_and_transfer(
    plan: &mut TransactionPlan,
    position: &Position,
    withdraw_base: u64,
    withdraw_quote: u64,
    recipient: &WalletAddress,
) {
    let mut sources = Vec::new();
    for (coin, amount) in [
        (&position.base_symbol, withdraw_base),
        (&position.quote_symbol, withdraw_quote),
    ] {
        if amount == 0 {
            continue;
        }
        sources.push(plan.push(PlanStep::Withdraw {
            container: existing(position),
            pool_id: position.pool_id.clone(),
            coin: coin.clone(),
            amount,
        }));
    }
    if !sources.is_empty() {
        plan.push(PlanStep::TransferOut {
            recipient: recipient.clone(),
            sources,
        });
    }
}

/// Post-repay balances from a close simulation.
///
/// Fails when the simulation failed, returned no state, or left debt that
/// the final plan would not clear.
pub fn simulated_balances(result: &SimulationResult, markets: &MarketsConfig, position: &Position) -> Result<RawBalances, EngineError> {
    if !result.succeeded() {
        return Err(EngineError::Simulation {
            reason: result
                .error
                .clone()
                .unwrap_or_else(|| "a simulated step failed".into()),
        });
    }
    let values = result
        .last_return_values()
        .ok_or_else(|| EngineError::Simulation {
            reason: "state read returned nothing".into(),
        })?;
    let balances = ManagerState::decode(values)?.balances;

    let base_debt = native_to_decimal(balances.base_debt, markets.decimals(&position.base_symbol)?)?;
    let quote_debt = native_to_decimal(balances.quote_debt, markets.decimals(&position.quote_symbol)?)?;
    let negligible = decimal_from_f64(NEGLIGIBLE_AMOUNT)?;
    if base_debt > negligible || quote_debt > negligible {
        return Err(EngineError::Simulation {
            reason: format!("debt remains after repay: base {base_debt}, quote {quote_debt}"),
        });
    }
    Ok(balances)
}
