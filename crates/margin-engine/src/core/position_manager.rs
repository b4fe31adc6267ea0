//! Position lifecycle orchestration.
//!
//! Transaction flow for every operation:
//! 1. Validate the request against pool config and current prices
//! 2. Build a [`TransactionPlan`] with [`TransactionPlanBuilder`]
//! 3. Simulate it (closes read post-repay balances from the simulation)
//! 4. Submit the final plan through the session's ledger
//! 5. Classify the result into a [`SubmissionOutcome`]
//! 6. Keep the local metadata hints in step with what was executed
//!
//! Simulation and submission are separate ledger calls, so state can move in
//! between. Closes deposit a small interest buffer for that reason and
//! nothing is retried.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::discovery::PositionDiscovery;
use super::metadata_store::PositionMetadataStore;
use super::plan_builder::{simulated_balances, CloseStrategy, OpenRequest, TransactionPlanBuilder};
use super::price_view::PriceView;
use super::risk::{modified_risk_ratio, risk_ratio};
use crate::config::MarketsConfig;
use crate::errors::{truncate_message, EngineError, SubmissionOutcome};
use crate::execution::ledger::extract_created_container;
use crate::execution::session::WalletSession;
use crate::types::{ObjectId, Position, PositionMetadataRecord, RawBalances, TransactionPlan};

pub struct PositionManager {
    session: WalletSession,
    markets: Arc<MarketsConfig>,
    prices: PriceView,
    metadata: PositionMetadataStore,
    discovery: PositionDiscovery,
    builder: TransactionPlanBuilder,
}

impl PositionManager {
    pub fn new(
        session: WalletSession,
        markets: Arc<MarketsConfig>,
        prices: PriceView,
        metadata: PositionMetadataStore,
    ) -> Self {
        let discovery = PositionDiscovery::new(session.clone(), markets.clone(), metadata.clone());
        let builder = TransactionPlanBuilder::new(markets.clone());
        Self {
            session,
            markets,
            prices,
            metadata,
            discovery,
            builder,
        }
    }

    pub fn discovery(&self) -> &PositionDiscovery {
        &self.discovery
    }

    /// Active positions of the connected wallet.
    pub async fn positions(&self) -> Result<Vec<Position>, EngineError> {
        self.discovery.discover().await
    }

    // -----------------------------------------------------------------------
    // Open
    // -----------------------------------------------------------------------

    /// Open a leveraged position, creating the pool's container on first use.
    ///
    /// On success the outcome carries the container id and a metadata record
    /// with the requested side and collateral is written for it.
    pub async fn open_position(&self, request: &OpenRequest) -> Result<SubmissionOutcome, EngineError> {
        let sizing = self.builder.size_open(request, &self.prices)?;
        info!(
            pool = %request.pool_id.short(),
            side = request.side.as_str(),
            collateral = %request.collateral_symbol,
            leverage = request.leverage,
            exposure_usd = sizing.exposure_usd,
            debt_usd = sizing.debt_usd,
            "opening position"
        );

        let existing = self.discovery.container_for_pool(&request.pool_id).await?;
        let plan = match &existing {
            Some(container) => self.builder.open_existing(container, request, &self.prices)?,
            None => self.builder.open_new(request, &self.prices)?,
        };

        self.preflight("open", &plan).await?;
        let outcome = self.submit("open", &plan).await?;
        let (digest, created, created_id) = match outcome {
            SubmissionOutcome::Executed {
                digest,
                created,
                container_id,
            } => (digest, created, container_id),
            other => return Ok(other),
        };

        let container_id = match existing {
            Some(container) => container,
            None => created_id.ok_or(EngineError::ContainerNotCreated)?,
        };

        let record = PositionMetadataRecord {
            container_id: container_id.clone(),
            pool_id: request.pool_id.clone(),
            side: request.side,
            collateral_asset_symbol: request.collateral_symbol.clone(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        // The position exists on-chain either way; a lost hint only means
        // side falls back to inference.
        if let Err(e) = self.metadata.put(record).await {
            warn!(container = %container_id.short(), error = %e, "failed to store position metadata");
        }

        info!(container = %container_id.short(), %digest, "position opened");
        Ok(SubmissionOutcome::Executed {
            digest,
            created,
            container_id: Some(container_id),
        })
    }

    // -----------------------------------------------------------------------
    // Single operations
    // -----------------------------------------------------------------------

    /// Risk ratio after depositing `amount` of `coin`, at current prices.
    pub fn preview_deposit(&self, position: &Position, coin: &str, amount: f64) -> Result<f64, EngineError> {
        let price = self.prices.usd(coin)?;
        let current = position.assets_usd / price;
        Ok(modified_risk_ratio(current, amount, price, position.risk_ratio))
    }

    /// Risk ratio after borrowing `amount` of `coin`. Borrowed funds stay in
    /// the container, so they count on both sides.
    pub fn preview_borrow(&self, position: &Position, coin: &str, amount: f64) -> Result<f64, EngineError> {
        let borrowed_usd = self.prices.value_usd(amount, coin)?;
        Ok(risk_ratio(
            position.assets_usd + borrowed_usd,
            position.debts_usd + borrowed_usd,
        ))
    }

    pub async fn deposit(&self, position: &Position, coin: &str, amount: f64) -> Result<SubmissionOutcome, EngineError> {
        let plan = self.builder.deposit(position, coin, amount)?;
        if let Ok(ratio) = self.preview_deposit(position, coin, amount) {
            info!(container = %position.container_id.short(), coin, amount, risk_ratio = ratio, "depositing");
        }
        self.preflight("deposit", &plan).await?;
        self.submit("deposit", &plan).await
    }

    /// Borrow more. Rejected when it would leave the position under the
    /// pool's borrow threshold.
    pub async fn borrow(&self, position: &Position, coin: &str, amount: f64) -> Result<SubmissionOutcome, EngineError> {
        let plan = self.builder.borrow(position, coin, amount)?;
        let params = self.markets.risk_params(&position.pool_id)?;
        let ratio = self.preview_borrow(position, coin, amount)?;
        if ratio < params.min_borrow_risk_ratio() {
            return Err(EngineError::invalid(format!(
                "borrow would lower risk ratio to {ratio:.3}, below {}",
                params.min_borrow_risk_ratio()
            )));
        }
        info!(container = %position.container_id.short(), coin, amount, risk_ratio = ratio, "borrowing");
        self.preflight("borrow", &plan).await?;
        self.submit("borrow", &plan).await
    }

    /// `amount: None` repays the whole debt in `coin`.
    pub async fn repay(
        &self,
        position: &Position,
        coin: &str,
        amount: Option<f64>,
    ) -> Result<SubmissionOutcome, EngineError> {
        let plan = self.builder.repay(position, coin, amount)?;
        info!(container = %position.container_id.short(), coin, ?amount, "repaying");
        self.preflight("repay", &plan).await?;
        self.submit("repay", &plan).await
    }

    // -----------------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------------

    /// Unwind `fraction` of a position. A fraction of exactly one is a full
    /// close.
    pub async fn partial_close(&self, position: &Position, fraction: Decimal) -> Result<SubmissionOutcome, EngineError> {
        if fraction == Decimal::ONE {
            return self.close_position(position).await;
        }
        let plan = self.builder.partial_close(position, fraction)?;
        info!(container = %position.container_id.short(), %fraction, "partially closing position");
        self.preflight("partial_close", &plan).await?;
        self.submit("partial_close", &plan).await
    }

    /// Close a position entirely and send everything left to the wallet.
    pub async fn close_position(&self, position: &Position) -> Result<SubmissionOutcome, EngineError> {
        let recipient = self.session.address();
        let strategy = self.builder.close_strategy(position)?;
        info!(container = %position.container_id.short(), ?strategy, "closing position");

        let plan = match strategy {
            CloseStrategy::WithdrawOnly => self.builder.withdraw_only_close(position, recipient),
            CloseStrategy::DirectRepay => {
                let simulation = self.builder.direct_repay_simulation(position)?;
                let left = self.simulate_balances(position, &simulation).await?;
                self.builder
                    .direct_repay_close(position, left.base_asset, left.quote_asset, recipient)?
            }
            CloseStrategy::MarketClose => {
                let simulation = self.builder.market_close_simulation(position)?;
                let left = self.simulate_balances(position, &simulation).await?;
                self.builder
                    .market_close(position, left.base_asset, left.quote_asset, recipient)?
            }
        };
        if plan.is_empty() {
            return Err(EngineError::invalid(format!(
                "nothing to close in {}",
                position.container_id.short()
            )));
        }

        let outcome = self.submit("close", &plan).await?;
        if outcome.is_executed() {
            self.forget(&position.container_id).await;
        }
        Ok(outcome)
    }

    async fn simulate_balances(&self, position: &Position, plan: &TransactionPlan) -> Result<RawBalances, EngineError> {
        let result = self
            .session
            .ledger()
            .simulate(self.session.address(), plan)
            .await?;
        let balances = simulated_balances(&result, &self.markets, position).map_err(|e| match e {
            EngineError::Simulation { reason } => {
                let reason = truncate_message(&reason);
                warn!(container = %position.container_id.short(), %reason, "close simulation rejected");
                EngineError::Simulation { reason }
            }
            other => other,
        })?;
        debug!(
            container = %position.container_id.short(),
            base = balances.base_asset,
            quote = balances.quote_asset,
            "simulated post-repay balances"
        );
        Ok(balances)
    }

    async fn forget(&self, container_id: &ObjectId) {
        if let Err(e) = self.metadata.remove(container_id).await {
            warn!(container = %container_id.short(), error = %e, "failed to remove position metadata");
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Dry-run `plan` and refuse to submit one that would abort.
    async fn preflight(&self, action: &str, plan: &TransactionPlan) -> Result<(), EngineError> {
        let result = self
            .session
            .ledger()
            .simulate(self.session.address(), plan)
            .await?;
        if result.succeeded() {
            return Ok(());
        }
        let reason = truncate_message(result.error.as_deref().unwrap_or("a simulated step failed"));
        warn!(action, %reason, "simulation rejected plan");
        Err(EngineError::Simulation { reason })
    }

    async fn submit(&self, action: &str, plan: &TransactionPlan) -> Result<SubmissionOutcome, EngineError> {
        info!(action, steps = plan.len(), kinds = ?plan.kinds(), "submitting plan");
        match self.session.ledger().execute(self.session.address(), plan).await {
            Ok(effects) => {
                let container_id = extract_created_container(&effects);
                info!(action, digest = %effects.digest, created = effects.created.len(), "plan executed");
                Ok(SubmissionOutcome::Executed {
                    digest: effects.digest,
                    created: effects.created,
                    container_id,
                })
            }
            Err(EngineError::UserRejected) => {
                info!(action, "signer declined plan");
                Ok(SubmissionOutcome::Cancelled)
            }
            Err(EngineError::Execution { message }) => {
                let outcome = SubmissionOutcome::from_failure(&message);
                match &outcome {
                    SubmissionOutcome::Cancelled => info!(action, "signer declined plan"),
                    _ => warn!(action, error = %message, "plan execution failed"),
                }
                Ok(outcome)
            }
            Err(e) => {
                // Transport and other ledger-side failures surface as an
                // outcome too, never as a raw error.
                warn!(action, error = %e, "plan submission failed");
                Ok(SubmissionOutcome::from_failure(&e.to_string()))
            }
        }
    }
}
