//! Position discovery.
//!
//! Flow for one wallet:
//! 1. Registry read: container ids owned by the wallet.
//! 2. Per container, a state read against every configured pool, all in
//!    flight at once. The ledger rejects reads against the wrong pool, so
//!    exactly one is expected to answer. All probes settle before a winner is
//!    picked.
//! 3. Decode the winning state, scale to display units, resolve side and
//!    collateral (local hint first, inference second), filter out dust.
//!
//! A container that fails any step is logged and skipped. It never aborts
//! discovery of the others.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decoder::ManagerState;
use super::metadata_store::PositionMetadataStore;
use super::risk;
use super::units::native_to_f64;
use crate::config::{MarketsConfig, PoolConfig};
use crate::constants::{DUST_EQUITY_USD, NEGLIGIBLE_AMOUNT, RISK_RATIO_SCALE};
use crate::errors::EngineError;
use crate::execution::session::WalletSession;
use crate::types::{
    ContainerRef, HintSource, ObjectId, PlanStep, Position, PositionMetadataRecord, PositionSide,
    RawPayload, TransactionPlan,
};

/// One-step plan that reads a container's state through `pool`.
pub fn state_read_plan(container: &ObjectId, pool_id: &ObjectId) -> TransactionPlan {
    let mut plan = TransactionPlan::new();
    plan.push(PlanStep::ReadState {
        container: ContainerRef::Existing(container.clone()),
        pool_id: pool_id.clone(),
    });
    plan
}

pub struct PositionDiscovery {
    session: WalletSession,
    markets: Arc<MarketsConfig>,
    metadata: PositionMetadataStore,
}

impl PositionDiscovery {
    pub fn new(
        session: WalletSession,
        markets: Arc<MarketsConfig>,
        metadata: PositionMetadataStore,
    ) -> Self {
        Self {
            session,
            markets,
            metadata,
        }
    }

    /// Every active position of the connected wallet.
    ///
    /// Only the registry read can fail the whole call.
    pub async fn discover(&self) -> Result<Vec<Position>, EngineError> {
        let owner = self.session.address();
        let containers = self.session.ledger().owned_containers(owner).await?;
        if containers.is_empty() {
            debug!(wallet = %owner.short(), "no position containers");
            return Ok(Vec::new());
        }

        let hints: HashMap<ObjectId, PositionMetadataRecord> = self
            .metadata
            .all()
            .await
            .into_iter()
            .map(|r| (r.container_id.clone(), r))
            .collect();

        let mut positions = Vec::new();
        for container in &containers {
            let Some((pool, values)) = self.probe_container(container).await else {
                warn!(container = %container.short(), "no pool accepted container, skipping");
                continue;
            };

            let state = match ManagerState::decode(&values) {
                Ok(state) => state,
                Err(e) => {
                    warn!(container = %container.short(), pool = %pool.name, error = %e, "state decode failed, skipping");
                    continue;
                }
            };

            match build_position(&self.markets, pool, container, &state, hints.get(container)) {
                Ok(Some(position)) => positions.push(position),
                Ok(None) => {
                    debug!(container = %container.short(), pool = %pool.name, "container empty, filtered");
                }
                Err(e) => {
                    warn!(container = %container.short(), pool = %pool.name, error = %e, "position build failed, skipping");
                }
            }
        }

        info!(
            wallet = %owner.short(),
            containers = containers.len(),
            positions = positions.len(),
            "discovery complete"
        );
        Ok(positions)
    }

    /// [`discover`](Self::discover) that yields [`EngineError::Cancelled`]
    /// once `cancel` fires, dropping any result still in flight.
    pub async fn discover_until_cancelled(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Position>, EngineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("discovery cancelled");
                Err(EngineError::Cancelled)
            }
            result = self.discover() => {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                result
            }
        }
    }

    /// The wallet's container for `pool_id`, including emptied ones that
    /// discovery filters out. Local hints are checked before probing.
    pub async fn container_for_pool(&self, pool_id: &ObjectId) -> Result<Option<ObjectId>, EngineError> {
        let owner = self.session.address();
        let owned = self.session.ledger().owned_containers(owner).await?;

        let hinted = self
            .metadata
            .all()
            .await
            .into_iter()
            .find(|r| &r.pool_id == pool_id && owned.contains(&r.container_id));
        if let Some(record) = hinted {
            return Ok(Some(record.container_id));
        }

        for container in &owned {
            if self.probe_pool(container, pool_id).await.is_some() {
                return Ok(Some(container.clone()));
            }
        }
        Ok(None)
    }

    /// Probe `container` against every pool concurrently and wait for all.
    async fn probe_container(&self, container: &ObjectId) -> Option<(&PoolConfig, Vec<RawPayload>)> {
        let probes = self
            .markets
            .pools
            .iter()
            .map(|pool| async move { (pool, self.probe_pool(container, &pool.id).await) });

        let results = futures::future::join_all(probes).await;

        let mut hits = results
            .into_iter()
            .filter_map(|(pool, values)| values.map(|v| (pool, v)));
        let first = hits.next();
        let extra = hits.count();
        if extra > 0 {
            warn!(container = %container.short(), extra, "container accepted by several pools, using first");
        }
        first
    }

    /// Return values of a state read, or `None` when the pool rejected it.
    async fn probe_pool(&self, container: &ObjectId, pool_id: &ObjectId) -> Option<Vec<RawPayload>> {
        let plan = state_read_plan(container, pool_id);
        match self
            .session
            .ledger()
            .simulate(self.session.address(), &plan)
            .await
        {
            Ok(result) if result.succeeded() => result.last_return_values().map(<[RawPayload]>::to_vec),
            Ok(result) => {
                debug!(
                    container = %container.short(),
                    pool = %pool_id.short(),
                    reason = result.error.as_deref().unwrap_or("call failed"),
                    "probe miss"
                );
                None
            }
            Err(e) => {
                warn!(container = %container.short(), pool = %pool_id.short(), error = %e, "probe request failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Turn a decoded state into a [`Position`], or `None` when it is dust.
pub fn build_position(
    markets: &MarketsConfig,
    pool: &PoolConfig,
    container: &ObjectId,
    state: &ManagerState,
    hint: Option<&PositionMetadataRecord>,
) -> Result<Option<Position>, EngineError> {
    let base_decimals = markets.decimals(&pool.base_symbol)?;
    let quote_decimals = markets.decimals(&pool.quote_symbol)?;
    let raw = state.balances;

    let base_asset = native_to_f64(raw.base_asset, base_decimals)?;
    let quote_asset = native_to_f64(raw.quote_asset, quote_decimals)?;
    let base_debt = native_to_f64(raw.base_debt, base_decimals)?;
    let quote_debt = native_to_f64(raw.quote_debt, quote_decimals)?;

    if [base_asset, quote_asset, base_debt, quote_debt]
        .iter()
        .all(|v| *v <= NEGLIGIBLE_AMOUNT)
    {
        return Ok(None);
    }

    let base_price = native_to_f64(state.base_price_raw, state.base_price_exponent)?;
    let quote_price = native_to_f64(state.quote_price_raw, state.quote_price_exponent)?;

    let assets_usd = base_asset * base_price + quote_asset * quote_price;
    let debts_usd = base_debt * base_price + quote_debt * quote_price;
    let has_debt = raw.base_debt > 0 || raw.quote_debt > 0;

    if !has_debt && assets_usd - debts_usd < DUST_EQUITY_USD {
        return Ok(None);
    }

    let (side, collateral_symbol, hint_source) = match hint {
        Some(record) => (
            record.side,
            record.collateral_asset_symbol.clone(),
            HintSource::Metadata,
        ),
        None => {
            let side = if raw.quote_debt > 0 {
                PositionSide::Long
            } else {
                PositionSide::Short
            };
            let collateral = if raw.base_asset > 0 {
                pool.base_symbol.clone()
            } else {
                pool.quote_symbol.clone()
            };
            (side, collateral, HintSource::Inferred)
        }
    };

    let risk_ratio = if has_debt {
        state.risk_ratio_raw as f64 / RISK_RATIO_SCALE
    } else {
        f64::INFINITY
    };

    let params = markets.risk_params(&pool.id)?;
    let liquidation_price = risk::liquidation_price(
        base_price,
        debts_usd,
        assets_usd,
        params.liquidation_risk_ratio(),
        side,
    );

    Ok(Some(Position {
        container_id: container.clone(),
        pool_id: pool.id.clone(),
        pool_name: pool.name.clone(),
        base_symbol: pool.base_symbol.clone(),
        quote_symbol: pool.quote_symbol.clone(),
        side,
        collateral_symbol,
        hint_source,
        base_asset,
        quote_asset,
        base_debt,
        quote_debt,
        raw,
        base_price,
        quote_price,
        risk_ratio,
        assets_usd,
        debts_usd,
        liquidation_price,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    use crate::config::tests::{test_markets, DEEP_USDC_POOL, SUI_USDC_POOL};
    use crate::core::decoder::tests::manager_state_payloads;
    use crate::execution::kv_store::MemoryStore;
    use crate::execution::ledger::mock::MockLedger;
    use crate::types::RawBalances;

    const WALLET: &str = "0xfeed";

    fn id(s: &str) -> ObjectId {
        ObjectId::parse(s).unwrap()
    }

    fn setup() -> (Arc<MockLedger>, PositionDiscovery, PositionMetadataStore) {
        let ledger = Arc::new(MockLedger::new());
        let session = WalletSession::connect(WALLET, ledger.clone()).unwrap();
        let metadata = PositionMetadataStore::new(Arc::new(MemoryStore::new()));
        let discovery = PositionDiscovery::new(session, Arc::new(test_markets()), metadata.clone());
        (ledger, discovery, metadata)
    }

    /// SUI at $3.50 and USDC at $1, 8-digit exponents.
    fn sui_state(ledger: &MockLedger, container: &ObjectId, balances: RawBalances, risk_raw: u64) {
        let pool = id(SUI_USDC_POOL);
        ledger.own(container);
        ledger.set_state(
            container,
            &pool,
            manager_state_payloads(container, &pool, risk_raw, balances, (350_000_000, 8), (100_000_000, 8)),
        );
    }

    fn long_balances() -> RawBalances {
        // 30 SUI held, 60 USDC borrowed.
        RawBalances {
            base_asset: 30_000_000_000,
            quote_asset: 0,
            base_debt: 0,
            quote_debt: 60_000_000,
        }
    }

    #[tokio::test]
    async fn test_empty_wallet_is_not_an_error() {
        let (_, discovery, _) = setup();
        assert!(discovery.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discovers_long_by_inference() {
        let (ledger, discovery, _) = setup();
        let c = id("0xc1");
        sui_state(&ledger, &c, long_balances(), 1_750_000_000);

        let positions = discovery.discover().await.unwrap();
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert_eq!(p.pool_name, "SUI_USDC");
        assert_eq!(p.side, PositionSide::Long);
        assert_eq!(p.collateral_symbol, "SUI");
        assert_eq!(p.hint_source, HintSource::Inferred);
        assert_eq!(p.base_asset, 30.0);
        assert_eq!(p.quote_debt, 60.0);
        assert_eq!(p.base_price, 3.5);
        assert_eq!(p.risk_ratio, 1.75);
        assert!((p.assets_usd - 105.0).abs() < 1e-9);
        assert!((p.debts_usd - 60.0).abs() < 1e-9);
        // 3.5 * 1.1 * 60 / 105
        assert!((p.liquidation_price - 2.2).abs() < 1e-9);

        // One probe per configured pool.
        assert_eq!(ledger.simulate_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_metadata_hint_wins_over_inference() {
        let (ledger, discovery, metadata) = setup();
        let c = id("0xc1");
        sui_state(&ledger, &c, long_balances(), 1_750_000_000);
        metadata
            .put(PositionMetadataRecord {
                container_id: c.clone(),
                pool_id: id(SUI_USDC_POOL),
                side: PositionSide::Long,
                collateral_asset_symbol: "USDC".into(),
                created_at: 1,
            })
            .await
            .unwrap();

        let p = &discovery.discover().await.unwrap()[0];
        assert_eq!(p.collateral_symbol, "USDC");
        assert_eq!(p.hint_source, HintSource::Metadata);
    }

    #[tokio::test]
    async fn test_short_inferred_without_quote_debt() {
        let (ledger, discovery, _) = setup();
        let c = id("0xc1");
        sui_state(
            &ledger,
            &c,
            RawBalances {
                base_asset: 0,
                quote_asset: 150_000_000,
                base_debt: 20_000_000_000,
                quote_debt: 0,
            },
            2_100_000_000,
        );
        let p = &discovery.discover().await.unwrap()[0];
        assert_eq!(p.side, PositionSide::Short);
        assert_eq!(p.collateral_symbol, "USDC");
    }

    #[tokio::test]
    async fn test_unmatched_and_undecodable_containers_are_skipped() {
        let (ledger, discovery, _) = setup();
        let good = id("0xc1");
        sui_state(&ledger, &good, long_balances(), 1_750_000_000);

        // Owned but no pool answers.
        ledger.own(&id("0xc2"));

        // Answers with a short response.
        let short = id("0xc3");
        ledger.own(&short);
        ledger.set_state(&short, &id(DEEP_USDC_POOL), vec![RawPayload::Bytes(vec![0; 8]); 4]);

        let positions = discovery.discover().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].container_id, good);
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent() {
        let (ledger, discovery, _) = setup();
        sui_state(&ledger, &id("0xc1"), long_balances(), 1_750_000_000);
        let deep = id("0xc2");
        ledger.own(&deep);
        ledger.set_state(
            &deep,
            &id(DEEP_USDC_POOL),
            manager_state_payloads(
                &deep,
                &id(DEEP_USDC_POOL),
                u64::MAX,
                RawBalances {
                    base_asset: 500_000_000,
                    quote_asset: 0,
                    base_debt: 0,
                    quote_debt: 0,
                },
                (20_000_000, 8),
                (100_000_000, 8),
            ),
        );

        let first: HashSet<ObjectId> = discovery
            .discover()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.container_id)
            .collect();
        let second: HashSet<ObjectId> = discovery
            .discover()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.container_id)
            .collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancellation_discards_results() {
        let (ledger, discovery, _) = setup();
        sui_state(&ledger, &id("0xc1"), long_balances(), 1_750_000_000);
        *ledger.probe_delay.lock().unwrap() = Some(Duration::from_millis(200));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = discovery.discover_until_cancelled(&cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_pool_reads_for_a_container_run_concurrently() {
        let (ledger, discovery, _) = setup();
        let c = id("0xc1");
        let deep = id(DEEP_USDC_POOL);
        ledger.own(&c);
        // 2000 DEEP held, 50 USDC borrowed. Only the second pool answers.
        ledger.set_state(
            &c,
            &deep,
            manager_state_payloads(
                &c,
                &deep,
                1_600_000_000,
                RawBalances {
                    base_asset: 2_000_000_000,
                    quote_asset: 0,
                    base_debt: 0,
                    quote_debt: 50_000_000,
                },
                (5_000_000, 7),
                (100_000_000, 8),
            ),
        );
        *ledger.probe_delay.lock().unwrap() = Some(Duration::from_millis(150));

        let started = Instant::now();
        let positions = discovery.discover().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(ledger.simulate_calls.load(Ordering::SeqCst), 2);
        // One at a time would take at least 300ms.
        assert!(elapsed < Duration::from_millis(280), "took {elapsed:?}");
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].pool_id, deep);
        assert_eq!(positions[0].pool_name, "DEEP_USDC");
        assert_eq!(positions[0].base_asset, 2_000.0);
    }

    #[tokio::test]
    async fn test_dust_debt_still_counts_as_debt() {
        let (ledger, discovery, _) = setup();
        let c = id("0xc1");
        // 30 SUI held, 0.00005 USDC still owed.
        sui_state(
            &ledger,
            &c,
            RawBalances {
                quote_debt: 50,
                ..long_balances()
            },
            u64::MAX / 2,
        );

        let positions = discovery.discover().await.unwrap();
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert!(p.has_debt());
        assert_eq!(p.side, PositionSide::Long);
        assert!(p.risk_ratio.is_finite());
        assert!(p.liquidation_price > 0.0);
    }

    #[tokio::test]
    async fn test_container_for_pool_finds_emptied_container() {
        let (ledger, discovery, _) = setup();
        let c = id("0xc1");
        sui_state(&ledger, &c, RawBalances::default(), 0);

        assert!(discovery.discover().await.unwrap().is_empty());
        assert_eq!(
            discovery.container_for_pool(&id(SUI_USDC_POOL)).await.unwrap(),
            Some(c)
        );
        assert_eq!(discovery.container_for_pool(&id(DEEP_USDC_POOL)).await.unwrap(), None);
    }

    // -----------------------------------------------------------------------
    // Filtering boundary
    // -----------------------------------------------------------------------

    fn state_with_base(base_raw: u64, base_price: u64) -> ManagerState {
        ManagerState {
            container_id: id("0xc1"),
            pool_id: id(SUI_USDC_POOL),
            risk_ratio_raw: u64::MAX,
            balances: RawBalances {
                base_asset: base_raw,
                ..RawBalances::default()
            },
            base_price_raw: base_price,
            base_price_exponent: 0,
            quote_price_raw: 1,
            quote_price_exponent: 0,
        }
    }

    #[test]
    fn test_filter_drops_negligible_balance() {
        let markets = test_markets();
        let pool = markets.pool(&id(SUI_USDC_POOL)).unwrap();
        // 0.00005 SUI
        let state = state_with_base(50_000, 100_000);
        let built = build_position(&markets, pool, &id("0xc1"), &state, None).unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_filter_keeps_small_but_real_balance() {
        let markets = test_markets();
        let pool = markets.pool(&id(SUI_USDC_POOL)).unwrap();
        // 0.0002 SUI at $100_000 is $20 of equity.
        let state = state_with_base(200_000, 100_000);
        let p = build_position(&markets, pool, &id("0xc1"), &state, None)
            .unwrap()
            .unwrap();
        assert!((p.base_asset - 0.0002).abs() < 1e-12);
        assert_eq!(p.risk_ratio, f64::INFINITY);
        assert_eq!(p.collateral_symbol, "SUI");
    }

    #[test]
    fn test_filter_drops_debt_free_dust_equity() {
        let markets = test_markets();
        let pool = markets.pool(&id(SUI_USDC_POOL)).unwrap();
        // 0.001 SUI at $1 is $0.001 of equity and no debt.
        let state = state_with_base(1_000_000, 1);
        assert!(build_position(&markets, pool, &id("0xc1"), &state, None)
            .unwrap()
            .is_none());
    }
}
