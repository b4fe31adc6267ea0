use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use margin_engine::config::{self, EngineConfig};
use margin_engine::core::metadata_store::PositionMetadataStore;
use margin_engine::core::price_view::PriceView;
use margin_engine::core::risk::{liquidation_price, min_collateral_usd};
use margin_engine::execution::kv_store::open_store;
use margin_engine::execution::oracle_client::{
    run_price_view_updater, spawn_price_subscription, HermesOracle, OracleService,
};
use margin_engine::logging;
use margin_engine::types::PositionSide;

/// Exposure used for the per-pool minimum collateral report.
const REFERENCE_EXPOSURE_USD: f64 = 1_000.0;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("MARGIN_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));
    let watch = std::env::args().any(|a| a == "--watch");

    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    info!(
        network = %config.network.network_name,
        rpc_url = %config.network.rpc_url,
        margin_package = %config.network.margin_package_id,
        margin_registry = %config.network.margin_registry_id,
        pools = config.markets.pools.len(),
        coins = config.markets.coins.len(),
        "margin engine starting"
    );

    // -----------------------------------------------------------------------
    // Local metadata
    // -----------------------------------------------------------------------

    let store = open_store(&config.app.store)
        .await
        .context("failed to open metadata store")?;
    let metadata = PositionMetadataStore::new(store);
    info!(records = metadata.all().await.len(), "position metadata loaded");

    // -----------------------------------------------------------------------
    // Prices
    // -----------------------------------------------------------------------

    let oracle = Arc::new(
        HermesOracle::new(&config.oracle, config.markets.coins.values())
            .context("failed to build oracle client")?,
    );
    let prices = PriceView::new();
    match oracle.fetch_prices().await {
        Ok(update) => {
            info!(symbols = update.len(), "initial prices fetched");
            prices.merge(update);
        }
        Err(e) => warn!(error = %e, "initial price fetch failed, liquidation prices unavailable"),
    }

    report_risk_bounds(&config, &prices)?;

    if watch {
        watch_prices(&config, oracle, prices).await?;
    }

    info!("shutdown complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Log leverage caps, minimum collateral and liquidation prices per pool.
fn report_risk_bounds(config: &EngineConfig, prices: &PriceView) -> Result<()> {
    for pool in &config.markets.pools {
        let params = config
            .markets
            .risk_params(&pool.id)
            .with_context(|| format!("risk params for {}", pool.name))?;
        let long_cap = params.max_leverage(PositionSide::Long);
        let short_cap = params.max_leverage(PositionSide::Short);

        info!(
            pool = %pool.name,
            min_borrow_risk_ratio = params.min_borrow_risk_ratio(),
            liquidation_risk_ratio = params.liquidation_risk_ratio(),
            max_leverage_long = long_cap,
            max_leverage_short = short_cap,
            reference_exposure_usd = REFERENCE_EXPOSURE_USD,
            min_collateral_usd = min_collateral_usd(REFERENCE_EXPOSURE_USD, params.min_borrow_risk_ratio()),
            "pool risk bounds"
        );

        let Ok(base_price) = prices.usd(&pool.base_symbol) else {
            warn!(pool = %pool.name, base = %pool.base_symbol, "no price, skipping liquidation report");
            continue;
        };
        for (side, leverage) in [(PositionSide::Long, long_cap), (PositionSide::Short, short_cap)] {
            let exposure = REFERENCE_EXPOSURE_USD;
            let debt = exposure * (leverage - 1.0) / leverage;
            info!(
                pool = %pool.name,
                side = side.as_str(),
                leverage,
                base_price,
                liquidation_price = liquidation_price(
                    base_price,
                    debt,
                    exposure,
                    params.liquidation_risk_ratio(),
                    side,
                ),
                "liquidation price at max leverage"
            );
        }
    }
    Ok(())
}

/// Keep prices fresh until Ctrl+C.
async fn watch_prices(config: &EngineConfig, oracle: Arc<HermesOracle>, prices: PriceView) -> Result<()> {
    let shutdown = CancellationToken::new();
    let interval = Duration::from_secs(config.oracle.poll_interval_seconds);
    let (updates, poller) = spawn_price_subscription(oracle, interval, shutdown.clone());
    let updater = tokio::spawn(run_price_view_updater(prices, updates, shutdown.clone()));

    info!(interval_seconds = config.oracle.poll_interval_seconds, "watching prices, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("shutdown signal received, stopping gracefully...");
    shutdown.cancel();

    let (poll_res, update_res) = tokio::join!(poller, updater);
    if let Err(e) = poll_res {
        error!(error = %e, "price subscription task panicked");
    }
    match update_res {
        Ok(applied) => info!(applied, "price updates applied"),
        Err(e) => error!(error = %e, "price updater task panicked"),
    }
    Ok(())
}
