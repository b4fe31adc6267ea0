use anyhow::{bail, Result};
use rust_decimal::Decimal;
use std::collections::HashSet;

use super::types::{EngineConfig, StoreBackend};
use crate::constants::USDC_SYMBOL;
use crate::core::risk::RiskParams;

/// Largest coin precision the native-unit conversions support.
const MAX_COIN_DECIMALS: u8 = 18;

/// Validate invariants across the merged config that serde alone cannot enforce.
///
/// Called automatically by [`super::load_config`].
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_app_config(config, &mut errors);
    validate_network_config(config, &mut errors);
    validate_markets_config(config, &mut errors);
    validate_oracle_config(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// App config
// ---------------------------------------------------------------------------

fn validate_app_config(config: &EngineConfig, errors: &mut Vec<String>) {
    let app = &config.app;

    if app.logging.log_dir.is_empty() {
        errors.push("app.logging: log_dir is empty".into());
    }

    if app.store.backend != StoreBackend::Memory && app.store.path.is_empty() {
        errors.push(format!(
            "app.store: path is required for the {:?} backend",
            app.store.backend
        ));
    }
}

// ---------------------------------------------------------------------------
// Network config
// ---------------------------------------------------------------------------

fn validate_network_config(config: &EngineConfig, errors: &mut Vec<String>) {
    if config.network.rpc_url.is_empty() {
        errors.push("network: rpc_url is empty".into());
    }
}

// ---------------------------------------------------------------------------
// Markets config
// ---------------------------------------------------------------------------

fn validate_markets_config(config: &EngineConfig, errors: &mut Vec<String>) {
    let markets = &config.markets;

    if markets.pools.is_empty() {
        errors.push("markets: pools must not be empty".into());
    }

    if !markets.coins.contains_key(USDC_SYMBOL) {
        errors.push(format!("markets.coins: {USDC_SYMBOL} must be configured"));
    }

    for (key, coin) in &markets.coins {
        if key != &coin.symbol {
            errors.push(format!(
                "markets.coins.{key}: symbol field ({}) does not match its key",
                coin.symbol
            ));
        }
        if coin.decimals > MAX_COIN_DECIMALS {
            errors.push(format!(
                "markets.coins.{key}: decimals ({}) exceeds {MAX_COIN_DECIMALS}",
                coin.decimals
            ));
        }
    }

    let mut seen = HashSet::new();
    for pool in &markets.pools {
        if !seen.insert(&pool.id) {
            errors.push(format!("markets.pools.{}: duplicate pool id {}", pool.name, pool.id));
        }
        for symbol in [&pool.base_symbol, &pool.quote_symbol] {
            if !markets.coins.contains_key(symbol) {
                errors.push(format!(
                    "markets.pools.{}: coin {symbol} is not configured",
                    pool.name
                ));
            }
        }
        if pool.base_symbol == pool.quote_symbol {
            errors.push(format!(
                "markets.pools.{}: base and quote must differ",
                pool.name
            ));
        }
        if pool.min_size <= Decimal::ZERO {
            errors.push(format!(
                "markets.pools.{}: min_size ({}) must be > 0",
                pool.name, pool.min_size
            ));
        }
        if pool.tick_size <= Decimal::ZERO {
            errors.push(format!(
                "markets.pools.{}: tick_size ({}) must be > 0",
                pool.name, pool.tick_size
            ));
        }
    }

    for (pool_id, params) in &markets.risk_params {
        if !markets.pools.iter().any(|p| &p.id == pool_id) {
            errors.push(format!("markets.risk_params.{pool_id}: unknown pool"));
        }
        if let Err(e) = RiskParams::new(params.min_borrow_risk_ratio, params.liquidation_risk_ratio)
        {
            errors.push(format!("markets.risk_params.{pool_id}: {e}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Oracle config
// ---------------------------------------------------------------------------

fn validate_oracle_config(config: &EngineConfig, errors: &mut Vec<String>) {
    let oracle = &config.oracle;

    if oracle.base_url.is_empty() {
        errors.push("oracle: base_url is empty".into());
    }
    if oracle.poll_interval_seconds == 0 {
        errors.push("oracle: poll_interval_seconds must be > 0".into());
    }
    if oracle.request_timeout_seconds == 0 {
        errors.push("oracle: request_timeout_seconds must be > 0".into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_markets;
    use crate::config::types::*;
    use crate::types::ObjectId;
    use rust_decimal_macros::dec;

    fn valid_config() -> EngineConfig {
        EngineConfig {
            app: AppConfig {
                logging: LoggingConfig {
                    log_dir: "logs".into(),
                    filter: None,
                },
                store: StoreConfig {
                    backend: StoreBackend::Memory,
                    path: String::new(),
                },
            },
            network: NetworkConfig {
                network_name: "testnet".into(),
                rpc_url: "http://localhost:9000".into(),
                margin_package_id: ObjectId::parse("0x1").unwrap(),
                margin_registry_id: ObjectId::parse("0x2").unwrap(),
            },
            markets: test_markets(),
            oracle: OracleConfig {
                base_url: "http://localhost:8080".into(),
                poll_interval_seconds: 10,
                request_timeout_seconds: 5,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_rejects_pool_with_unknown_coin() {
        let mut config = valid_config();
        config.markets.pools[0].base_symbol = "BTC".into();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("coin BTC is not configured"), "got: {err}");
    }

    #[test]
    fn test_rejects_zero_tick_and_min_size() {
        let mut config = valid_config();
        config.markets.pools[0].tick_size = dec!(0);
        config.markets.pools[1].min_size = dec!(-1);
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("2 errors"), "got: {err}");
        assert!(err.contains("tick_size"));
        assert!(err.contains("min_size"));
    }

    #[test]
    fn test_rejects_inverted_risk_params() {
        let mut config = valid_config();
        let pool_id = config.markets.pools[0].id.clone();
        config.markets.risk_params.insert(
            pool_id,
            RiskParamsConfig {
                min_borrow_risk_ratio: 1.1,
                liquidation_risk_ratio: 1.3,
            },
        );
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("markets.risk_params"), "got: {err}");
    }

    #[test]
    fn test_rejects_missing_usdc_and_excess_decimals() {
        let mut config = valid_config();
        config.markets.coins.remove("USDC");
        if let Some(sui) = config.markets.coins.get_mut("SUI") {
            sui.decimals = 24;
        }
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("USDC must be configured"), "got: {err}");
        assert!(err.contains("exceeds 18"));
    }

    #[test]
    fn test_file_backend_requires_path() {
        let mut config = valid_config();
        config.app.store.backend = StoreBackend::Sqlite;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("path is required"), "got: {err}");
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let mut config = valid_config();
        config.oracle.poll_interval_seconds = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("poll_interval_seconds"), "got: {err}");
    }
}
