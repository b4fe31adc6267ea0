pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Load and merge all config JSON files into a single [`EngineConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   network.json
///   markets.json
///   oracle.json
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                       | Config Field                     |
/// |-------------------------------|----------------------------------|
/// | `MARGIN_ORACLE_URL`           | `oracle.base_url`                |
/// | `MARGIN_ORACLE_POLL_SECONDS`  | `oracle.poll_interval_seconds`   |
/// | `MARGIN_RPC_URL`              | `network.rpc_url`                |
/// | `MARGIN_STORE_BACKEND`        | `app.store.backend`              |
/// | `MARGIN_STORE_PATH`           | `app.store.path`                 |
/// | `MARGIN_LOG_DIR`              | `app.logging.log_dir`            |
pub fn load_config(config_dir: &Path) -> Result<EngineConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig = serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let network: NetworkConfig =
        serde_json::from_str(&read("network.json")?).context("parsing network.json")?;

    let markets: MarketsConfig =
        serde_json::from_str(&read("markets.json")?).context("parsing markets.json")?;

    let oracle: OracleConfig =
        serde_json::from_str(&read("oracle.json")?).context("parsing oracle.json")?;

    let mut config = EngineConfig {
        app,
        network,
        markets,
        oracle,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Only non-empty env vars take effect. Parse failures are skipped and the
/// JSON value remains.
fn apply_env_overrides(config: &mut EngineConfig) {
    // -- Oracle --------------------------------------------------------------
    if let Some(val) = env_string("MARGIN_ORACLE_URL") {
        info!("env override: MARGIN_ORACLE_URL");
        config.oracle.base_url = val;
    }

    if let Some(val) = env_parse::<u64>("MARGIN_ORACLE_POLL_SECONDS") {
        info!(val, "env override: MARGIN_ORACLE_POLL_SECONDS");
        config.oracle.poll_interval_seconds = val;
    }

    // -- Network -------------------------------------------------------------
    if let Some(val) = env_string("MARGIN_RPC_URL") {
        info!("env override: MARGIN_RPC_URL");
        config.network.rpc_url = val;
    }

    // -- Store / logging -----------------------------------------------------
    if let Some(val) = env_string("MARGIN_STORE_BACKEND").and_then(|v| parse_backend(&v)) {
        info!(backend = ?val, "env override: MARGIN_STORE_BACKEND");
        config.app.store.backend = val;
    }

    if let Some(val) = env_string("MARGIN_STORE_PATH") {
        info!(path = %val, "env override: MARGIN_STORE_PATH");
        config.app.store.path = val;
    }

    if let Some(val) = env_string("MARGIN_LOG_DIR") {
        info!(dir = %val, "env override: MARGIN_LOG_DIR");
        config.app.logging.log_dir = val;
    }
}

fn parse_backend(value: &str) -> Option<StoreBackend> {
    match value.to_lowercase().as_str() {
        "memory" => Some(StoreBackend::Memory),
        "json" => Some(StoreBackend::Json),
        "sqlite" => Some(StoreBackend::Sqlite),
        _ => None,
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}
