//! Oracle price feeds.
//!
//! [`HermesOracle`] pulls the latest parsed price updates for every
//! configured feed in one HTTP request. [`spawn_price_subscription`] polls it
//! on an interval and forwards each (possibly partial) map on a channel;
//! [`run_price_view_updater`] drains that channel into a [`PriceView`].
//! Both stop at cancellation, and an update that lands after cancellation is
//! dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CoinConfig, OracleConfig};
use crate::constants::USDC_SYMBOL;
use crate::core::price_view::PriceView;
use crate::errors::EngineError;
use crate::types::PriceQuote;

pub type PriceUpdate = HashMap<String, PriceQuote>;

#[async_trait]
pub trait OracleService: Send + Sync {
    /// Latest price for every feed the oracle knows. Symbols it could not
    /// price are absent.
    async fn fetch_prices(&self) -> Result<PriceUpdate, EngineError>;
}

// ---------------------------------------------------------------------------
// Hermes HTTP client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LatestPriceResponse {
    #[serde(default)]
    parsed: Vec<ParsedFeed>,
}

#[derive(Debug, Deserialize)]
struct ParsedFeed {
    id: String,
    price: FeedPrice,
}

/// Price and confidence are integer strings scaled by `10^expo`.
#[derive(Debug, Deserialize)]
struct FeedPrice {
    price: String,
    conf: String,
    expo: i32,
    publish_time: i64,
}

pub struct HermesOracle {
    http: reqwest::Client,
    endpoint: String,
    /// Normalised feed id → symbol.
    feeds: HashMap<String, String>,
}

impl HermesOracle {
    /// Build a client for every coin with a feed id. USDC is never fetched.
    pub fn new<'a>(
        config: &OracleConfig,
        coins: impl IntoIterator<Item = &'a CoinConfig>,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        let feeds = coins
            .into_iter()
            .filter(|c| c.symbol != USDC_SYMBOL)
            .filter_map(|c| {
                c.oracle_feed_id
                    .as_deref()
                    .map(|id| (normalize_feed_id(id), c.symbol.clone()))
            })
            .collect::<HashMap<_, _>>();
        info!(feeds = feeds.len(), base_url = %config.base_url, "oracle client configured");
        Ok(Self {
            http,
            endpoint: format!(
                "{}/v2/updates/price/latest",
                config.base_url.trim_end_matches('/')
            ),
            feeds,
        })
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }
}

#[async_trait]
impl OracleService for HermesOracle {
    async fn fetch_prices(&self) -> Result<PriceUpdate, EngineError> {
        if self.feeds.is_empty() {
            return Ok(PriceUpdate::new());
        }

        let mut query: Vec<(&str, &str)> = self.feeds.keys().map(|id| ("ids[]", id.as_str())).collect();
        query.push(("parsed", "true"));

        let resp = self.http.get(&self.endpoint).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, body = %body, "oracle request failed");
            return Err(EngineError::Oracle {
                reason: format!("HTTP {status} from {}", self.endpoint),
            });
        }

        let body: LatestPriceResponse = resp.json().await?;
        let prices = parse_price_update(&body, &self.feeds);
        debug!(requested = self.feeds.len(), received = prices.len(), "oracle prices fetched");
        Ok(prices)
    }
}

fn normalize_feed_id(id: &str) -> String {
    id.trim().trim_start_matches("0x").to_lowercase()
}

fn scaled(raw: &str, expo: i32) -> Option<f64> {
    let value = raw.trim().parse::<i64>().ok()?;
    Some(value as f64 * 10f64.powi(expo))
}

/// Map parsed feeds back to symbols, dropping unknown feeds and unusable
/// prices.
fn parse_price_update(body: &LatestPriceResponse, feeds: &HashMap<String, String>) -> PriceUpdate {
    let mut prices = PriceUpdate::new();
    for feed in &body.parsed {
        let Some(symbol) = feeds.get(&normalize_feed_id(&feed.id)) else {
            debug!(feed = %feed.id, "ignoring unrequested feed");
            continue;
        };
        let (Some(price), Some(confidence)) = (
            scaled(&feed.price.price, feed.price.expo),
            scaled(&feed.price.conf, feed.price.expo),
        ) else {
            warn!(symbol = %symbol, price = %feed.price.price, "unparseable oracle price");
            continue;
        };
        let quote = PriceQuote::new(price, confidence, feed.price.publish_time);
        if !quote.is_usable() {
            warn!(symbol = %symbol, price, "unusable oracle price");
            continue;
        }
        prices.insert(symbol.clone(), quote);
    }
    prices
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Poll `oracle` every `interval` and forward non-empty updates until
/// `cancel` fires or the receiver is dropped.
pub fn spawn_price_subscription(
    oracle: Arc<dyn OracleService>,
    interval: Duration,
    cancel: CancellationToken,
) -> (mpsc::Receiver<PriceUpdate>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = oracle.fetch_prices() => result,
            };
            match result {
                Ok(update) if update.is_empty() => debug!("empty oracle update"),
                Ok(update) => {
                    if tx.send(update).await.is_err() {
                        debug!("price receiver dropped");
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "oracle poll failed"),
            }
        }
        debug!("price subscription stopped");
    });
    (rx, handle)
}

/// Merge every received update into `view` until cancelled or the channel
/// closes. Returns the number of updates applied.
pub async fn run_price_view_updater(
    view: PriceView,
    mut updates: mpsc::Receiver<PriceUpdate>,
    cancel: CancellationToken,
) -> usize {
    let mut applied = 0;
    loop {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            update = updates.recv() => update,
        };
        let Some(update) = update else { break };
        if cancel.is_cancelled() {
            break;
        }
        view.merge(update);
        applied += 1;
    }
    debug!(applied, "price view updater stopped");
    applied
}
