//! Shared symbol→USD price map with pairwise conversions.
//!
//! USDC is pinned at exactly $1 and survives both merges and wholesale
//! replacement, so a partial or hostile oracle update can never move it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::constants::USDC_SYMBOL;
use crate::errors::EngineError;
use crate::types::PriceQuote;

/// Thread-safe view over the latest oracle prices.
#[derive(Debug, Clone)]
pub struct PriceView {
    prices: Arc<Mutex<HashMap<String, PriceQuote>>>,
}

impl Default for PriceView {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceView {
    /// A view holding only the pinned USDC quote.
    pub fn new() -> Self {
        let mut prices = HashMap::new();
        prices.insert(USDC_SYMBOL.to_string(), PriceQuote::pinned_usd());
        Self {
            prices: Arc::new(Mutex::new(prices)),
        }
    }

    pub fn from_quotes(quotes: HashMap<String, PriceQuote>) -> Self {
        let view = Self::new();
        view.merge(quotes);
        view
    }

    /// Overlay `update` onto the current prices. Symbols missing from the
    /// update keep their last quote.
    pub fn merge(&self, update: HashMap<String, PriceQuote>) {
        let mut prices = self.prices.lock().expect("price view lock poisoned");
        let count = update.len();
        for (symbol, quote) in update {
            if symbol == USDC_SYMBOL {
                continue;
            }
            prices.insert(symbol, quote);
        }
        debug!(count, total = prices.len(), "merged price update");
    }

    /// Swap in a complete price set.
    pub fn replace(&self, quotes: HashMap<String, PriceQuote>) {
        let mut prices = self.prices.lock().expect("price view lock poisoned");
        prices.clear();
        prices.extend(quotes.into_iter().filter(|(s, _)| s != USDC_SYMBOL));
        prices.insert(USDC_SYMBOL.to_string(), PriceQuote::pinned_usd());
    }

    pub fn quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.prices
            .lock()
            .expect("price view lock poisoned")
            .get(symbol)
            .copied()
    }

    /// Snapshot of every quote.
    pub fn snapshot(&self) -> HashMap<String, PriceQuote> {
        self.prices.lock().expect("price view lock poisoned").clone()
    }

    /// USD price of `symbol`. Missing or non-positive prices are errors.
    pub fn usd(&self, symbol: &str) -> Result<f64, EngineError> {
        self.quote(symbol)
            .filter(PriceQuote::is_usable)
            .map(|q| q.price)
            .ok_or_else(|| EngineError::MissingPrice(symbol.to_string()))
    }

    /// Price of one `base` in `quote` units.
    pub fn pair_price(&self, base: &str, quote: &str) -> Result<f64, EngineError> {
        Ok(self.usd(base)? / self.usd(quote)?)
    }

    /// Convert `amount` of `from` into `to`.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, EngineError> {
        if from == to {
            return Ok(amount);
        }
        Ok(amount * self.pair_price(from, to)?)
    }

    /// USD value of `amount` of `symbol`.
    pub fn value_usd(&self, amount: f64, symbol: &str) -> Result<f64, EngineError> {
        Ok(amount * self.usd(symbol)?)
    }
}
