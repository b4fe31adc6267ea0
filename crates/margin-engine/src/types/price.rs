use serde::{Deserialize, Serialize};

/// One oracle price observation for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// USD price.
    pub price: f64,
    /// Oracle confidence interval, in USD.
    pub confidence: f64,
    /// Publish time, unix seconds.
    pub timestamp: i64,
}

impl PriceQuote {
    pub fn new(price: f64, confidence: f64, timestamp: i64) -> Self {
        Self {
            price,
            confidence,
            timestamp,
        }
    }

    /// The pinned USDC quote: exactly $1 with zero confidence.
    pub fn pinned_usd() -> Self {
        Self {
            price: 1.0,
            confidence: 0.0,
            timestamp: 0,
        }
    }

    /// Whether the price can be used for conversions.
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}
