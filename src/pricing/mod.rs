//! Fiat Pricing
//! Mission: One price fetch per batch, shared read-only by every valuation in it

pub mod oracle;

pub use oracle::{CoinGeckoSource, PriceOracleClient, PriceSource};

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

/// Oracle prices keyed by coin id, with per-id fallbacks for oracle misses
#[derive(Debug, Clone, Default)]
pub struct PriceMap {
    prices: HashMap<String, Decimal>,
    defaults: HashMap<String, Decimal>,
}

impl PriceMap {
    pub fn new(prices: HashMap<String, Decimal>, defaults: HashMap<String, Decimal>) -> Self {
        Self { prices, defaults }
    }

    /// No oracle data at all; only the fallback table applies
    pub fn degraded(defaults: HashMap<String, Decimal>) -> Self {
        Self {
            prices: HashMap::new(),
            defaults,
        }
    }

    pub fn with_price(mut self, id: &str, price: Decimal) -> Self {
        self.prices.insert(id.to_string(), price);
        self
    }

    /// Oracle price, else the configured default, else zero
    pub fn price_of(&self, id: &str) -> Decimal {
        self.prices
            .get(id)
            .or_else(|| self.defaults.get(id))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Quantity times price; a product beyond the decimal range is clamped to `Decimal::MAX`
    pub fn value_of(&self, id: &str, quantity: Decimal) -> Decimal {
        let price = self.price_of(id);
        quantity.checked_mul(price).unwrap_or_else(|| {
            warn!(%id, %quantity, %price, "Asset value overflowed, clamping to the decimal maximum");
            Decimal::MAX
        })
    }

    /// Number of ids the oracle actually priced
    pub fn oracle_len(&self) -> usize {
        self.prices.len()
    }
}
