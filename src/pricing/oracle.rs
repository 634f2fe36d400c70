//! Price Oracle Client
//! Mission: Fetch fiat prices for a set of coin ids in a single request, degrading to zero on failure

use super::PriceMap;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that can price a set of coin ids in one call
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Decimal>>;
}

/// CoinGecko-compatible `simple/price` endpoint
pub struct CoinGeckoSource {
    client: Client,
    base_url: String,
    vs_currency: String,
    timeout: Duration,
}

impl CoinGeckoSource {
    pub fn new(client: Client, base_url: &str, vs_currency: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_lowercase(),
            timeout,
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Decimal>> {
        let url = format!("{}/simple/price", self.base_url);
        let joined = ids.join(",");

        let body: serde_json::Value = self
            .client
            .get(&url)
            .query(&[("ids", joined.as_str()), ("vs_currencies", self.vs_currency.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .context("price oracle request failed")?
            .error_for_status()
            .context("price oracle returned an error status")?
            .json()
            .await
            .context("failed to parse price oracle response")?;

        let object = body
            .as_object()
            .context("price oracle response is not an object")?;

        let mut prices = HashMap::with_capacity(object.len());
        for (id, quote) in object {
            let Some(serde_json::Value::Number(number)) = quote.get(&self.vs_currency) else {
                continue;
            };
            match parse_price(&number.to_string()) {
                Some(price) if price >= Decimal::ZERO => {
                    prices.insert(id.clone(), price);
                }
                _ => debug!(%id, "Ignoring unusable oracle price {}", number),
            }
        }

        Ok(prices)
    }
}

/// JSON numbers are rendered shortest-form, so parsing the text keeps 0.1 as exactly 0.1
fn parse_price(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

/// Wraps a price source with the fallback table; never fails the caller
pub struct PriceOracleClient {
    source: Arc<dyn PriceSource>,
    defaults: HashMap<String, Decimal>,
}

impl PriceOracleClient {
    pub fn new(source: Arc<dyn PriceSource>, defaults: HashMap<String, Decimal>) -> Self {
        Self { source, defaults }
    }

    pub async fn get_prices(&self, ids: &BTreeSet<String>) -> PriceMap {
        if ids.is_empty() {
            return PriceMap::degraded(self.defaults.clone());
        }

        let ids: Vec<String> = ids.iter().cloned().collect();
        match self.source.fetch(&ids).await {
            Ok(prices) => {
                if prices.len() < ids.len() {
                    debug!(
                        requested = ids.len(),
                        priced = prices.len(),
                        "Oracle returned partial prices"
                    );
                }
                PriceMap::new(prices, self.defaults.clone())
            }
            Err(e) => {
                warn!(
                    "⚠️  Price oracle degraded, valuing with fallback prices only: {:#}",
                    e
                );
                PriceMap::degraded(self.defaults.clone())
            }
        }
    }
}
