//! Stellar Horizon Provider
//! Mission: Read the native XLM balance of an account through a Horizon REST endpoint

use super::ChainBalanceProvider;
use crate::models::{Asset, Chain};
use crate::pricing::PriceMap;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

const NATIVE_NAME: &str = "Stellar Lumens";
const NATIVE_SYMBOL: &str = "XLM";
const ORACLE_ID: &str = "stellar";

#[derive(Debug, Deserialize)]
struct HorizonAccount {
    #[serde(default)]
    balances: Vec<HorizonBalance>,
}

#[derive(Debug, Deserialize)]
struct HorizonBalance {
    balance: String,
    asset_type: String,
}

pub struct StellarProvider {
    client: Client,
    endpoints: Vec<String>,
}

impl StellarProvider {
    pub fn new(client: Client, endpoints: Vec<String>) -> Self {
        Self { client, endpoints }
    }
}

fn base(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}

#[async_trait]
impl ChainBalanceProvider for StellarProvider {
    fn chain(&self) -> Chain {
        Chain::Stellar
    }

    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn price_ids(&self) -> Vec<String> {
        vec![ORACLE_ID.to_string()]
    }

    async fn probe(&self, endpoint: &str) -> Result<()> {
        self.client
            .get(format!("{}/", base(endpoint)))
            .send()
            .await
            .context("Horizon probe failed")?
            .error_for_status()
            .context("Horizon probe returned an error status")?;
        Ok(())
    }

    async fn get_balances(
        &self,
        endpoint: &str,
        address: &str,
        prices: &PriceMap,
    ) -> Result<Vec<Asset>> {
        let response = self
            .client
            .get(format!("{}/accounts/{}", base(endpoint), address))
            .send()
            .await
            .context("Horizon account request failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(%address, "Account not on the Stellar network yet");
            return Ok(Vec::new());
        }

        let account: HorizonAccount = response
            .error_for_status()
            .context("Horizon account request returned an error status")?
            .json()
            .await
            .context("failed to parse Horizon account")?;

        let Some(native) = account.balances.iter().find(|b| b.asset_type == "native") else {
            return Ok(Vec::new());
        };

        // Horizon already renders display units with 7 fractional digits
        let quantity = Decimal::from_str(native.balance.trim())
            .with_context(|| format!("invalid XLM balance: {}", native.balance))?;
        if quantity <= Decimal::ZERO {
            return Ok(Vec::new());
        }

        Ok(vec![Asset {
            name: NATIVE_NAME.to_string(),
            symbol: NATIVE_SYMBOL.to_string(),
            chain: Chain::Stellar,
            quantity,
            value: prices.value_of(ORACLE_ID, quantity),
        }])
    }
}
