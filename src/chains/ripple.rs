//! Ripple Provider
//! Mission: Read the native XRP balance of an account through a rippled JSON-RPC endpoint

use super::{rpc, units, ChainBalanceProvider};
use crate::models::{Asset, Chain};
use crate::pricing::PriceMap;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::debug;

const NATIVE_NAME: &str = "XRP";
const NATIVE_SYMBOL: &str = "XRP";
const ORACLE_ID: &str = "ripple";
/// 1 XRP = 10^6 drops
const DROPS_DECIMALS: u32 = 6;

pub struct RippleProvider {
    client: Client,
    endpoints: Vec<String>,
}

impl RippleProvider {
    pub fn new(client: Client, endpoints: Vec<String>) -> Self {
        Self { client, endpoints }
    }
}

/// rippled nests failures inside `result` as `{ "status": "error", "error": "<code>" }`
fn result_error(result: &Value) -> Option<&str> {
    result.get("error").and_then(Value::as_str)
}

#[async_trait]
impl ChainBalanceProvider for RippleProvider {
    fn chain(&self) -> Chain {
        Chain::Ripple
    }

    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn price_ids(&self) -> Vec<String> {
        vec![ORACLE_ID.to_string()]
    }

    async fn probe(&self, endpoint: &str) -> Result<()> {
        let result = rpc::call(&self.client, endpoint, "server_info", json!([{}]))
            .await?
            .into_result()?;

        match result_error(&result) {
            Some(code) => Err(anyhow!("server_info error: {code}")),
            None => Ok(()),
        }
    }

    async fn get_balances(
        &self,
        endpoint: &str,
        address: &str,
        prices: &PriceMap,
    ) -> Result<Vec<Asset>> {
        let params = json!([{
            "account": address,
            "ledger_index": "validated",
            "strict": true
        }]);
        let result = rpc::call(&self.client, endpoint, "account_info", params)
            .await?
            .into_result()?;

        match result_error(&result) {
            Some("actNotFound") => {
                debug!(%address, "Account not on the XRP ledger yet");
                return Ok(Vec::new());
            }
            Some(code) => return Err(anyhow!("account_info error: {code}")),
            None => {}
        }

        let drops = result
            .pointer("/account_data/Balance")
            .and_then(Value::as_str)
            .context("account_info result has no Balance")?;

        let quantity = units::scale_amount(&units::parse_integer(drops)?, DROPS_DECIMALS)?;
        if quantity <= Decimal::ZERO {
            return Ok(Vec::new());
        }

        Ok(vec![Asset {
            name: NATIVE_NAME.to_string(),
            symbol: NATIVE_SYMBOL.to_string(),
            chain: Chain::Ripple,
            quantity,
            value: prices.value_of(ORACLE_ID, quantity),
        }])
    }
}
