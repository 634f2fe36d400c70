//! EVM Provider
//! Mission: Read native ETH plus registered ERC-20 token balances through a JSON-RPC node
//!
//! Token reads are isolated from each other and from the native read: a contract that
//! reverts or returns garbage is skipped, everything else is still reported.

use super::{rpc, units, ChainBalanceProvider};
use crate::models::{Asset, Chain};
use crate::pricing::PriceMap;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::debug;

const NATIVE_NAME: &str = "Ethereum";
const NATIVE_SYMBOL: &str = "ETH";
const ORACLE_ID: &str = "ethereum";
const WEI_DECIMALS: u32 = 18;

/// `balanceOf(address)`
const BALANCE_OF_SELECTOR: &str = "0x70a08231";
/// `decimals()`
const DECIMALS_SELECTOR: &str = "0x313ce567";

/// Registered ERC-20 contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmToken {
    pub name: String,
    pub symbol: String,
    pub contract: String,
    pub oracle_id: String,
}

impl EvmToken {
    pub fn new(name: &str, symbol: &str, contract: &str, oracle_id: &str) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            contract: contract.to_string(),
            oracle_id: oracle_id.to_string(),
        }
    }

    /// Mainnet stablecoins valued by default
    pub fn default_registry() -> Vec<EvmToken> {
        vec![
            EvmToken::new(
                "Tether USD",
                "USDT",
                "0xdAC17F958D2ee523a2206206994597C13D831ec7",
                "tether",
            ),
            EvmToken::new(
                "USD Coin",
                "USDC",
                "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                "usd-coin",
            ),
        ]
    }
}

pub struct EvmProvider {
    client: Client,
    endpoints: Vec<String>,
    tokens: Vec<EvmToken>,
}

impl EvmProvider {
    pub fn new(client: Client, endpoints: Vec<String>, tokens: Vec<EvmToken>) -> Self {
        Self {
            client,
            endpoints,
            tokens,
        }
    }

    async fn eth_call(&self, endpoint: &str, to: &str, data: String) -> Result<String> {
        let result = rpc::call(
            &self.client,
            endpoint,
            "eth_call",
            json!([{ "to": to, "data": data }, "latest"]),
        )
        .await?
        .into_result()?;

        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("eth_call result is not a string"))
    }

    async fn native_balance(&self, endpoint: &str, address: &str) -> Result<Decimal> {
        let result = rpc::call(
            &self.client,
            endpoint,
            "eth_getBalance",
            json!([address, "latest"]),
        )
        .await?
        .into_result()?;

        let wei = result
            .as_str()
            .context("eth_getBalance result is not a string")?;
        units::scale_amount(&units::parse_hex_quantity(wei)?, WEI_DECIMALS)
    }

    async fn token_balance(&self, endpoint: &str, token: &EvmToken, address: &str) -> Result<Decimal> {
        let holder = address.trim_start_matches("0x").to_lowercase();
        let balance_call = format!("{BALANCE_OF_SELECTOR}{holder:0>64}");

        let (raw_balance, raw_decimals) = tokio::try_join!(
            self.eth_call(endpoint, &token.contract, balance_call),
            self.eth_call(endpoint, &token.contract, DECIMALS_SELECTOR.to_string()),
        )?;

        let decimals = u32::try_from(&units::parse_hex_quantity(&raw_decimals)?)
            .map_err(|_| anyhow!("decimals() out of range for {}", token.symbol))?;
        units::scale_amount(&units::parse_hex_quantity(&raw_balance)?, decimals)
    }
}

#[async_trait]
impl ChainBalanceProvider for EvmProvider {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn price_ids(&self) -> Vec<String> {
        std::iter::once(ORACLE_ID.to_string())
            .chain(self.tokens.iter().map(|t| t.oracle_id.clone()))
            .collect()
    }

    async fn probe(&self, endpoint: &str) -> Result<()> {
        let result = rpc::call(&self.client, endpoint, "eth_blockNumber", json!([]))
            .await?
            .into_result()?;
        match result {
            Value::String(_) => Ok(()),
            other => Err(anyhow!("unexpected eth_blockNumber result: {other}")),
        }
    }

    async fn get_balances(
        &self,
        endpoint: &str,
        address: &str,
        prices: &PriceMap,
    ) -> Result<Vec<Asset>> {
        let native = self.native_balance(endpoint, address).await?;

        let mut assets = Vec::with_capacity(1 + self.tokens.len());
        if native > Decimal::ZERO {
            assets.push(Asset {
                name: NATIVE_NAME.to_string(),
                symbol: NATIVE_SYMBOL.to_string(),
                chain: Chain::Ethereum,
                quantity: native,
                value: prices.value_of(ORACLE_ID, native),
            });
        }

        let token_reads = self
            .tokens
            .iter()
            .map(|token| async move { (token, self.token_balance(endpoint, token, address).await) });

        for (token, result) in join_all(token_reads).await {
            match result {
                Ok(quantity) if quantity > Decimal::ZERO => assets.push(Asset {
                    name: token.name.clone(),
                    symbol: token.symbol.clone(),
                    chain: Chain::Ethereum,
                    quantity,
                    value: prices.value_of(&token.oracle_id, quantity),
                }),
                Ok(_) => {}
                Err(e) => debug!(token = %token.symbol, %address, "Token balance read failed: {:#}", e),
            }
        }

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    const ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";
    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    fn rpc_result(result: &str) -> String {
        format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{result}"}}"#)
    }

    fn word(value: u64) -> String {
        format!("0x{value:064x}")
    }

    async fn mock_native(server: &mut mockito::ServerGuard, wei_hex: &str) -> mockito::Mock {
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_getBalance" })))
            .with_status(200)
            .with_body(rpc_result(wei_hex))
            .create_async()
            .await
    }

    async fn mock_call(server: &mut mockito::ServerGuard, contract: &str, selector: &str, body: String) -> mockito::Mock {
        server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({ "method": "eth_call" })),
                Matcher::Regex(format!(r#""to":"{contract}""#)),
                Matcher::Regex(format!(r#""data":"{selector}"#)),
            ]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_token_only_wallet() {
        let mut server = mockito::Server::new_async().await;
        let _native = mock_native(&mut server, "0x0").await;
        let _usdc_balance = mock_call(&mut server, USDC, BALANCE_OF_SELECTOR, rpc_result(&word(1_000_000))).await;
        let _usdc_decimals = mock_call(&mut server, USDC, DECIMALS_SELECTOR, rpc_result(&word(6))).await;
        let _usdt_balance = mock_call(&mut server, USDT, BALANCE_OF_SELECTOR, rpc_result(&word(0))).await;
        let _usdt_decimals = mock_call(&mut server, USDT, DECIMALS_SELECTOR, rpc_result(&word(6))).await;

        let provider = EvmProvider::new(Client::new(), vec![server.url()], EvmToken::default_registry());
        let prices = PriceMap::degraded(crate::config::default_stable_prices());

        let assets = provider
            .get_balances(&server.url(), ADDRESS, &prices)
            .await
            .unwrap();

        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].symbol, "USDC");
        assert_eq!(assets[0].quantity, dec!(1.0));
        assert_eq!(assets[0].value, dec!(1.0));
    }

    #[tokio::test]
    async fn test_failing_token_is_isolated() {
        let mut server = mockito::Server::new_async().await;
        let _native = mock_native(&mut server, "0xde0b6b3a7640000").await;
        let _usdc_balance = mock_call(&mut server, USDC, BALANCE_OF_SELECTOR, rpc_result(&word(2_500_000))).await;
        let _usdc_decimals = mock_call(&mut server, USDC, DECIMALS_SELECTOR, rpc_result(&word(6))).await;
        let _usdt_balance = mock_call(
            &mut server,
            USDT,
            BALANCE_OF_SELECTOR,
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"execution reverted"}}"#.to_string(),
        )
        .await;
        let _usdt_decimals = mock_call(&mut server, USDT, DECIMALS_SELECTOR, rpc_result("0x")).await;

        let provider = EvmProvider::new(Client::new(), vec![server.url()], EvmToken::default_registry());
        let prices = PriceMap::default()
            .with_price("ethereum", dec!(2000))
            .with_price("usd-coin", dec!(1));

        let assets = provider
            .get_balances(&server.url(), ADDRESS, &prices)
            .await
            .unwrap();

        let symbols: Vec<&str> = assets.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ETH", "USDC"]);
        assert_eq!(assets[0].value, dec!(2000));
        assert_eq!(assets[1].quantity, dec!(2.5));
    }

    #[tokio::test]
    async fn test_native_failure_fails_query() {
        let mut server = mockito::Server::new_async().await;
        let _native = server
            .mock("POST", "/")
            .with_status(502)
            .create_async()
            .await;

        let provider = EvmProvider::new(Client::new(), vec![server.url()], Vec::new());
        let result = provider
            .get_balances(&server.url(), ADDRESS, &PriceMap::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_probe_block_number() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_blockNumber" })))
            .with_status(200)
            .with_body(rpc_result("0x12a05f2"))
            .create_async()
            .await;

        let provider = EvmProvider::new(Client::new(), vec![server.url()], Vec::new());
        assert!(provider.probe(&server.url()).await.is_ok());
    }

    #[test]
    fn test_price_ids_include_tokens() {
        let provider = EvmProvider::new(Client::new(), Vec::new(), EvmToken::default_registry());
        assert_eq!(provider.price_ids(), vec!["ethereum", "tether", "usd-coin"]);
    }
}
