//! Engine Configuration
//! Mission: Collect endpoints, timeouts, and fan-out limits from the environment once at startup

use crate::models::Chain;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ORACLE_URL: &str = "https://api.coingecko.com/api/v3";

pub const PUBLIC_HORIZON_ENDPOINTS: &[&str] = &["https://horizon.stellar.org"];

pub const PUBLIC_RIPPLE_ENDPOINTS: &[&str] = &[
    "https://s1.ripple.com:51234/",
    "https://s2.ripple.com:51234/",
    "https://xrplcluster.com/",
];

pub const PUBLIC_EVM_ENDPOINTS: &[&str] = &[
    "https://eth.llamarpc.com",
    "https://cloudflare-eth.com",
    "https://rpc.ankr.com/eth",
];

/// Runtime configuration for the valuation engine and its server
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub accounts_db_path: String,
    pub jwt_secret: String,
    pub bind_addr: String,

    /// Candidate endpoints per chain, in priority order
    pub stellar_endpoints: Vec<String>,
    pub ripple_endpoints: Vec<String>,
    pub evm_endpoints: Vec<String>,

    pub oracle_url: String,
    pub vs_currency: String,
    /// Per-oracle-id fallback price used when the oracle has no entry
    pub stable_price_defaults: HashMap<String, Decimal>,

    pub probe_timeout: Duration,
    pub balance_timeout: Duration,
    pub oracle_timeout: Duration,

    /// Max concurrent balance queries inside one account valuation
    pub query_concurrency: usize,
    /// Max concurrent account valuations in bulk mode
    pub account_concurrency: usize,

    pub enabled_chains: Vec<Chain>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accounts_db_path: "portfolio_accounts.db".to_string(),
            jwt_secret: "dev-secret-change-in-production-minimum-32-characters".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            stellar_endpoints: with_private_endpoint(None, PUBLIC_HORIZON_ENDPOINTS),
            ripple_endpoints: with_private_endpoint(None, PUBLIC_RIPPLE_ENDPOINTS),
            evm_endpoints: with_private_endpoint(None, PUBLIC_EVM_ENDPOINTS),
            oracle_url: DEFAULT_ORACLE_URL.to_string(),
            vs_currency: "usd".to_string(),
            stable_price_defaults: default_stable_prices(),
            probe_timeout: Duration::from_millis(2_000),
            balance_timeout: Duration::from_millis(10_000),
            oracle_timeout: Duration::from_millis(10_000),
            query_concurrency: 8,
            account_concurrency: 4,
            enabled_chains: Chain::ALL.to_vec(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = env::var("ACCOUNTS_DB_PATH") {
            config.accounts_db_path = v;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            config.jwt_secret = v;
        }
        if let Ok(v) = env::var("BIND_ADDR") {
            config.bind_addr = v;
        }

        config.stellar_endpoints = with_private_endpoint(
            env::var("STELLAR_HORIZON_URL").ok(),
            PUBLIC_HORIZON_ENDPOINTS,
        );
        config.ripple_endpoints =
            with_private_endpoint(env::var("RIPPLE_RPC_URL").ok(), PUBLIC_RIPPLE_ENDPOINTS);
        config.evm_endpoints = with_private_endpoint(
            env::var("EVM_RPC_URL")
                .or_else(|_| env::var("WEB3_PROVIDER"))
                .ok(),
            PUBLIC_EVM_ENDPOINTS,
        );

        if let Ok(v) = env::var("PRICE_ORACLE_URL") {
            config.oracle_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("PRICE_VS_CURRENCY") {
            config.vs_currency = v.to_lowercase();
        }
        if let Ok(v) = env::var("STABLE_PRICE_DEFAULTS") {
            config.stable_price_defaults = parse_price_defaults(&v);
        }

        if let Some(ms) = env_u64("PROBE_TIMEOUT_MS") {
            config.probe_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("BALANCE_TIMEOUT_MS") {
            config.balance_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("ORACLE_TIMEOUT_MS") {
            config.oracle_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("QUERY_CONCURRENCY") {
            config.query_concurrency = n as usize;
        }
        if let Some(n) = env_u64("ACCOUNT_CONCURRENCY") {
            config.account_concurrency = n as usize;
        }

        if let Ok(v) = env::var("ENABLED_CHAINS") {
            let chains: Vec<Chain> = v.split(',').filter_map(Chain::from_str).collect();
            if !chains.is_empty() {
                config.enabled_chains = chains;
            }
        }

        config.normalized()
    }

    /// Clamp fan-out to at least one and keep probes strictly shorter than balance queries
    pub fn normalized(mut self) -> Self {
        self.query_concurrency = self.query_concurrency.max(1);
        self.account_concurrency = self.account_concurrency.max(1);
        if self.balance_timeout.is_zero() {
            self.balance_timeout = Duration::from_millis(1);
        }
        if self.probe_timeout >= self.balance_timeout {
            self.probe_timeout = self.balance_timeout / 4;
        }
        self.enabled_chains.sort();
        self.enabled_chains.dedup();
        self
    }

    pub fn endpoints_for(&self, chain: Chain) -> &[String] {
        match chain {
            Chain::Stellar => &self.stellar_endpoints,
            Chain::Ripple => &self.ripple_endpoints,
            Chain::Ethereum => &self.evm_endpoints,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

/// Private endpoint (when configured) goes ahead of the public fallbacks
fn with_private_endpoint(private: Option<String>, public: &[&str]) -> Vec<String> {
    let mut endpoints = Vec::with_capacity(public.len() + 1);
    if let Some(url) = private.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
        endpoints.push(url);
    }
    for url in public {
        if !endpoints.iter().any(|e| e == url) {
            endpoints.push(url.to_string());
        }
    }
    endpoints
}

pub fn default_stable_prices() -> HashMap<String, Decimal> {
    let mut defaults = HashMap::new();
    defaults.insert("tether".to_string(), Decimal::ONE);
    defaults.insert("usd-coin".to_string(), Decimal::ONE);
    defaults
}

/// Parse `tether=1,usd-coin=1` style tables; malformed pairs are skipped
pub fn parse_price_defaults(raw: &str) -> HashMap<String, Decimal> {
    raw.split(',')
        .filter_map(|pair| {
            let (id, price) = pair.split_once('=')?;
            let id = id.trim();
            let price = Decimal::from_str(price.trim()).ok()?;
            if id.is_empty() || price < Decimal::ZERO {
                return None;
            }
            Some((id.to_lowercase(), price))
        })
        .collect()
}
