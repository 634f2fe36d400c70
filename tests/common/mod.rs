//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ledgerlens_backend::chains::{ChainBalanceProvider, EndpointSelector};
use ledgerlens_backend::config::default_stable_prices;
use ledgerlens_backend::models::{Asset, Chain};
use ledgerlens_backend::portfolio::{AggregatorSettings, PortfolioAggregator};
use ledgerlens_backend::pricing::{PriceMap, PriceOracleClient, PriceSource};
use ledgerlens_backend::store::{MemoryAccountStore, MemoryPhraseStore};
use ledgerlens_backend::wallet::AddressResolver;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const PHRASE: &str = "test test test test test test test test test test test junk";

/// Balance provider driven by a per-address table, counting every probe and query
pub struct ScriptedProvider {
    chain: Chain,
    endpoints: Vec<String>,
    healthy: bool,
    balances: Mutex<HashMap<String, Decimal>>,
    delay: Duration,
    panic_on: Option<String>,
    probes: AtomicUsize,
    queries: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            endpoints: vec![
                format!("mock://{}/primary", chain),
                format!("mock://{}/fallback", chain),
            ],
            healthy: true,
            balances: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            panic_on: None,
            probes: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn down(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn panicking_on(mut self, address: &str) -> Self {
        self.panic_on = Some(address.to_string());
        self
    }

    pub fn with_balance(self, address: &str, quantity: Decimal) -> Self {
        self.balances.lock().insert(address.to_string(), quantity);
        self
    }

    pub fn symbol(chain: Chain) -> &'static str {
        match chain {
            Chain::Stellar => "XLM",
            Chain::Ripple => "XRP",
            Chain::Ethereum => "ETH",
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainBalanceProvider for ScriptedProvider {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn price_ids(&self) -> Vec<String> {
        vec![self.chain.as_str().to_string()]
    }

    async fn probe(&self, _endpoint: &str) -> Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.healthy {
            Ok(())
        } else {
            Err(anyhow!("connection refused"))
        }
    }

    async fn get_balances(&self, _endpoint: &str, address: &str, prices: &PriceMap) -> Result<Vec<Asset>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_on.as_deref() == Some(address) {
            panic!("scripted provider blew up for {address}");
        }

        let quantity = self.balances.lock().get(address).copied();
        Ok(match quantity {
            Some(quantity) if quantity > Decimal::ZERO => vec![Asset {
                name: self.chain.as_str().to_string(),
                symbol: Self::symbol(self.chain).to_string(),
                chain: self.chain,
                quantity,
                value: prices.value_of(self.chain.as_str(), quantity),
            }],
            _ => Vec::new(),
        })
    }
}

/// Oracle returning a fixed table (or failing), counting calls
#[derive(Default)]
pub struct ScriptedOracle {
    prices: HashMap<String, Decimal>,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn with_prices(prices: &[(&str, Decimal)]) -> Self {
        Self {
            prices: prices.iter().map(|(id, p)| (id.to_string(), *p)).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedOracle {
    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("oracle returned 503"));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.prices.get(id).map(|p| (id.clone(), *p)))
            .collect())
    }
}

pub struct Harness {
    pub accounts: Arc<MemoryAccountStore>,
    pub phrases: Arc<MemoryPhraseStore>,
    pub oracle: Arc<ScriptedOracle>,
    pub engine: PortfolioAggregator,
}

pub fn harness(
    accounts: Vec<ledgerlens_backend::models::Account>,
    providers: Vec<Arc<dyn ChainBalanceProvider>>,
    oracle: ScriptedOracle,
) -> Harness {
    harness_with_timeout(accounts, providers, oracle, Duration::from_secs(2))
}

pub fn harness_with_timeout(
    accounts: Vec<ledgerlens_backend::models::Account>,
    providers: Vec<Arc<dyn ChainBalanceProvider>>,
    oracle: ScriptedOracle,
    balance_timeout: Duration,
) -> Harness {
    let accounts = Arc::new(MemoryAccountStore::with_accounts(accounts));
    let phrases = Arc::new(MemoryPhraseStore::new());
    let oracle = Arc::new(oracle);

    let engine = PortfolioAggregator::new(
        accounts.clone(),
        AddressResolver::new(accounts.clone(), phrases.clone()),
        providers,
        PriceOracleClient::new(oracle.clone(), default_stable_prices()),
        EndpointSelector::new(Duration::from_millis(200)),
        AggregatorSettings {
            balance_timeout,
            query_concurrency: 4,
            account_concurrency: 3,
            ..AggregatorSettings::default()
        },
    );

    Harness {
        accounts,
        phrases,
        oracle,
        engine,
    }
}
