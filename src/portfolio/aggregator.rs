//! Portfolio Aggregator
//! Mission: Resolve addresses, fan out balance queries, price and sort the result
//!
//! Two phases per account. Resolution may heal and persist missing addresses; valuation
//! that follows is read-only and only touches the batch it was given.

use super::{Batch, PortfolioError};
use crate::chains::{
    settle_all, ChainBalanceProvider, EndpointSelector, EvmProvider, EvmToken, OutcomeSummary,
    QueryOutcome, RippleProvider, StellarProvider,
};
use crate::config::EngineConfig;
use crate::models::{
    checked_total, Account, AccountPortfolio, BulkPortfolioResult, Chain, PortfolioResult, PortfolioView,
    TotalValueSummary,
};
use crate::pricing::{CoinGeckoSource, PriceOracleClient};
use crate::store::{AccountStore, RecoveryPhraseStore};
use crate::wallet::{AddressResolver, ResolvedAddresses};
use futures_util::FutureExt;
use reqwest::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub balance_timeout: Duration,
    pub query_concurrency: usize,
    pub account_concurrency: usize,
    pub enabled_chains: Vec<Chain>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl AggregatorSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            balance_timeout: config.balance_timeout,
            query_concurrency: config.query_concurrency.max(1),
            account_concurrency: config.account_concurrency.max(1),
            enabled_chains: config.enabled_chains.clone(),
        }
    }
}

pub struct PortfolioAggregator {
    accounts: Arc<dyn AccountStore>,
    resolver: AddressResolver,
    providers: BTreeMap<Chain, Arc<dyn ChainBalanceProvider>>,
    oracle: PriceOracleClient,
    selector: EndpointSelector,
    settings: AggregatorSettings,
}

impl PortfolioAggregator {
    /// Providers for chains outside `settings.enabled_chains` are dropped
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        resolver: AddressResolver,
        providers: Vec<Arc<dyn ChainBalanceProvider>>,
        oracle: PriceOracleClient,
        selector: EndpointSelector,
        settings: AggregatorSettings,
    ) -> Self {
        let providers = providers
            .into_iter()
            .filter(|p| settings.enabled_chains.contains(&p.chain()))
            .map(|p| (p.chain(), p))
            .collect();

        Self {
            accounts,
            resolver,
            providers,
            oracle,
            selector,
            settings,
        }
    }

    /// Production wiring: one shared HTTP client, the three public-chain providers, CoinGecko pricing
    pub fn from_config(
        config: &EngineConfig,
        client: Client,
        accounts: Arc<dyn AccountStore>,
        phrases: Arc<dyn RecoveryPhraseStore>,
    ) -> Self {
        let providers: Vec<Arc<dyn ChainBalanceProvider>> = vec![
            Arc::new(StellarProvider::new(
                client.clone(),
                config.endpoints_for(Chain::Stellar).to_vec(),
            )),
            Arc::new(RippleProvider::new(
                client.clone(),
                config.endpoints_for(Chain::Ripple).to_vec(),
            )),
            Arc::new(EvmProvider::new(
                client.clone(),
                config.endpoints_for(Chain::Ethereum).to_vec(),
                EvmToken::default_registry(),
            )),
        ];

        let source = CoinGeckoSource::new(
            client,
            &config.oracle_url,
            &config.vs_currency,
            config.oracle_timeout,
        );
        let oracle = PriceOracleClient::new(Arc::new(source), config.stable_price_defaults.clone());

        Self::new(
            accounts.clone(),
            AddressResolver::new(accounts, phrases),
            providers,
            oracle,
            EndpointSelector::new(config.probe_timeout),
            AggregatorSettings::from_config(config),
        )
    }

    pub fn chains(&self) -> Vec<Chain> {
        self.providers.keys().copied().collect()
    }

    /// Single-account valuation
    pub async fn value_account(&self, account_id: &Uuid) -> Result<PortfolioResult, PortfolioError> {
        let account = self.load_account(account_id).await?;

        let resolved = self.resolver.resolve_all(&account, &self.chains()).await;
        if resolved.is_empty() {
            debug!(account = %account.id, "No resolvable address on any chain");
            return Ok(PortfolioResult::empty());
        }

        let batch = self.open_batch().await;
        Ok(self.value_resolved(&account, &resolved, &batch).await)
    }

    /// Every account with an address, one shared batch. Operators only.
    pub async fn value_all(&self, requesting_id: &Uuid) -> Result<BulkPortfolioResult, PortfolioError> {
        let requester = self.load_account(requesting_id).await?;
        if !requester.is_operator() {
            warn!(account = %requester.id, "Bulk valuation refused for non-operator");
            return Err(PortfolioError::Forbidden);
        }

        let accounts = self.accounts.find_many_with_any_address().await?;
        let started = Instant::now();
        info!(accounts = accounts.len(), "📊 Bulk valuation started");

        let batch = self.open_batch().await;
        let entries: Vec<_> = accounts
            .into_iter()
            .map(|account| self.value_entry(account, &batch))
            .collect();
        let results = settle_all(entries, self.settings.account_concurrency).await;

        let total = checked_total(results.iter().map(|r| r.portfolio.total_value));
        info!(
            accounts = results.len(),
            total = %total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "📊 Bulk valuation finished"
        );
        debug!(endpoints = ?batch.endpoints.resolved(), "Batch endpoint selections");

        Ok(results)
    }

    /// Platform-wide total. Operators only.
    pub async fn total_value(&self, requesting_id: &Uuid) -> Result<TotalValueSummary, PortfolioError> {
        let portfolios = self.value_all(requesting_id).await?;

        Ok(TotalValueSummary {
            total_portfolio_value: checked_total(portfolios.iter().map(|p| p.portfolio.total_value)),
            account_count: portfolios.len(),
        })
    }

    /// Operators see everyone, other roles see their own portfolio
    pub async fn view(&self, requesting_id: &Uuid) -> Result<PortfolioView, PortfolioError> {
        let requester = self.load_account(requesting_id).await?;

        if requester.is_operator() {
            let portfolios = self.value_all(requesting_id).await?;
            Ok(PortfolioView {
                is_operator: true,
                portfolio: None,
                portfolios: Some(portfolios),
            })
        } else {
            let portfolio = self.value_account(requesting_id).await?;
            Ok(PortfolioView {
                is_operator: false,
                portfolio: Some(portfolio),
                portfolios: None,
            })
        }
    }

    async fn load_account(&self, id: &Uuid) -> Result<Account, PortfolioError> {
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or(PortfolioError::AccountNotFound(*id))
    }

    /// One oracle request and a fresh endpoint record
    async fn open_batch(&self) -> Batch {
        let ids: BTreeSet<String> = self
            .providers
            .values()
            .flat_map(|p| p.price_ids())
            .collect();

        let prices = self.oracle.get_prices(&ids).await;
        debug!(requested = ids.len(), priced = prices.oracle_len(), "Batch prices loaded");

        Batch::new(prices, self.providers.keys().copied())
    }

    /// Panics outside the per-chain guard (resolution, pricing) degrade to an empty portfolio for that account
    async fn value_entry(&self, account: Account, batch: &Batch) -> AccountPortfolio {
        let portfolio = AssertUnwindSafe(self.value_with_batch(&account, batch))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                warn!(account = %account.id, "Account valuation panicked, reporting empty portfolio");
                PortfolioResult::empty()
            });

        AccountPortfolio {
            id: account.id,
            username: account.username,
            email: account.email,
            portfolio,
        }
    }

    async fn value_with_batch(&self, account: &Account, batch: &Batch) -> PortfolioResult {
        let resolved = self.resolver.resolve_all(account, &self.chains()).await;
        if resolved.is_empty() {
            return PortfolioResult::empty();
        }
        self.value_resolved(account, &resolved, batch).await
    }

    /// Read-only phase: query, price, sort, total
    async fn value_resolved(
        &self,
        account: &Account,
        resolved: &ResolvedAddresses,
        batch: &Batch,
    ) -> PortfolioResult {
        let mut queries = Vec::with_capacity(resolved.addresses.len());
        for (chain, address) in &resolved.addresses {
            if let Some(provider) = self.providers.get(chain) {
                queries.push(self.query_chain(provider.as_ref(), address, batch));
            }
        }

        let mut outcomes = settle_all(queries, self.settings.query_concurrency).await;
        outcomes.extend(resolved.unresolved.iter().map(|_| QueryOutcome::NotFound));

        let summary = OutcomeSummary::from_outcomes(&outcomes);
        if summary.has_failures() {
            warn!(account = %account.id, queries = summary.total(), %summary, "Partial portfolio");
        } else {
            debug!(account = %account.id, queries = summary.total(), %summary, "Portfolio queries settled");
        }

        let assets = outcomes
            .into_iter()
            .flat_map(QueryOutcome::into_assets)
            .collect();
        PortfolioResult::from_assets(assets)
    }

    async fn query_chain(
        &self,
        provider: &dyn ChainBalanceProvider,
        address: &str,
        batch: &Batch,
    ) -> QueryOutcome {
        let chain = provider.chain();

        let Some(endpoint) = batch.endpoints.get_or_select(&self.selector, provider).await else {
            return QueryOutcome::Unavailable;
        };

        let read = timeout(
            self.settings.balance_timeout,
            provider.get_balances(&endpoint, address, &batch.prices),
        );

        // A panicking provider costs this chain only, never the sibling queries
        match AssertUnwindSafe(read).catch_unwind().await {
            Ok(Ok(Ok(assets))) => QueryOutcome::Success(assets),
            Ok(Ok(Err(e))) => {
                warn!(%chain, %endpoint, "Balance query failed: {:#}", e);
                QueryOutcome::Failed(format!("{e:#}"))
            }
            Ok(Err(_)) => {
                warn!(%chain, %endpoint, "Balance query timed out after {:?}", self.settings.balance_timeout);
                QueryOutcome::TimedOut
            }
            Err(_) => {
                warn!(%chain, %endpoint, "Balance query panicked");
                QueryOutcome::Failed("provider panicked".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountRole, Asset};
    use crate::pricing::{PriceMap, PriceSource};
    use crate::store::{MemoryAccountStore, MemoryPhraseStore};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        chain: Chain,
        endpoints: Vec<String>,
        quantity: Decimal,
        fail: bool,
        queries: AtomicUsize,
    }

    impl FixedProvider {
        fn new(chain: Chain, quantity: Decimal) -> Self {
            Self {
                chain,
                endpoints: vec!["mock://node".to_string()],
                quantity,
                fail: false,
                queries: AtomicUsize::new(0),
            }
        }

        fn failing(chain: Chain) -> Self {
            Self {
                fail: true,
                ..Self::new(chain, Decimal::ZERO)
            }
        }
    }

    #[async_trait]
    impl ChainBalanceProvider for FixedProvider {
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
            Ok(())
        }

        async fn get_balances(&self, _: &str, _: &str, prices: &PriceMap) -> Result<Vec<Asset>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("node exploded"));
            }
            Ok(vec![Asset {
                name: self.chain.as_str().to_string(),
                symbol: self.chain.as_str().to_uppercase(),
                chain: self.chain,
                quantity: self.quantity,
                value: prices.value_of(self.chain.as_str(), self.quantity),
            }])
        }
    }

    struct FixedPrices;

    #[async_trait]
    impl PriceSource for FixedPrices {
        async fn fetch(&self, _ids: &[String]) -> Result<HashMap<String, Decimal>> {
            let mut prices = HashMap::new();
            prices.insert("stellar".to_string(), dec!(0.10));
            prices.insert("ripple".to_string(), dec!(0.50));
            Ok(prices)
        }
    }

    fn aggregator(
        accounts: Vec<Account>,
        providers: Vec<Arc<dyn ChainBalanceProvider>>,
    ) -> PortfolioAggregator {
        let accounts: Arc<MemoryAccountStore> = Arc::new(MemoryAccountStore::with_accounts(accounts));
        let phrases = Arc::new(MemoryPhraseStore::new());
        PortfolioAggregator::new(
            accounts.clone(),
            AddressResolver::new(accounts, phrases),
            providers,
            PriceOracleClient::new(Arc::new(FixedPrices), HashMap::new()),
            EndpointSelector::new(Duration::from_millis(50)),
            AggregatorSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let engine = aggregator(Vec::new(), Vec::new());
        let id = Uuid::new_v4();
        assert_eq!(
            engine.value_account(&id).await,
            Err(PortfolioError::AccountNotFound(id))
        );
    }

    #[tokio::test]
    async fn test_failed_chain_contributes_nothing() {
        let account = Account::new("alice", AccountRole::Standard)
            .with_address(Chain::Stellar, "GALICE")
            .with_address(Chain::Ripple, "rALICE");
        let id = account.id;

        let engine = aggregator(
            vec![account],
            vec![
                Arc::new(FixedProvider::new(Chain::Stellar, dec!(1500))),
                Arc::new(FixedProvider::failing(Chain::Ripple)),
            ],
        );

        let result = engine.value_account(&id).await.unwrap();
        assert_eq!(result.assets.len(), 1);
        assert_eq!(result.assets[0].chain, Chain::Stellar);
        assert_eq!(result.total_value, dec!(150));
    }

    #[tokio::test]
    async fn test_disabled_chain_not_queried() {
        let account = Account::new("bob", AccountRole::Standard).with_address(Chain::Ripple, "rBOB");
        let id = account.id;
        let ripple = Arc::new(FixedProvider::new(Chain::Ripple, dec!(10)));

        let accounts: Arc<MemoryAccountStore> = Arc::new(MemoryAccountStore::with_accounts(vec![account]));
        let engine = PortfolioAggregator::new(
            accounts.clone(),
            AddressResolver::new(accounts, Arc::new(MemoryPhraseStore::new())),
            vec![ripple.clone() as Arc<dyn ChainBalanceProvider>],
            PriceOracleClient::new(Arc::new(FixedPrices), HashMap::new()),
            EndpointSelector::new(Duration::from_millis(50)),
            AggregatorSettings {
                enabled_chains: vec![Chain::Stellar],
                ..AggregatorSettings::default()
            },
        );

        let result = engine.value_account(&id).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(ripple.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_view_depends_on_role() {
        let operator = Account::new("ops", AccountRole::Operator);
        let user = Account::new("carol", AccountRole::Standard).with_address(Chain::Ripple, "rCAROL");
        let (operator_id, user_id) = (operator.id, user.id);

        let engine = aggregator(
            vec![operator, user],
            vec![Arc::new(FixedProvider::new(Chain::Ripple, dec!(200)))],
        );

        let own = engine.view(&user_id).await.unwrap();
        assert!(!own.is_operator);
        assert_eq!(own.portfolio.unwrap().total_value, dec!(100));

        let all = engine.view(&operator_id).await.unwrap();
        assert!(all.is_operator);
        let portfolios = all.portfolios.unwrap();
        assert_eq!(portfolios.len(), 1);
        assert_eq!(portfolios[0].username, "carol");

        let summary = engine.total_value(&operator_id).await.unwrap();
        assert_eq!(summary.total_portfolio_value, dec!(100));
        assert_eq!(summary.account_count, 1);

        assert_eq!(engine.total_value(&user_id).await, Err(PortfolioError::Forbidden));
    }
}
