//! Chain Balance Providers
//! Mission: Read native and token balances for one address on one chain, and report how each read ended
//!
//! Providers never decide which endpoint to use. The aggregator selects a healthy
//! endpoint once per batch through [`EndpointSelector`] and hands it to every query.

pub mod endpoint;
pub mod evm;
pub mod ripple;
pub mod rpc;
pub mod stellar;
pub mod units;

pub use endpoint::{EndpointSelector, SelectedEndpoints};
pub use evm::{EvmProvider, EvmToken};
pub use ripple::RippleProvider;
pub use stellar::StellarProvider;

use crate::models::{Asset, Chain};
use crate::pricing::PriceMap;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::fmt;
use std::future::Future;

#[async_trait]
pub trait ChainBalanceProvider: Send + Sync {
    fn chain(&self) -> Chain;

    /// Candidate endpoints, highest priority first
    fn endpoints(&self) -> &[String];

    /// Oracle ids for every asset this provider can emit
    fn price_ids(&self) -> Vec<String>;

    /// Cheap liveness read that needs no address
    async fn probe(&self, endpoint: &str) -> Result<()>;

    /// Assets with quantity > 0. An address the network has never seen yields an empty list.
    async fn get_balances(
        &self,
        endpoint: &str,
        address: &str,
        prices: &PriceMap,
    ) -> Result<Vec<Asset>>;
}

/// How one balance query ended
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Success(Vec<Asset>),
    /// No address to query on this chain
    NotFound,
    /// Every endpoint for the chain failed its probe this batch
    Unavailable,
    TimedOut,
    Failed(String),
}

impl QueryOutcome {
    pub fn into_assets(self) -> Vec<Asset> {
        match self {
            QueryOutcome::Success(assets) => assets,
            _ => Vec::new(),
        }
    }
}

/// Per-tag counts, logged once per account valuation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub success: usize,
    pub not_found: usize,
    pub unavailable: usize,
    pub timed_out: usize,
    pub failed: usize,
}

impl OutcomeSummary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a QueryOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                QueryOutcome::Success(_) => summary.success += 1,
                QueryOutcome::NotFound => summary.not_found += 1,
                QueryOutcome::Unavailable => summary.unavailable += 1,
                QueryOutcome::TimedOut => summary.timed_out += 1,
                QueryOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.success + self.not_found + self.unavailable + self.timed_out + self.failed
    }

    /// Anything other than success or a plain missing address
    pub fn has_failures(&self) -> bool {
        self.unavailable + self.timed_out + self.failed > 0
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok={} not_found={} unavailable={} timed_out={} failed={}",
            self.success, self.not_found, self.unavailable, self.timed_out, self.failed
        )
    }
}

/// Run every future to completion, at most `limit` at a time, and return outputs in input order
pub async fn settle_all<I, F>(futures: I, limit: usize) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    stream::iter(futures)
        .buffered(limit.max(1))
        .collect()
        .await
}
