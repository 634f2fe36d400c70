//! Endpoint Selection
//! Mission: Commit to the first candidate endpoint that answers a liveness probe, once per batch

use super::ChainBalanceProvider;
use crate::models::Chain;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Ordered linear fallback. Each candidate is probed at most once per call.
#[derive(Debug, Clone, Copy)]
pub struct EndpointSelector {
    probe_timeout: Duration,
}

impl EndpointSelector {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// First healthy candidate in priority order, or `None` when the chain is unavailable
    pub async fn select(
        &self,
        provider: &dyn ChainBalanceProvider,
        candidates: &[String],
    ) -> Option<String> {
        let chain = provider.chain();

        for endpoint in candidates {
            match timeout(self.probe_timeout, provider.probe(endpoint)).await {
                Ok(Ok(())) => {
                    debug!(%chain, %endpoint, "Selected endpoint");
                    return Some(endpoint.clone());
                }
                Ok(Err(e)) => debug!(%chain, %endpoint, "Probe failed: {:#}", e),
                Err(_) => debug!(%chain, %endpoint, "Probe timed out after {:?}", self.probe_timeout),
            }
        }

        warn!(
            %chain,
            candidates = candidates.len(),
            "All endpoints failed their probe, chain unavailable for this batch"
        );
        None
    }
}

/// Batch-scoped selection record. Written once per chain on first use, read thereafter.
#[derive(Debug, Default)]
pub struct SelectedEndpoints {
    cells: HashMap<Chain, OnceCell<Option<String>>>,
}

impl SelectedEndpoints {
    pub fn for_chains(chains: impl IntoIterator<Item = Chain>) -> Self {
        Self {
            cells: chains.into_iter().map(|c| (c, OnceCell::new())).collect(),
        }
    }

    /// Memoized selection for the provider's chain; concurrent callers share one probe pass
    pub async fn get_or_select(
        &self,
        selector: &EndpointSelector,
        provider: &dyn ChainBalanceProvider,
    ) -> Option<String> {
        match self.cells.get(&provider.chain()) {
            Some(cell) => cell
                .get_or_init(|| selector.select(provider, provider.endpoints()))
                .await
                .clone(),
            None => selector.select(provider, provider.endpoints()).await,
        }
    }

    /// Selections made so far (chains not yet used are absent)
    pub fn resolved(&self) -> HashMap<Chain, Option<String>> {
        self.cells
            .iter()
            .filter_map(|(chain, cell)| cell.get().map(|sel| (*chain, sel.clone())))
            .collect()
    }
}
