//! Batch-scoped shared state

use crate::chains::SelectedEndpoints;
use crate::models::Chain;
use crate::pricing::PriceMap;

/// Written once when the batch opens (prices) or on first use per chain (endpoints), then only read.
/// Every account valued in the batch shares it.
#[derive(Debug)]
pub struct Batch {
    pub prices: PriceMap,
    pub endpoints: SelectedEndpoints,
}

impl Batch {
    pub fn new(prices: PriceMap, chains: impl IntoIterator<Item = Chain>) -> Self {
        Self {
            prices,
            endpoints: SelectedEndpoints::for_chains(chains),
        }
    }
}
