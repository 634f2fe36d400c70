//! Portfolio Valuation
//! Mission: Value one account or every account, sharing one price fetch and one endpoint selection per batch

pub mod aggregator;
pub mod batch;
pub mod errors;

pub use aggregator::{AggregatorSettings, PortfolioAggregator};
pub use batch::Batch;
pub use errors::PortfolioError;
