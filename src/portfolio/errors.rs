use std::fmt;
use uuid::Uuid;

/// Request-level failures. Everything below account level degrades instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortfolioError {
    AccountNotFound(Uuid),
    /// Bulk valuation requested by a non-operator
    Forbidden,
    Store(String),
}

impl fmt::Display for PortfolioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortfolioError::AccountNotFound(id) => write!(f, "account {id} not found"),
            PortfolioError::Forbidden => f.write_str("operator role required"),
            PortfolioError::Store(e) => write!(f, "account store error: {e}"),
        }
    }
}

impl std::error::Error for PortfolioError {}

impl From<anyhow::Error> for PortfolioError {
    fn from(e: anyhow::Error) -> Self {
        PortfolioError::Store(format!("{e:#}"))
    }
}
