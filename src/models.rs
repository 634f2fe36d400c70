//! Portfolio Models
//! Mission: Define accounts, chains, and the valued portfolio structures returned to callers

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Fractional digits shown when a quantity is rendered for people
pub const DISPLAY_FRACTION_DIGITS: u32 = 4;

/// Sum of non-negative values that clamps at `Decimal::MAX` instead of panicking on overflow
pub fn checked_total(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    let mut total = Decimal::ZERO;
    for value in values {
        match total.checked_add(value) {
            Some(sum) => total = sum,
            None => {
                warn!("Value total overflowed, clamping to the decimal maximum");
                return Decimal::MAX;
            }
        }
    }
    total
}

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    Stellar,
    Ripple,
    Ethereum,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Stellar, Chain::Ripple, Chain::Ethereum];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Stellar => "stellar",
            Chain::Ripple => "ripple",
            Chain::Ethereum => "ethereum",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "stellar" | "xlm" => Some(Chain::Stellar),
            "ripple" | "xrp" => Some(Chain::Ripple),
            "ethereum" | "eth" | "evm" => Some(Chain::Ethereum),
            _ => None,
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Account roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountRole {
    #[serde(rename = "operator")]
    Operator, // May value every account in one batch
    #[serde(rename = "standard")]
    Standard, // Own portfolio only
}

impl AccountRole {
    pub fn as_str(&self) -> &str {
        match self {
            AccountRole::Operator => "operator",
            AccountRole::Standard => "standard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "operator" | "admin" => Some(AccountRole::Operator),
            "standard" | "user" => Some(AccountRole::Standard),
            _ => None,
        }
    }
}

/// Account record as kept by the account store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub role: AccountRole,
    /// One public address per chain; never regenerated once present
    pub addresses: BTreeMap<Chain, String>,
    pub created_at: String,
}

impl Account {
    pub fn new(username: &str, role: AccountRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: None,
            role,
            addresses: BTreeMap::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_address(mut self, chain: Chain, address: &str) -> Self {
        self.addresses.insert(chain, address.to_string());
        self
    }

    pub fn address(&self, chain: Chain) -> Option<&str> {
        self.addresses
            .get(&chain)
            .map(|a| a.as_str())
            .filter(|a| !a.is_empty())
    }

    pub fn has_any_address(&self) -> bool {
        self.addresses.values().any(|a| !a.is_empty())
    }

    pub fn is_operator(&self) -> bool {
        self.role == AccountRole::Operator
    }
}

/// A valued holding. Produced per request, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub name: String,
    pub symbol: String,
    pub chain: Chain,
    pub quantity: Decimal,
    pub value: Decimal,
}

impl Asset {
    /// Quantity truncated for display; valuation keeps full precision
    pub fn display_quantity(&self) -> String {
        self.quantity
            .round_dp_with_strategy(DISPLAY_FRACTION_DIGITS, RoundingStrategy::ToZero)
            .to_string()
    }

    /// Descending value, then a stable key so equal values never depend on completion order
    fn ranking(a: &Asset, b: &Asset) -> Ordering {
        b.value
            .cmp(&a.value)
            .then_with(|| a.chain.cmp(&b.chain))
            .then_with(|| a.symbol.cmp(&b.symbol))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| b.quantity.cmp(&a.quantity))
    }
}

/// Valued asset list for one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResult {
    pub assets: Vec<Asset>,
    pub total_value: Decimal,
}

impl PortfolioResult {
    pub fn empty() -> Self {
        Self {
            assets: Vec::new(),
            total_value: Decimal::ZERO,
        }
    }

    /// Drop empty holdings, sort, and total exactly what is returned
    pub fn from_assets(assets: Vec<Asset>) -> Self {
        let mut assets: Vec<Asset> = assets
            .into_iter()
            .filter(|a| a.quantity > Decimal::ZERO)
            .map(|mut a| {
                if a.value < Decimal::ZERO {
                    a.value = Decimal::ZERO;
                }
                a
            })
            .collect();
        assets.sort_by(Asset::ranking);

        let total_value = checked_total(assets.iter().map(|a| a.value));
        Self {
            assets,
            total_value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// One account's entry in a bulk valuation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountPortfolio {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub portfolio: PortfolioResult,
}

pub type BulkPortfolioResult = Vec<AccountPortfolio>;

/// Platform-wide value across every account with an address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TotalValueSummary {
    pub total_portfolio_value: Decimal,
    pub account_count: usize,
}

/// What `GET /api/portfolio` returns, depending on the caller's role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub is_operator: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<PortfolioResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolios: Option<BulkPortfolioResult>,
}
