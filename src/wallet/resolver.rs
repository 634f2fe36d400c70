//! Address Resolver
//! Mission: Return the addresses to value for an account, healing missing ones from its recovery phrase

use super::derive::{derive_address, RecoverySecret};
use crate::models::{Account, Chain};
use crate::store::{AccountStore, RecoveryPhraseStore};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a chain address could not be produced. Local to one account and chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No stored address and no recovery phrase to derive one from
    NotFound,
    /// A phrase exists but is not a valid derivation input
    MalformedSecret,
    /// The phrase store could not be read
    Store(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound => f.write_str("no address on this chain"),
            ResolveError::MalformedSecret => f.write_str("recovery phrase is malformed"),
            ResolveError::Store(e) => write!(f, "phrase store error: {e}"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Outcome of resolving every enabled chain for one account
#[derive(Debug, Clone, Default)]
pub struct ResolvedAddresses {
    pub addresses: Vec<(Chain, String)>,
    pub unresolved: Vec<(Chain, ResolveError)>,
}

impl ResolvedAddresses {
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

pub struct AddressResolver {
    accounts: Arc<dyn AccountStore>,
    phrases: Arc<dyn RecoveryPhraseStore>,
}

impl AddressResolver {
    pub fn new(accounts: Arc<dyn AccountStore>, phrases: Arc<dyn RecoveryPhraseStore>) -> Self {
        Self { accounts, phrases }
    }

    /// Address for one chain; a stored address is returned unchanged
    pub async fn resolve(&self, account: &Account, chain: Chain) -> Result<String, ResolveError> {
        if let Some(address) = account.address(chain) {
            return Ok(address.to_string());
        }

        let secret = self.load_secret(account).await?;
        let address = derive_address(chain, &secret).map_err(|e| {
            warn!(account = %account.id, %chain, "Address derivation failed: {}", e);
            ResolveError::MalformedSecret
        })?;

        self.persist(account, BTreeMap::from([(chain, address.clone())]))
            .await;
        Ok(address)
    }

    /// Addresses for every requested chain. Loads the phrase at most once and saves at most once.
    pub async fn resolve_all(&self, account: &Account, chains: &[Chain]) -> ResolvedAddresses {
        let mut resolved = ResolvedAddresses::default();
        let mut missing = Vec::new();

        for &chain in chains {
            match account.address(chain) {
                Some(address) => resolved.addresses.push((chain, address.to_string())),
                None => missing.push(chain),
            }
        }

        if missing.is_empty() {
            return resolved;
        }

        let secret = match self.load_secret(account).await {
            Ok(secret) => secret,
            Err(e) => {
                resolved
                    .unresolved
                    .extend(missing.into_iter().map(|chain| (chain, e.clone())));
                return resolved;
            }
        };

        let mut healed = BTreeMap::new();
        for chain in missing {
            match derive_address(chain, &secret) {
                Ok(address) => {
                    healed.insert(chain, address.clone());
                    resolved.addresses.push((chain, address));
                }
                Err(e) => {
                    warn!(account = %account.id, %chain, "Address derivation failed: {}", e);
                    resolved.unresolved.push((chain, ResolveError::MalformedSecret));
                }
            }
        }

        if !healed.is_empty() {
            info!(
                account = %account.id,
                derived = healed.len(),
                "🩹 Derived missing chain addresses from recovery phrase"
            );
            self.persist(account, healed).await;
        }

        resolved.addresses.sort_by_key(|(chain, _)| *chain);
        resolved
    }

    async fn load_secret(&self, account: &Account) -> Result<RecoverySecret, ResolveError> {
        let phrase = self
            .phrases
            .find_by_account(&account.id)
            .await
            .map_err(|e| {
                warn!(account = %account.id, "Recovery phrase lookup failed: {:#}", e);
                ResolveError::Store(e.to_string())
            })?
            .ok_or(ResolveError::NotFound)?;

        RecoverySecret::parse(&phrase).map_err(|_| {
            warn!(account = %account.id, "Stored recovery phrase is malformed");
            ResolveError::MalformedSecret
        })
    }

    /// Address-only write, so profile changes made since `account` was read survive.
    /// A failed write still lets this request use the derived address.
    async fn persist(&self, account: &Account, addresses: BTreeMap<Chain, String>) {
        match self.accounts.fill_addresses(&account.id, &addresses).await {
            Ok(()) => debug!(account = %account.id, "Persisted derived addresses"),
            Err(e) => warn!(account = %account.id, "Failed to persist derived addresses: {:#}", e),
        }
    }
}
