//! Account & Recovery Phrase Storage
//! Mission: Narrow async interfaces over the records the valuation engine reads and heals

pub mod memory;
pub mod sqlite;

use crate::models::{Account, Chain};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

pub use memory::{MemoryAccountStore, MemoryPhraseStore};
pub use sqlite::{SqliteAccountStore, SqlitePhraseStore};

/// Account records
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Account>>;

    /// Accounts holding at least one non-empty chain address, in a stable order
    async fn find_many_with_any_address(&self) -> Result<Vec<Account>>;

    /// Upsert the record. Addresses already stored are never overwritten.
    async fn save(&self, account: &Account) -> Result<()>;

    /// Fill empty address slots of an existing record. Touches no other field; unknown ids are a no-op.
    async fn fill_addresses(&self, id: &Uuid, addresses: &BTreeMap<Chain, String>) -> Result<()>;
}

/// Recovery phrases, keyed by owning account. Never returned to API callers.
#[async_trait]
pub trait RecoveryPhraseStore: Send + Sync {
    async fn find_by_account(&self, account_id: &Uuid) -> Result<Option<String>>;
}
