//! In-memory stores for tests and embedders that keep records elsewhere

use super::{AccountStore, RecoveryPhraseStore};
use crate::models::{Account, Chain};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<Vec<Account>>,
    saves: AtomicUsize,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of writes (`save` or `fill_addresses`) seen so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &Uuid) -> Option<Account> {
        self.accounts.read().iter().find(|a| &a.id == id).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Account>> {
        Ok(self.get(id))
    }

    async fn find_many_with_any_address(&self) -> Result<Vec<Account>> {
        Ok(self
            .accounts
            .read()
            .iter()
            .filter(|a| a.has_any_address())
            .cloned()
            .collect())
    }

    async fn save(&self, account: &Account) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);

        let mut accounts = self.accounts.write();
        match accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => {
                existing.username = account.username.clone();
                existing.email = account.email.clone();
                existing.role = account.role;
                for (chain, address) in &account.addresses {
                    if existing.address(*chain).is_none() {
                        existing.addresses.insert(*chain, address.clone());
                    }
                }
            }
            None => accounts.push(account.clone()),
        }
        Ok(())
    }

    async fn fill_addresses(&self, id: &Uuid, addresses: &BTreeMap<Chain, String>) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);

        let mut accounts = self.accounts.write();
        if let Some(existing) = accounts.iter_mut().find(|a| &a.id == id) {
            for (chain, address) in addresses {
                if existing.address(*chain).is_none() && !address.is_empty() {
                    existing.addresses.insert(*chain, address.clone());
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPhraseStore {
    phrases: RwLock<HashMap<Uuid, String>>,
    lookups: AtomicUsize,
}

impl MemoryPhraseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account_id: Uuid, phrase: &str) {
        self.phrases.write().insert(account_id, phrase.to_string());
    }

    /// Number of `find_by_account` calls seen so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecoveryPhraseStore for MemoryPhraseStore {
    async fn find_by_account(&self, account_id: &Uuid) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.phrases.read().get(account_id).cloned())
    }
}
