//! SQLite-backed stores
//! Mission: Persist accounts and recovery phrases with write-once chain addresses

use super::{AccountStore, RecoveryPhraseStore};
use crate::models::{Account, AccountRole, Chain};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str =
    "id, username, email, role, stellar_address, ripple_address, evm_address, created_at";

/// Account storage with SQLite backend
pub struct SqliteAccountStore {
    db_path: String,
}

impl SqliteAccountStore {
    /// Create a new account store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT,
                role TEXT NOT NULL,
                stellar_address TEXT,
                ripple_address TEXT,
                evm_address TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create accounts table")?;

        Ok(())
    }

    fn load_all_with_address(&self) -> Result<Vec<Account>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE COALESCE(stellar_address, '') <> ''
                OR COALESCE(ripple_address, '') <> ''
                OR COALESCE(evm_address, '') <> ''
             ORDER BY created_at, id"
        ))?;

        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(accounts)
    }
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let id_str: String = row.get(0)?;
    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let role_str: String = row.get(3)?;

    let mut addresses = BTreeMap::new();
    for (idx, chain) in [(4usize, Chain::Stellar), (5, Chain::Ripple), (6, Chain::Ethereum)] {
        let address: Option<String> = row.get(idx)?;
        if let Some(address) = address.filter(|a| !a.is_empty()) {
            addresses.insert(chain, address);
        }
    }

    Ok(Account {
        id,
        username: row.get(1)?,
        email: row.get(2)?,
        role: AccountRole::from_str(&role_str).unwrap_or(AccountRole::Standard),
        addresses,
        created_at: row.get(7)?,
    })
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Account>> {
        let conn = Connection::open(&self.db_path)?;

        let result = conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            params![id.to_string()],
            account_from_row,
        );

        match result {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_many_with_any_address(&self) -> Result<Vec<Account>> {
        self.load_all_with_address()
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        // Existing addresses win over incoming ones (write-once per chain)
        conn.execute(
            "INSERT INTO accounts (id, username, email, role, stellar_address, ripple_address, evm_address, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                role = excluded.role,
                stellar_address = COALESCE(NULLIF(accounts.stellar_address, ''), excluded.stellar_address),
                ripple_address = COALESCE(NULLIF(accounts.ripple_address, ''), excluded.ripple_address),
                evm_address = COALESCE(NULLIF(accounts.evm_address, ''), excluded.evm_address)",
            params![
                account.id.to_string(),
                account.username,
                account.email,
                account.role.as_str(),
                account.address(Chain::Stellar),
                account.address(Chain::Ripple),
                account.address(Chain::Ethereum),
                account.created_at,
            ],
        )
        .context("Failed to save account")?;

        debug!("Saved account {} ({})", account.username, account.id);
        Ok(())
    }

    async fn fill_addresses(&self, id: &Uuid, addresses: &BTreeMap<Chain, String>) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        let address = |chain: Chain| addresses.get(&chain).map(String::as_str).filter(|a| !a.is_empty());

        let updated = conn
            .execute(
                "UPDATE accounts SET
                    stellar_address = COALESCE(NULLIF(stellar_address, ''), ?2),
                    ripple_address = COALESCE(NULLIF(ripple_address, ''), ?3),
                    evm_address = COALESCE(NULLIF(evm_address, ''), ?4)
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    address(Chain::Stellar),
                    address(Chain::Ripple),
                    address(Chain::Ethereum),
                ],
            )
            .context("Failed to fill account addresses")?;

        debug!(account = %id, updated, "Filled missing addresses");
        Ok(())
    }
}

/// Recovery phrase storage with SQLite backend
pub struct SqlitePhraseStore {
    db_path: String,
}

impl SqlitePhraseStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS recovery_phrases (
                account_id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT 'My Wallet',
                phrase TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create recovery_phrases table")?;

        Ok(())
    }

    /// Create or replace the phrase owned by an account
    pub fn upsert_phrase(&self, account_id: &Uuid, name: &str, phrase: &str) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "INSERT INTO recovery_phrases (account_id, name, phrase, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(account_id) DO UPDATE SET
                name = excluded.name,
                phrase = excluded.phrase,
                updated_at = excluded.updated_at",
            params![
                account_id.to_string(),
                name,
                phrase,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to save recovery phrase")?;

        info!("🔑 Stored recovery phrase for account {}", account_id);
        Ok(())
    }
}

#[async_trait]
impl RecoveryPhraseStore for SqlitePhraseStore {
    async fn find_by_account(&self, account_id: &Uuid) -> Result<Option<String>> {
        let conn = Connection::open(&self.db_path)?;

        let result = conn.query_row(
            "SELECT phrase FROM recovery_phrases WHERE account_id = ?1",
            params![account_id.to_string()],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(phrase) => Ok(Some(phrase)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_stores() -> (SqliteAccountStore, SqlitePhraseStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let accounts = SqliteAccountStore::new(db_path).unwrap();
        let phrases = SqlitePhraseStore::new(db_path).unwrap();
        (accounts, phrases, temp_file)
    }

    #[tokio::test]
    async fn test_save_and_find_account() {
        let (store, _phrases, _temp) = create_test_stores();

        let account = Account::new("alice", AccountRole::Standard)
            .with_email("alice@example.com")
            .with_address(Chain::Stellar, "GABC");
        store.save(&account).await.unwrap();

        let loaded = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(loaded, account);

        assert!(store.find_by_id(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_addresses_are_write_once() {
        let (store, _phrases, _temp) = create_test_stores();

        let account = Account::new("bob", AccountRole::Standard).with_address(Chain::Ripple, "rFirst");
        store.save(&account).await.unwrap();

        let overwrite = account
            .clone()
            .with_address(Chain::Ripple, "rSecond")
            .with_address(Chain::Ethereum, "0xabc");
        store.save(&overwrite).await.unwrap();

        let loaded = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(loaded.address(Chain::Ripple), Some("rFirst"));
        assert_eq!(loaded.address(Chain::Ethereum), Some("0xabc"));
    }

    #[tokio::test]
    async fn test_fill_addresses_leaves_profile_alone() {
        let (store, _phrases, _temp) = create_test_stores();

        let account = Account::new("gina", AccountRole::Operator).with_address(Chain::Ripple, "rKEEP");
        store.save(&account).await.unwrap();

        let mut demoted = account.clone();
        demoted.role = AccountRole::Standard;
        demoted.email = Some("gina@example.com".to_string());
        store.save(&demoted).await.unwrap();

        let derived = BTreeMap::from([
            (Chain::Stellar, "GDERIVED".to_string()),
            (Chain::Ripple, "rOTHER".to_string()),
        ]);
        store.fill_addresses(&account.id, &derived).await.unwrap();
        store.fill_addresses(&Uuid::new_v4(), &derived).await.unwrap();

        let loaded = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(loaded.role, AccountRole::Standard);
        assert_eq!(loaded.email.as_deref(), Some("gina@example.com"));
        assert_eq!(loaded.address(Chain::Stellar), Some("GDERIVED"));
        assert_eq!(loaded.address(Chain::Ripple), Some("rKEEP"));
        assert_eq!(loaded.address(Chain::Ethereum), None);
    }

    #[tokio::test]
    async fn test_find_many_with_any_address() {
        let (store, _phrases, _temp) = create_test_stores();

        let with_address =
            Account::new("carol", AccountRole::Standard).with_address(Chain::Ethereum, "0x01");
        let without_address = Account::new("dave", AccountRole::Operator);
        let empty_address =
            Account::new("erin", AccountRole::Standard).with_address(Chain::Stellar, "");

        store.save(&with_address).await.unwrap();
        store.save(&without_address).await.unwrap();
        store.save(&empty_address).await.unwrap();

        let found = store.find_many_with_any_address().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "carol");
    }

    #[tokio::test]
    async fn test_phrase_upsert_and_lookup() {
        let (_accounts, phrases, _temp) = create_test_stores();
        let owner = Uuid::new_v4();

        assert!(phrases.find_by_account(&owner).await.unwrap().is_none());

        phrases.upsert_phrase(&owner, "My Wallet", "first phrase").unwrap();
        phrases.upsert_phrase(&owner, "My Wallet", "second phrase").unwrap();

        let phrase = phrases.find_by_account(&owner).await.unwrap();
        assert_eq!(phrase.as_deref(), Some("second phrase"));
    }
}
