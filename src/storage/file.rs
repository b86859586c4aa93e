//! JSON-file backend
//!
//! `FileStore` keeps the working state in a [`MemoryStore`] and rewrites the
//! whole document after every mutating call. Writes go to a sibling temporary
//! file that is then renamed over the target, so a crash mid-write leaves the
//! previous document intact. A write that fails rolls the in-memory state back
//! to the last persisted document before the error is returned.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use super::{MemoryStore, Snapshot};
use crate::core::traits::{ConfigRepository, LedgerRepository, RelayRepository, UserRepository};
use crate::relay::{QueuedMessage, RelaySettings};
use crate::types::{
    CurrencyItem, DepositMethod, ExchangeSettings, Transaction, TransactionId,
    TransactionStatus, User, UserId, WalletError, WithdrawalMethod,
};

/// Durable store backed by a single JSON document
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the document at `path`, starting empty if it does not exist
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the file exists but cannot be read or
    /// parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            Snapshot::default()
        };

        debug!(
            path = %path.display(),
            users = snapshot.users.len(),
            transactions = snapshot.transactions.len(),
            "opened wallet data file"
        );

        Ok(FileStore {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state to disk
    pub fn persist(&self) -> Result<(), WalletError> {
        let _guard = self.write_lock.lock();
        self.write_document()
    }

    fn write_document(&self) -> Result<(), WalletError> {
        let json = serde_json::to_string_pretty(&self.inner.snapshot())?;

        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `change` to the working state and write it out
    ///
    /// Memory and disk agree after every call: if the write fails the working
    /// state is restored to what it was before `change` ran.
    fn persisted<T>(
        &self,
        change: impl FnOnce(&MemoryStore) -> Result<T, WalletError>,
    ) -> Result<T, WalletError> {
        let _guard = self.write_lock.lock();
        let before = self.inner.snapshot();
        let value = change(&self.inner)?;

        if let Err(e) = self.write_document() {
            error!(path = %self.path.display(), "Write failed, rolling back: {}", e);
            self.inner.load(before);
            return Err(e);
        }
        Ok(value)
    }
}

impl UserRepository for FileStore {
    fn find_user(&self, id: UserId) -> Result<Option<User>, WalletError> {
        self.inner.find_user(id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, WalletError> {
        self.inner.find_user_by_email(email)
    }

    fn insert_user(&self, user: User) -> Result<User, WalletError> {
        self.persisted(|store| store.insert_user(user))
    }

    fn save_user(&self, user: &User) -> Result<User, WalletError> {
        self.persisted(|store| store.save_user(user))
    }

    fn list_users(&self) -> Result<Vec<User>, WalletError> {
        self.inner.list_users()
    }

    fn replace_users(&self, users: Vec<User>) -> Result<(), WalletError> {
        self.persisted(|store| store.replace_users(users))
    }
}

impl LedgerRepository for FileStore {
    fn insert_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        self.persisted(|store| store.insert_transaction(tx))
    }

    fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, WalletError> {
        self.inner.find_transaction(id)
    }

    fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<Transaction, WalletError> {
        self.persisted(|store| store.update_status(id, expected, status, at))
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>, WalletError> {
        self.inner.list_transactions()
    }

    fn replace_transactions(&self, transactions: Vec<Transaction>) -> Result<(), WalletError> {
        self.persisted(|store| store.replace_transactions(transactions))
    }
}

impl ConfigRepository for FileStore {
    fn currencies(&self) -> Result<Vec<CurrencyItem>, WalletError> {
        self.inner.currencies()
    }

    fn save_currencies(&self, currencies: Vec<CurrencyItem>) -> Result<(), WalletError> {
        self.persisted(|store| store.save_currencies(currencies))
    }

    fn deposit_methods(&self) -> Result<Vec<DepositMethod>, WalletError> {
        self.inner.deposit_methods()
    }

    fn save_deposit_methods(&self, methods: Vec<DepositMethod>) -> Result<(), WalletError> {
        self.persisted(|store| store.save_deposit_methods(methods))
    }

    fn withdrawal_methods(&self) -> Result<Vec<WithdrawalMethod>, WalletError> {
        self.inner.withdrawal_methods()
    }

    fn save_withdrawal_methods(
        &self,
        methods: Vec<WithdrawalMethod>,
    ) -> Result<(), WalletError> {
        self.persisted(|store| store.save_withdrawal_methods(methods))
    }

    fn exchange_settings(&self) -> Result<ExchangeSettings, WalletError> {
        self.inner.exchange_settings()
    }

    fn save_exchange_settings(&self, settings: ExchangeSettings) -> Result<(), WalletError> {
        self.persisted(|store| store.save_exchange_settings(settings))
    }
}

impl RelayRepository for FileStore {
    fn relay_settings(&self) -> Result<RelaySettings, WalletError> {
        self.inner.relay_settings()
    }

    fn save_relay_settings(&self, settings: RelaySettings) -> Result<(), WalletError> {
        self.persisted(|store| store.save_relay_settings(settings))
    }

    fn relay_queue(&self) -> Result<Vec<QueuedMessage>, WalletError> {
        self.inner.relay_queue()
    }

    fn save_relay_queue(&self, queue: Vec<QueuedMessage>) -> Result<(), WalletError> {
        self.persisted(|store| store.save_relay_queue(queue))
    }

    fn dead_letters(&self) -> Result<Vec<QueuedMessage>, WalletError> {
        self.inner.dead_letters()
    }

    fn push_dead_letter(&self, message: QueuedMessage) -> Result<(), WalletError> {
        self.persisted(|store| store.push_dead_letter(message))
    }
}
