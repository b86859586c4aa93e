//! Thread-safe in-memory backend
//!
//! `MemoryStore` implements every repository trait on concurrent data
//! structures so it can be shared (behind `Arc`) between the wallet and the
//! relay worker.
//!
//! # Design
//!
//! - Users live in a `DashMap` keyed by id, with a second `DashMap` indexing
//!   normalized emails. Inserting goes through the email entry, so two
//!   concurrent registrations of the same address cannot both succeed.
//! - The ledger is an insertion-ordered `Vec` behind a `RwLock`, plus a
//!   `DashMap` from transaction id to position.
//! - Configuration and relay state are small singletons behind `RwLock`s.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::Snapshot;
use crate::core::traits::{ConfigRepository, LedgerRepository, RelayRepository, UserRepository};
use crate::relay::{QueuedMessage, RelaySettings};
use crate::types::{
    CurrencyItem, DepositMethod, ExchangeSettings, Transaction, TransactionId,
    TransactionStatus, User, UserId, WalletError, WithdrawalMethod,
};

#[derive(Debug, Default)]
struct ConfigState {
    currencies: Vec<CurrencyItem>,
    deposit_methods: Vec<DepositMethod>,
    withdrawal_methods: Vec<WithdrawalMethod>,
    exchange: ExchangeSettings,
}

#[derive(Debug, Default)]
struct RelayState {
    settings: RelaySettings,
    queue: Vec<QueuedMessage>,
    dead_letters: Vec<QueuedMessage>,
}

/// In-memory implementation of all repositories
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, User>,
    emails: DashMap<String, UserId>,
    transactions: RwLock<Vec<Transaction>>,
    tx_index: DashMap<TransactionId, usize>,
    config: RwLock<ConfigState>,
    relay: RwLock<RelayState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = MemoryStore::new();
        store.load(snapshot);
        store
    }

    pub(crate) fn load(&self, snapshot: Snapshot) {
        self.reset_users(snapshot.users);
        self.reset_transactions(snapshot.transactions);

        let mut config = self.config.write();
        config.currencies = snapshot.currencies;
        config.deposit_methods = snapshot.deposit_methods;
        config.withdrawal_methods = snapshot.withdrawal_methods;
        config.exchange = snapshot.exchange;
        drop(config);

        let mut relay = self.relay.write();
        relay.settings = snapshot.relay_settings;
        relay.queue = snapshot.relay_queue;
        relay.dead_letters = snapshot.relay_dead_letters;
    }

    /// Capture the full state as a serializable snapshot
    pub fn snapshot(&self) -> Snapshot {
        let config = self.config.read();
        let relay = self.relay.read();
        Snapshot {
            users: self.sorted_users(),
            transactions: self.transactions.read().clone(),
            currencies: config.currencies.clone(),
            deposit_methods: config.deposit_methods.clone(),
            withdrawal_methods: config.withdrawal_methods.clone(),
            exchange: config.exchange.clone(),
            relay_settings: relay.settings.clone(),
            relay_queue: relay.queue.clone(),
            relay_dead_letters: relay.dead_letters.clone(),
        }
    }

    fn sorted_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        users
    }

    fn reset_users(&self, users: Vec<User>) {
        self.users.clear();
        self.emails.clear();
        for user in users {
            self.emails.insert(user.email.clone(), user.id);
            self.users.insert(user.id, user);
        }
    }

    fn reset_transactions(&self, transactions: Vec<Transaction>) {
        let mut ledger = self.transactions.write();
        self.tx_index.clear();
        for (position, tx) in transactions.iter().enumerate() {
            self.tx_index.insert(tx.id, position);
        }
        *ledger = transactions;
    }
}

impl UserRepository for MemoryStore {
    fn find_user(&self, id: UserId) -> Result<Option<User>, WalletError> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, WalletError> {
        let id = match self.emails.get(email) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        self.find_user(id)
    }

    fn insert_user(&self, user: User) -> Result<User, WalletError> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(WalletError::duplicate("user email", &user.email)),
            Entry::Vacant(slot) => {
                if self.users.contains_key(&user.id) {
                    return Err(WalletError::duplicate("user id", user.id));
                }
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(user)
            }
        }
    }

    fn save_user(&self, user: &User) -> Result<User, WalletError> {
        let mut entry = self
            .users
            .get_mut(&user.id)
            .ok_or_else(|| WalletError::not_found("user", user.id))?;

        if entry.version != user.version {
            return Err(WalletError::ConcurrentModification {
                user: user.id,
                expected: user.version,
                actual: entry.version,
            });
        }

        let mut stored = user.clone();
        // The email index is keyed by the registered address
        stored.email = entry.email.clone();
        stored.version = entry.version + 1;
        *entry = stored.clone();
        Ok(stored)
    }

    fn list_users(&self) -> Result<Vec<User>, WalletError> {
        Ok(self.sorted_users())
    }

    fn replace_users(&self, users: Vec<User>) -> Result<(), WalletError> {
        self.reset_users(users);
        Ok(())
    }
}

impl LedgerRepository for MemoryStore {
    fn insert_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        let mut ledger = self.transactions.write();
        if self.tx_index.contains_key(&tx.id) {
            return Err(WalletError::duplicate("transaction", tx.id));
        }
        self.tx_index.insert(tx.id, ledger.len());
        ledger.push(tx.clone());
        Ok(tx)
    }

    fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, WalletError> {
        let ledger = self.transactions.read();
        Ok(self
            .tx_index
            .get(&id)
            .and_then(|position| ledger.get(*position).cloned()))
    }

    fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<Transaction, WalletError> {
        let mut ledger = self.transactions.write();
        let position = self
            .tx_index
            .get(&id)
            .map(|entry| *entry.value())
            .ok_or_else(|| WalletError::not_found("transaction", id))?;
        let tx = ledger
            .get_mut(position)
            .ok_or_else(|| WalletError::not_found("transaction", id))?;

        if tx.status != expected {
            return Err(WalletError::invalid_transition(id, tx.status, status));
        }

        tx.status = status;
        tx.updated_at = Some(at);
        Ok(tx.clone())
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>, WalletError> {
        Ok(self.transactions.read().clone())
    }

    fn replace_transactions(&self, transactions: Vec<Transaction>) -> Result<(), WalletError> {
        self.reset_transactions(transactions);
        Ok(())
    }
}

impl ConfigRepository for MemoryStore {
    fn currencies(&self) -> Result<Vec<CurrencyItem>, WalletError> {
        Ok(self.config.read().currencies.clone())
    }

    fn save_currencies(&self, currencies: Vec<CurrencyItem>) -> Result<(), WalletError> {
        self.config.write().currencies = currencies;
        Ok(())
    }

    fn deposit_methods(&self) -> Result<Vec<DepositMethod>, WalletError> {
        Ok(self.config.read().deposit_methods.clone())
    }

    fn save_deposit_methods(&self, methods: Vec<DepositMethod>) -> Result<(), WalletError> {
        self.config.write().deposit_methods = methods;
        Ok(())
    }

    fn withdrawal_methods(&self) -> Result<Vec<WithdrawalMethod>, WalletError> {
        Ok(self.config.read().withdrawal_methods.clone())
    }

    fn save_withdrawal_methods(
        &self,
        methods: Vec<WithdrawalMethod>,
    ) -> Result<(), WalletError> {
        self.config.write().withdrawal_methods = methods;
        Ok(())
    }

    fn exchange_settings(&self) -> Result<ExchangeSettings, WalletError> {
        Ok(self.config.read().exchange.clone())
    }

    fn save_exchange_settings(&self, settings: ExchangeSettings) -> Result<(), WalletError> {
        self.config.write().exchange = settings;
        Ok(())
    }
}

impl RelayRepository for MemoryStore {
    fn relay_settings(&self) -> Result<RelaySettings, WalletError> {
        Ok(self.relay.read().settings.clone())
    }

    fn save_relay_settings(&self, settings: RelaySettings) -> Result<(), WalletError> {
        self.relay.write().settings = settings;
        Ok(())
    }

    fn relay_queue(&self) -> Result<Vec<QueuedMessage>, WalletError> {
        Ok(self.relay.read().queue.clone())
    }

    fn save_relay_queue(&self, queue: Vec<QueuedMessage>) -> Result<(), WalletError> {
        self.relay.write().queue = queue;
        Ok(())
    }

    fn dead_letters(&self) -> Result<Vec<QueuedMessage>, WalletError> {
        Ok(self.relay.read().dead_letters.clone())
    }

    fn push_dead_letter(&self, message: QueuedMessage) -> Result<(), WalletError> {
        self.relay.write().dead_letters.push(message);
        Ok(())
    }
}
