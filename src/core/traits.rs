//! Repository traits for users, the ledger, configuration and relay state
//!
//! The core logic depends only on these traits. `storage::memory` provides the
//! in-memory implementation used by tests and embedders; `storage::file`
//! persists the same state to a JSON document.

use chrono::{DateTime, Utc};

use crate::relay::{QueuedMessage, RelaySettings};
use crate::types::{
    CurrencyItem, DepositMethod, ExchangeSettings, Transaction, TransactionId,
    TransactionStatus, User, UserId, WalletError, WithdrawalMethod,
};

/// Storage of registered users
///
/// Users are never deleted. Emails are unique (case-insensitive; callers pass
/// normalized addresses).
pub trait UserRepository: Send + Sync {
    /// Get a user by id
    fn find_user(&self, id: UserId) -> Result<Option<User>, WalletError>;

    /// Get a user by normalized email
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, WalletError>;

    /// Insert a new user
    ///
    /// Fails with `Duplicate` if the email or id is already taken; the
    /// directory is left unchanged.
    fn insert_user(&self, user: User) -> Result<User, WalletError>;

    /// Save a modified user (compare-and-swap on `version`)
    ///
    /// Succeeds only if the stored version equals `user.version`; the stored
    /// copy gets `version + 1` and is returned. Otherwise fails with
    /// `ConcurrentModification`.
    fn save_user(&self, user: &User) -> Result<User, WalletError>;

    /// All users, ordered by registration time
    fn list_users(&self) -> Result<Vec<User>, WalletError>;

    /// Overwrite the whole directory (restore)
    fn replace_users(&self, users: Vec<User>) -> Result<(), WalletError>;
}

/// Append-only transaction storage
pub trait LedgerRepository: Send + Sync {
    /// Append a record; fails with `Duplicate` on an id collision
    fn insert_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;

    fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, WalletError>;

    /// Move a record from `expected` to `status` (compare-and-swap)
    ///
    /// Fails with `NotFound` for an unknown id and `InvalidTransition` if the
    /// stored status is not `expected`.
    fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<Transaction, WalletError>;

    /// Snapshot of all records in insertion order
    fn list_transactions(&self) -> Result<Vec<Transaction>, WalletError>;

    /// Overwrite the whole ledger (restore)
    fn replace_transactions(&self, transactions: Vec<Transaction>) -> Result<(), WalletError>;
}

/// Admin-managed configuration
pub trait ConfigRepository: Send + Sync {
    fn currencies(&self) -> Result<Vec<CurrencyItem>, WalletError>;
    fn save_currencies(&self, currencies: Vec<CurrencyItem>) -> Result<(), WalletError>;

    fn deposit_methods(&self) -> Result<Vec<DepositMethod>, WalletError>;
    fn save_deposit_methods(&self, methods: Vec<DepositMethod>) -> Result<(), WalletError>;

    fn withdrawal_methods(&self) -> Result<Vec<WithdrawalMethod>, WalletError>;
    fn save_withdrawal_methods(&self, methods: Vec<WithdrawalMethod>)
        -> Result<(), WalletError>;

    fn exchange_settings(&self) -> Result<ExchangeSettings, WalletError>;
    fn save_exchange_settings(&self, settings: ExchangeSettings) -> Result<(), WalletError>;
}

/// Relay configuration and its durable message queue
pub trait RelayRepository: Send + Sync {
    fn relay_settings(&self) -> Result<RelaySettings, WalletError>;
    fn save_relay_settings(&self, settings: RelaySettings) -> Result<(), WalletError>;

    /// Pending messages, head first
    fn relay_queue(&self) -> Result<Vec<QueuedMessage>, WalletError>;
    fn save_relay_queue(&self, queue: Vec<QueuedMessage>) -> Result<(), WalletError>;

    /// Messages dropped after exhausting their retries
    fn dead_letters(&self) -> Result<Vec<QueuedMessage>, WalletError>;
    fn push_dead_letter(&self, message: QueuedMessage) -> Result<(), WalletError>;
}

/// Everything the wallet needs from a backend
pub trait Store: UserRepository + LedgerRepository + ConfigRepository + RelayRepository {}

impl<T> Store for T where T: UserRepository + LedgerRepository + ConfigRepository + RelayRepository
{}
