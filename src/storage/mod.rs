//! Storage backends
//!
//! - `memory` - thread-safe in-memory store (tests, embedding)
//! - `file` - JSON document on disk, rewritten atomically after each change
//!
//! Both share the [`Snapshot`] layout, whose keys mirror the records the
//! wallet persists: registered users, transaction data, the method registries,
//! the exchange settings, the supported currencies and the relay state.

use serde::{Deserialize, Serialize};

use crate::relay::{QueuedMessage, RelaySettings};
use crate::types::{
    CurrencyItem, DepositMethod, ExchangeSettings, Transaction, User, WithdrawalMethod,
};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Whole-state document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "registeredUsers", default)]
    pub users: Vec<User>,
    #[serde(rename = "transactions_data", default)]
    pub transactions: Vec<Transaction>,
    #[serde(rename = "deposit_methods", default)]
    pub deposit_methods: Vec<DepositMethod>,
    #[serde(rename = "withdrawal_methods", default)]
    pub withdrawal_methods: Vec<WithdrawalMethod>,
    #[serde(rename = "exchange_rate", default)]
    pub exchange: ExchangeSettings,
    #[serde(rename = "supportedCurrencies", default)]
    pub currencies: Vec<CurrencyItem>,
    #[serde(rename = "relay_settings", default)]
    pub relay_settings: RelaySettings,
    #[serde(rename = "relay_queue", default)]
    pub relay_queue: Vec<QueuedMessage>,
    #[serde(rename = "relay_dead_letters", default)]
    pub relay_dead_letters: Vec<QueuedMessage>,
}
