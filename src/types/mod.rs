//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `currency`: Currency codes, registry entries and exchange settings
//! - `method`: Deposit and withdrawal method configuration
//! - `transaction`: Transaction records, statuses and query filters
//! - `user`: User records and per-currency balances
//! - `error`: Error types for the wallet ledger

pub mod currency;
pub mod error;
pub mod method;
pub mod transaction;
pub mod user;

pub use currency::{CurrencyClass, CurrencyCode, CurrencyItem, ExchangeSettings, PairRate};
pub use error::{ErrorKind, WalletError};
pub use method::{DepositMethod, MethodId, Settlement, WithdrawalMethod};
pub use transaction::{
    MethodRef, Transaction, TransactionDetails, TransactionFilter, TransactionId,
    TransactionStatus, TransactionType,
};
pub use user::{Balances, TwoFactor, User, UserId};
