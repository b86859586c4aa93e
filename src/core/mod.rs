//! Core business logic module
//!
//! This module contains the wallet's components:
//! - `traits` - Repository abstractions the core depends on
//! - `registry` - Currency registry
//! - `conversion` - Exchange rates, fees and rounding
//! - `methods` - Deposit and withdrawal method registries and request validation
//! - `balance` - Per-user balance mutation with optimistic retries
//! - `ledger` - Append-only transaction log paired with balance effects
//! - `users` - Registration, authentication and profiles
//! - `two_factor` - TOTP secrets and codes
//! - `report` - Period summaries
//! - `wallet` - Request flows tying the above together

pub mod balance;
pub mod conversion;
pub mod ledger;
pub mod methods;
pub mod registry;
pub mod report;
pub mod traits;
pub mod two_factor;
pub mod users;
pub mod wallet;

pub use balance::BalanceMutator;
pub use conversion::{ConversionEngine, Quote};
pub use ledger::{BalanceEffect, LedgerStore, StatusChange};
pub use methods::{MethodRegistry, ValidatedWithdrawal};
pub use registry::CurrencyRegistry;
pub use report::{summarize, Bucket, SummaryRow};
pub use traits::{ConfigRepository, LedgerRepository, RelayRepository, Store, UserRepository};
pub use users::{NewUser, ProfileUpdate, UserDirectory};
pub use wallet::{
    ConversionRequest, DepositRequest, RechargeRequest, RestoreSummary, Wallet,
    WithdrawalRequest,
};
