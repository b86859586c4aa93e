//! Wallet Ledger Library
//! # Overview
//!
//! This library provides a multi-currency wallet: an append-only transaction
//! ledger with admin approval, per-user balances, currency conversion with
//! fees, configurable deposit and withdrawal methods, and a best-effort relay
//! that mirrors events to an external channel.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (User, Transaction, CurrencyItem, etc.)
//! - [`cli`] - CLI arguments parsing
//! - [`config`] - Runtime configuration with validated defaults
//! - [`core`] - Business logic components:
//!   - [`core::ledger`] - Transaction log paired with balance effects
//!   - [`core::balance`] - Balance mutation with optimistic retries
//!   - [`core::conversion`] - Exchange rates, fees and rounding
//!   - [`core::methods`] - Method registries and request validation
//!   - [`core::wallet`] - Request flows and back-office operations
//! - [`storage`] - In-memory and JSON-file repositories
//! - [`relay`] - Durable notification queue and its transport
//! - [`io`] - Backup documents and CSV export
//!
//! # Transaction Types
//!
//! - **Deposit**: Credits on completion (immediately for instant methods)
//! - **Withdrawal**: Debits at request time; rejection refunds
//! - **Conversion**: Debits the source and credits the target in one step
//! - **Game recharge**: Debits at request time; rejection refunds
//!
//! # Statuses
//!
//! Every transaction is `pending`, `completed` or `rejected`. Only pending
//! transactions change status, and each change happens at most once.

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod relay;
pub mod storage;
pub mod types;

pub use core::{LedgerStore, Wallet};
pub use io::{write_summary_csv, write_transactions_csv};
pub use types::{
    CurrencyCode, Transaction, TransactionId, TransactionStatus, TransactionType, User, UserId,
    WalletError,
};
