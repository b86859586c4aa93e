//! Error types for the wallet ledger
//!
//! This module defines every error the ledger, the balance mutator, the
//! registries and the storage backends can return to a caller.
//!
//! # Error Categories
//!
//! Each variant belongs to one [`ErrorKind`], which is what callers (and the
//! CLI) use to decide how to present a failure:
//!
//! - **Validation**: missing/invalid field, amount <= 0, currency mismatch,
//!   unknown currency, below minimum, invalid status transition
//! - **InsufficientFunds**: a debit exceeds the balance
//! - **NotFound**: unknown transaction, method, user or currency id
//! - **DisabledFeature**: conversion or a method is toggled off
//! - **Duplicate**: email or currency code already registered
//! - **Unauthorized**: bad credentials or two-factor code
//! - **Conflict**: a user row changed underneath an optimistic update
//! - **Storage**: I/O or (de)serialization failure in a backend

use rust_decimal::Decimal;
use thiserror::Error;

use super::currency::CurrencyCode;
use super::transaction::{TransactionId, TransactionStatus};
use super::user::UserId;

/// Coarse classification of a [`WalletError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InsufficientFunds,
    NotFound,
    DisabledFeature,
    Duplicate,
    Unauthorized,
    Conflict,
    Storage,
}

/// Main error type for the wallet ledger
///
/// Validation variants are raised before any store mutation, so a failed
/// request never leaves the ledger half-applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    /// A required request field is absent
    #[error("Missing required field: {field}")]
    MissingField {
        /// Name of the missing field
        field: String,
    },

    /// A field is present but malformed
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        /// Name of the offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Amount is zero or negative
    #[error("Invalid amount {amount}: must be greater than zero")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Amount is below the currency's configured minimum
    #[error("Amount {amount} {currency} is below the minimum {operation} of {minimum}")]
    BelowMinimum {
        /// Operation being attempted (deposit / withdrawal)
        operation: String,
        /// Requested amount
        amount: Decimal,
        /// Configured minimum
        minimum: Decimal,
        /// Currency of the request
        currency: CurrencyCode,
    },

    /// Request currency differs from the one the method accepts
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        /// Currency required by the method
        expected: CurrencyCode,
        /// Currency supplied by the request
        actual: CurrencyCode,
    },

    /// Currency code is not in the registry
    #[error("Unknown currency '{code}'")]
    UnknownCurrency {
        /// The unknown code
        code: String,
    },

    /// Source and target currency of a conversion are equal
    #[error("Cannot convert {currency} into itself")]
    SameCurrency {
        /// The repeated currency
        currency: CurrencyCode,
    },

    /// No rate can be quoted for the pair
    #[error("No exchange rate available from {from} to {to}")]
    RateUnavailable {
        /// Source currency
        from: CurrencyCode,
        /// Target currency
        to: CurrencyCode,
    },

    /// Status transition not permitted (terminal state or back to pending)
    #[error("Transaction {tx} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Transaction id
        tx: TransactionId,
        /// Current status
        from: TransactionStatus,
        /// Requested status
        to: TransactionStatus,
    },

    /// Debit exceeds the balance
    ///
    /// The balance is left unchanged.
    #[error(
        "Insufficient funds for user {user}: available {available} {currency}, requested {requested}"
    )]
    InsufficientFunds {
        /// Owning user
        user: UserId,
        /// Currency being debited
        currency: CurrencyCode,
        /// Current balance
        available: Decimal,
        /// Requested debit
        requested: Decimal,
    },

    /// Lookup by id failed
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of entity (transaction, user, deposit method, ...)
        entity: String,
        /// The id that was looked up
        id: String,
    },

    /// Feature or method is switched off
    #[error("{feature} is disabled")]
    Disabled {
        /// What is disabled
        feature: String,
    },

    /// Unique key already taken
    #[error("{entity} '{key}' already exists")]
    Duplicate {
        /// Kind of entity
        entity: String,
        /// The duplicated key
        key: String,
    },

    /// Email/password pair did not match
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Account has two-factor enabled and no code was supplied
    #[error("Two-factor code required")]
    TwoFactorRequired,

    /// Supplied two-factor code is wrong or expired
    #[error("Invalid two-factor code")]
    InvalidTwoFactorCode,

    /// Optimistic version check failed
    #[error("User {user} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        /// User whose row changed
        user: UserId,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation} for user {user}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Owning user
        user: UserId,
    },

    /// Backend failure (I/O, serialization, hashing)
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the failure
        message: String,
    },
}

impl WalletError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::MissingField { .. }
            | WalletError::InvalidField { .. }
            | WalletError::InvalidAmount { .. }
            | WalletError::BelowMinimum { .. }
            | WalletError::CurrencyMismatch { .. }
            | WalletError::UnknownCurrency { .. }
            | WalletError::SameCurrency { .. }
            | WalletError::RateUnavailable { .. }
            | WalletError::InvalidTransition { .. }
            | WalletError::ArithmeticOverflow { .. } => ErrorKind::Validation,
            WalletError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            WalletError::NotFound { .. } => ErrorKind::NotFound,
            WalletError::Disabled { .. } => ErrorKind::DisabledFeature,
            WalletError::Duplicate { .. } => ErrorKind::Duplicate,
            WalletError::InvalidCredentials
            | WalletError::TwoFactorRequired
            | WalletError::InvalidTwoFactorCode => ErrorKind::Unauthorized,
            WalletError::ConcurrentModification { .. } => ErrorKind::Conflict,
            WalletError::Storage { .. } => ErrorKind::Storage,
        }
    }
}

impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        WalletError::Storage {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::Storage {
            message: format!("JSON: {}", error),
        }
    }
}

impl From<csv::Error> for WalletError {
    fn from(error: csv::Error) -> Self {
        WalletError::Storage {
            message: format!("CSV: {}", error),
        }
    }
}

// Helper functions for creating common errors

impl WalletError {
    /// Create a MissingField error
    pub fn missing_field(field: &str) -> Self {
        WalletError::MissingField {
            field: field.to_string(),
        }
    }

    /// Create an InvalidField error
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        WalletError::InvalidField {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal) -> Self {
        WalletError::InvalidAmount { amount }
    }

    /// Create a BelowMinimum error
    pub fn below_minimum(
        operation: &str,
        amount: Decimal,
        minimum: Decimal,
        currency: &CurrencyCode,
    ) -> Self {
        WalletError::BelowMinimum {
            operation: operation.to_string(),
            amount,
            minimum,
            currency: currency.clone(),
        }
    }

    /// Create a CurrencyMismatch error
    pub fn currency_mismatch(expected: &CurrencyCode, actual: &CurrencyCode) -> Self {
        WalletError::CurrencyMismatch {
            expected: expected.clone(),
            actual: actual.clone(),
        }
    }

    /// Create an UnknownCurrency error
    pub fn unknown_currency(code: &str) -> Self {
        WalletError::UnknownCurrency {
            code: code.to_string(),
        }
    }

    /// Create an InvalidTransition error
    pub fn invalid_transition(
        tx: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Self {
        WalletError::InvalidTransition { tx, from, to }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(
        user: UserId,
        currency: &CurrencyCode,
        available: Decimal,
        requested: Decimal,
    ) -> Self {
        WalletError::InsufficientFunds {
            user,
            currency: currency.clone(),
            available,
            requested,
        }
    }

    /// Create a NotFound error
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        WalletError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Create a Disabled error
    pub fn disabled(feature: &str) -> Self {
        WalletError::Disabled {
            feature: feature.to_string(),
        }
    }

    /// Create a Duplicate error
    pub fn duplicate(entity: &str, key: impl ToString) -> Self {
        WalletError::Duplicate {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, user: UserId) -> Self {
        WalletError::ArithmeticOverflow {
            operation: operation.to_string(),
            user,
        }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        WalletError::Storage {
            message: message.into(),
        }
    }
}
