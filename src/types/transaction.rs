//! Transaction-related types for the wallet ledger
//!
//! This module defines transaction types, statuses, the type-specific
//! payloads and the filter used to query the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::currency::CurrencyCode;
use super::method::MethodId;
use super::user::UserId;

/// Transaction identifier
pub type TransactionId = Uuid;

/// Transaction types recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Funds paid in through a deposit method
    ///
    /// Credits the balance on completion (or immediately for instant methods).
    Deposit,

    /// Funds paid out through a withdrawal method
    ///
    /// Debits the balance at creation; refunded if rejected.
    Withdrawal,

    /// Exchange between two currencies of the same user
    ///
    /// Always recorded as completed.
    Conversion,

    /// Game credit top-up
    ///
    /// Debits the balance at creation; refunded if rejected.
    GameRecharge,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Conversion => "conversion",
            TransactionType::GameRecharge => "game_recharge",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status
///
/// Transitions only go pending -> completed or pending -> rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Rejected,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a transaction refers to its deposit/withdrawal method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodRef {
    /// Id of a method in the registry
    Registered(MethodId),
    /// Free-text method name carried by historical records
    Legacy(String),
}

/// Type-specific payload of a transaction
///
/// The variant determines the transaction type, so a withdrawal can never
/// carry conversion fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionDetails {
    Deposit {
        method: MethodRef,
        /// Reference to an uploaded proof image
        #[serde(default)]
        proof_image: Option<String>,
        /// Payer-supplied transaction id (e.g. a chain tx hash)
        #[serde(default)]
        reference: Option<String>,
    },
    Withdrawal {
        method: MethodRef,
        /// Recipient descriptor (wallet address, phone, account number)
        recipient: String,
        /// Fee withheld from the payout
        fee: Decimal,
        /// Amount actually paid out (amount - fee)
        payout: Decimal,
    },
    Conversion {
        target_currency: CurrencyCode,
        /// Net amount credited in the target currency
        target_amount: Decimal,
        rate: Decimal,
        /// Fee in the target currency
        fee: Decimal,
    },
    GameRecharge {
        game: String,
        account_id: String,
    },
}

impl TransactionDetails {
    pub fn tx_type(&self) -> TransactionType {
        match self {
            TransactionDetails::Deposit { .. } => TransactionType::Deposit,
            TransactionDetails::Withdrawal { .. } => TransactionType::Withdrawal,
            TransactionDetails::Conversion { .. } => TransactionType::Conversion,
            TransactionDetails::GameRecharge { .. } => TransactionType::GameRecharge,
        }
    }
}

/// A ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    /// Always greater than zero
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    /// Set when the status leaves pending
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub details: TransactionDetails,
}

impl Transaction {
    /// Build a new record with a fresh id and the current timestamp
    pub fn new(
        user_id: UserId,
        amount: Decimal,
        currency: CurrencyCode,
        status: TransactionStatus,
        details: TransactionDetails,
    ) -> Self {
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            amount,
            currency,
            status,
            created_at: Utc::now(),
            updated_at: None,
            details,
        }
    }

    pub fn tx_type(&self) -> TransactionType {
        self.details.tx_type()
    }
}

/// Ledger query filter
///
/// Every criterion is optional; the date range is inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub tx_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub user_id: Option<UserId>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.tx_type.is_none_or(|t| tx.tx_type() == t)
            && self.status.is_none_or(|s| tx.status == s)
            && self.user_id.is_none_or(|u| tx.user_id == u)
            && self.from.is_none_or(|from| tx.created_at >= from)
            && self.until.is_none_or(|until| tx.created_at <= until)
    }
}
