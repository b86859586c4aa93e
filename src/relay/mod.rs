//! Best-effort notification and backup relay
//!
//! Ledger events and settings changes are mirrored to an external messaging
//! channel. The relay sits outside the trust boundary for balance
//! correctness: enqueueing never fails the caller, delivery is retried a
//! bounded number of times and failures are only logged.
//!
//! # Components
//!
//! - [`RelayEvent`] - what happened, rendered to message text
//! - [`Relay`] - durable FIFO queue plus a single-flight drain worker
//! - [`RelayTransport`] - the outbound seam; [`TelegramTransport`] in production

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Transaction, TransactionDetails, TransactionStatus, UserId};

pub mod transport;
pub mod worker;

pub use transport::{RelayTransport, TelegramTransport};
pub use worker::{DrainReport, Relay, RetryPolicy};

/// Relay configuration, managed by an admin
///
/// Disabled by default; enqueueing is a no-op until it is enabled and both
/// credentials are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySettings {
    pub enabled: bool,
    /// Recipient chat id
    #[serde(default)]
    pub recipient: Option<String>,
    /// Bot token
    #[serde(default)]
    pub token: Option<String>,
    /// Time of the last successful delivery
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl RelaySettings {
    /// Enabled with non-empty credentials
    pub fn is_ready(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        self.enabled && present(&self.recipient) && present(&self.token)
    }
}

/// A message waiting in the durable queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub id: Uuid,
    pub text: String,
    /// Failed delivery attempts so far
    #[serde(default)]
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedMessage {
    pub fn new(text: String) -> Self {
        QueuedMessage {
            id: Uuid::new_v4(),
            text,
            attempts: 0,
            enqueued_at: Utc::now(),
            last_error: None,
        }
    }
}

/// Delivery failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelayError {
    #[error("relay credentials are not configured")]
    MissingCredentials,

    #[error("relay endpoint returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("relay transport error: {0}")]
    Transport(String),
}

/// Something worth mirroring to the relay channel
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    TransactionCreated {
        tx: Transaction,
        user_email: String,
    },
    StatusChanged {
        tx: Transaction,
        previous: TransactionStatus,
    },
    UserRegistered {
        user_id: UserId,
        name: String,
        email: String,
    },
    SettingsChanged {
        what: String,
    },
    BackupCreated {
        created_at: DateTime<Utc>,
        users: usize,
        transactions: usize,
    },
}

impl RelayEvent {
    /// Plain-text message body
    pub fn render(&self) -> String {
        let mut text = String::new();
        match self {
            RelayEvent::TransactionCreated { tx, user_email } => {
                let _ = writeln!(text, "New {} request", tx.tx_type());
                let _ = writeln!(text, "User: {}", user_email);
                let _ = writeln!(text, "Amount: {} {}", tx.amount, tx.currency);
                write_details(&mut text, &tx.details);
                let _ = writeln!(text, "Status: {}", tx.status);
                let _ = write!(text, "ID: {}", tx.id);
            }
            RelayEvent::StatusChanged { tx, previous } => {
                let _ = writeln!(text, "{} {}", tx.tx_type(), tx.status);
                let _ = writeln!(text, "Amount: {} {}", tx.amount, tx.currency);
                let _ = writeln!(text, "Status: {} -> {}", previous, tx.status);
                let _ = write!(text, "ID: {}", tx.id);
            }
            RelayEvent::UserRegistered {
                user_id,
                name,
                email,
            } => {
                let _ = write!(text, "New user: {} <{}>\nID: {}", name, email, user_id);
            }
            RelayEvent::SettingsChanged { what } => {
                let _ = write!(text, "Settings changed: {}", what);
            }
            RelayEvent::BackupCreated {
                created_at,
                users,
                transactions,
            } => {
                let _ = write!(
                    text,
                    "Backup created at {}\nUsers: {}\nTransactions: {}",
                    created_at.to_rfc3339(),
                    users,
                    transactions
                );
            }
        }
        text
    }
}

fn write_details(text: &mut String, details: &TransactionDetails) {
    match details {
        TransactionDetails::Deposit { reference, .. } => {
            if let Some(reference) = reference {
                let _ = writeln!(text, "Reference: {}", reference);
            }
        }
        TransactionDetails::Withdrawal {
            recipient,
            fee,
            payout,
            ..
        } => {
            let _ = writeln!(text, "Recipient: {}", recipient);
            if *fee > Decimal::ZERO {
                let _ = writeln!(text, "Fee: {} / Payout: {}", fee, payout);
            }
        }
        TransactionDetails::Conversion {
            target_currency,
            target_amount,
            ..
        } => {
            let _ = writeln!(text, "Into: {} {}", target_amount, target_currency);
        }
        TransactionDetails::GameRecharge { game, account_id } => {
            let _ = writeln!(text, "Game: {} / Account: {}", game, account_id);
        }
    }
}
