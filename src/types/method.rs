//! Deposit and withdrawal method configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::currency::CurrencyCode;
use super::transaction::TransactionStatus;

/// Method identifier, chosen by the admin (e.g. `usdt-trc20`)
pub type MethodId = String;

/// How a request made through a method is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Completes without admin approval
    Instant,
    /// Stays pending until an admin approves or rejects it
    RequiresApproval,
}

impl Settlement {
    /// Status a freshly created transaction starts in
    pub fn initial_status(self) -> TransactionStatus {
        match self {
            Settlement::Instant => TransactionStatus::Completed,
            Settlement::RequiresApproval => TransactionStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositMethod {
    pub id: MethodId,
    pub name: String,
    pub currency: CurrencyCode,
    pub active: bool,
    /// A proof-of-payment image reference must accompany the request
    #[serde(default)]
    pub requires_image: bool,
    /// A payer transaction id must accompany the request
    #[serde(default)]
    pub requires_transaction_id: bool,
    pub settlement: Settlement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalMethod {
    pub id: MethodId,
    pub name: String,
    pub currency: CurrencyCode,
    pub active: bool,
    pub settlement: Settlement,
    /// Percentage withheld from the payout
    #[serde(default)]
    pub fee_percentage: Decimal,
}
