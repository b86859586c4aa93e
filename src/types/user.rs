//! User-related types for the wallet ledger
//!
//! This module defines the User record and the per-currency balance map
//! that only the balance mutator is allowed to change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::currency::CurrencyCode;
use super::error::WalletError;

/// User identifier
pub type UserId = Uuid;

/// Per-currency balances of a user
///
/// Every stored amount is non-negative. Keys are created on first credit, so
/// currencies added to the registry after registration need no migration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<CurrencyCode, Decimal>);

impl Balances {
    pub fn new() -> Self {
        Balances(BTreeMap::new())
    }

    /// Balance for a currency, zero when the key is absent
    pub fn get(&self, currency: &CurrencyCode) -> Decimal {
        self.0.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    /// Ensure a key exists without changing its value
    pub fn touch(&mut self, currency: &CurrencyCode) {
        self.0.entry(currency.clone()).or_insert(Decimal::ZERO);
    }

    /// Add funds to a currency
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is not positive or the addition would
    /// overflow.
    pub fn credit(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> Result<(), WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::invalid_amount(amount));
        }

        let current = self.get(currency);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| WalletError::arithmetic_overflow("credit", user))?;

        self.0.insert(currency.clone(), updated);
        Ok(())
    }

    /// Remove funds from a currency
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if the balance is smaller than the amount;
    /// the balance is left unchanged in that case.
    pub fn debit(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> Result<(), WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::invalid_amount(amount));
        }

        let current = self.get(currency);
        if current < amount {
            return Err(WalletError::insufficient_funds(
                user, currency, current, amount,
            ));
        }

        self.0.insert(currency.clone(), current - amount);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyCode, &Decimal)> {
        self.0.iter()
    }
}

/// Two-factor state stored with the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactor {
    /// Base32 TOTP secret
    pub secret: String,
    pub enabled: bool,
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Trimmed, lowercased email; unique across the directory
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    #[serde(default)]
    pub telegram: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub balances: Balances,
    #[serde(default)]
    pub two_factor: Option<TwoFactor>,
    pub created_at: DateTime<Utc>,
    /// Bumped by the repository on every save
    #[serde(default)]
    pub version: u64,
}

impl User {
    /// Whether a TOTP code is required at login
    pub fn two_factor_enabled(&self) -> bool {
        self.two_factor.as_ref().is_some_and(|tf| tf.enabled)
    }
}
