//! Balance mutation
//!
//! This module provides the `BalanceMutator`, the only component allowed to
//! change a user's balances.
//!
//! The BalanceMutator is responsible for:
//! - Validating currencies against the registry before touching a balance
//! - Rejecting non-positive amounts and over-debits
//! - Saving through the repository's version check, retrying on conflict
//!
//! Inactive currencies are accepted here: refunds and reversals on a retired
//! currency must still go through. Whether a currency is open for *new*
//! requests is decided by the request flows.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::registry::CurrencyRegistry;
use crate::core::traits::UserRepository;
use crate::types::{Balances, CurrencyCode, User, UserId, WalletError};

/// Attempts made before a version conflict is surfaced to the caller
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Applies credits and debits to user balances
#[derive(Clone)]
pub struct BalanceMutator {
    users: Arc<dyn UserRepository>,
    currencies: CurrencyRegistry,
}

impl BalanceMutator {
    /// Create a mutator over a user repository
    ///
    /// # Arguments
    ///
    /// * `users` - Where user rows (and their balances) are stored
    /// * `currencies` - Registry every currency code is checked against
    pub fn new(users: Arc<dyn UserRepository>, currencies: CurrencyRegistry) -> Self {
        BalanceMutator { users, currencies }
    }

    /// Current balances of a user
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist.
    pub fn balances(&self, user: UserId) -> Result<Balances, WalletError> {
        Ok(self.load(user)?.balances)
    }

    /// Add funds to a user's balance
    ///
    /// Creates the currency key if the user has never held it.
    ///
    /// # Arguments
    ///
    /// * `user` - The user to credit
    /// * `currency` - Registered currency code
    /// * `amount` - The amount to add (must be positive)
    ///
    /// # Returns
    ///
    /// * `Ok(User)` - The saved user row
    /// * `Err(WalletError)` - If validation fails or the save keeps conflicting
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The amount is zero or negative
    /// - The currency is not in the registry
    /// - Adding the amount would overflow
    /// - The row was modified concurrently on every attempt
    pub fn credit(
        &self,
        user: UserId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> Result<User, WalletError> {
        self.check(currency, amount)?;
        let saved = self.apply(user, |balances| balances.credit(user, currency, amount))?;
        debug!(user = %user, currency = %currency, amount = %amount, "credited");
        Ok(saved)
    }

    /// Remove funds from a user's balance
    ///
    /// # Arguments
    ///
    /// * `user` - The user to debit
    /// * `currency` - Registered currency code
    /// * `amount` - The amount to remove (must be positive)
    ///
    /// # Returns
    ///
    /// * `Ok(User)` - The saved user row
    /// * `Err(WalletError)` - If validation fails or funds are insufficient
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if the balance is smaller than the amount.
    /// The stored balance is left unchanged on every error.
    pub fn debit(
        &self,
        user: UserId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> Result<User, WalletError> {
        self.check(currency, amount)?;
        let saved = self.apply(user, |balances| balances.debit(user, currency, amount))?;
        debug!(user = %user, currency = %currency, amount = %amount, "debited");
        Ok(saved)
    }

    /// Debit one currency and credit another in a single save
    pub fn exchange(
        &self,
        user: UserId,
        debit: (&CurrencyCode, Decimal),
        credit: (&CurrencyCode, Decimal),
    ) -> Result<User, WalletError> {
        self.check(debit.0, debit.1)?;
        self.check(credit.0, credit.1)?;
        self.apply(user, |balances| {
            balances.debit(user, debit.0, debit.1)?;
            balances.credit(user, credit.0, credit.1)
        })
    }

    /// Run `change` over a user's balances and save once
    ///
    /// `change` works on a copy; nothing is stored unless it returns `Ok`. On
    /// a version conflict the user is re-read and `change` runs again, up to
    /// three attempts in total.
    ///
    /// Currency codes used inside `change` are not checked against the
    /// registry; use [`credit`](Self::credit) / [`debit`](Self::debit) or
    /// check them first.
    pub fn apply<F>(&self, user: UserId, change: F) -> Result<User, WalletError>
    where
        F: Fn(&mut Balances) -> Result<(), WalletError>,
    {
        let mut attempt = 1;
        loop {
            let mut row = self.load(user)?;
            change(&mut row.balances)?;

            match self.users.save_user(&row) {
                Ok(saved) => return Ok(saved),
                Err(WalletError::ConcurrentModification { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(user = %user, attempt, "balance save conflicted, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn load(&self, user: UserId) -> Result<User, WalletError> {
        self.users
            .find_user(user)?
            .ok_or_else(|| WalletError::not_found("User", user))
    }

    fn check(&self, currency: &CurrencyCode, amount: Decimal) -> Result<(), WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::invalid_amount(amount));
        }
        self.currencies.get(currency)?;
        Ok(())
    }
}
