//! Deposit and withdrawal method registries
//!
//! Methods are admin-managed. Inactive methods disappear from the `active_*`
//! listings but stay addressable by id, so historical transactions keep
//! resolving. Request validation lives here and runs before the ledger is
//! touched.

use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::info;

use crate::core::registry::CurrencyRegistry;
use crate::core::traits::ConfigRepository;
use crate::types::{CurrencyCode, DepositMethod, WalletError, WithdrawalMethod};

/// A withdrawal that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedWithdrawal {
    pub method: WithdrawalMethod,
    /// Withheld from the payout
    pub fee: Decimal,
    /// What the recipient receives
    pub payout: Decimal,
}

#[derive(Clone)]
pub struct MethodRegistry {
    currencies: CurrencyRegistry,
    repo: Arc<dyn ConfigRepository>,
}

impl MethodRegistry {
    pub fn new(currencies: CurrencyRegistry, repo: Arc<dyn ConfigRepository>) -> Self {
        MethodRegistry { currencies, repo }
    }

    pub fn deposit_methods(&self) -> Result<Vec<DepositMethod>, WalletError> {
        self.repo.deposit_methods()
    }

    pub fn active_deposit_methods(&self) -> Result<Vec<DepositMethod>, WalletError> {
        Ok(self
            .deposit_methods()?
            .into_iter()
            .filter(|m| m.active)
            .collect())
    }

    pub fn deposit_method(&self, id: &str) -> Result<DepositMethod, WalletError> {
        self.deposit_methods()?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| WalletError::not_found("Deposit method", id))
    }

    pub fn withdrawal_methods(&self) -> Result<Vec<WithdrawalMethod>, WalletError> {
        self.repo.withdrawal_methods()
    }

    pub fn active_withdrawal_methods(&self) -> Result<Vec<WithdrawalMethod>, WalletError> {
        Ok(self
            .withdrawal_methods()?
            .into_iter()
            .filter(|m| m.active)
            .collect())
    }

    pub fn withdrawal_method(&self, id: &str) -> Result<WithdrawalMethod, WalletError> {
        self.withdrawal_methods()?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| WalletError::not_found("Withdrawal method", id))
    }

    /// Insert or replace a deposit method, keyed by id
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank id or name, and
    /// `UnknownCurrency` if the method's currency is not registered.
    pub fn upsert_deposit_method(&self, method: DepositMethod) -> Result<DepositMethod, WalletError> {
        validate_identity(&method.id, &method.name)?;
        self.currencies.get(&method.currency)?;

        let mut methods = self.deposit_methods()?;
        match methods.iter_mut().find(|m| m.id == method.id) {
            Some(existing) => *existing = method.clone(),
            None => methods.push(method.clone()),
        }
        self.repo.save_deposit_methods(methods)?;

        info!(method = %method.id, currency = %method.currency, "deposit method saved");
        Ok(method)
    }

    /// Insert or replace a withdrawal method, keyed by id
    pub fn upsert_withdrawal_method(
        &self,
        method: WithdrawalMethod,
    ) -> Result<WithdrawalMethod, WalletError> {
        validate_identity(&method.id, &method.name)?;
        self.currencies.get(&method.currency)?;
        if method.fee_percentage < Decimal::ZERO || method.fee_percentage >= Decimal::ONE_HUNDRED {
            return Err(WalletError::invalid_field(
                "fee_percentage",
                "must be at least 0 and below 100",
            ));
        }

        let mut methods = self.withdrawal_methods()?;
        match methods.iter_mut().find(|m| m.id == method.id) {
            Some(existing) => *existing = method.clone(),
            None => methods.push(method.clone()),
        }
        self.repo.save_withdrawal_methods(methods)?;

        info!(method = %method.id, currency = %method.currency, "withdrawal method saved");
        Ok(method)
    }

    pub fn set_deposit_active(&self, id: &str, active: bool) -> Result<DepositMethod, WalletError> {
        let mut method = self.deposit_method(id)?;
        method.active = active;
        self.upsert_deposit_method(method)
    }

    pub fn set_withdrawal_active(
        &self,
        id: &str,
        active: bool,
    ) -> Result<WithdrawalMethod, WalletError> {
        let mut method = self.withdrawal_method(id)?;
        method.active = active;
        self.upsert_withdrawal_method(method)
    }

    /// Check a deposit request against its method and currency
    ///
    /// # Errors
    ///
    /// * `NotFound` - unknown method id
    /// * `Disabled` - inactive method or currency
    /// * `CurrencyMismatch` - request currency differs from the method's
    /// * `InvalidAmount` / `BelowMinimum` - amount not acceptable
    /// * `MissingField` - proof image or reference required but absent
    pub fn validate_deposit(
        &self,
        method_id: &str,
        currency: &CurrencyCode,
        amount: Decimal,
        proof_image: Option<&str>,
        reference: Option<&str>,
    ) -> Result<DepositMethod, WalletError> {
        let method = self.deposit_method(method_id)?;
        if !method.active {
            return Err(WalletError::disabled(&format!("Deposit method {}", method.id)));
        }
        if &method.currency != currency {
            return Err(WalletError::currency_mismatch(&method.currency, currency));
        }

        let item = self.currencies.require_active(currency)?;
        if amount <= Decimal::ZERO {
            return Err(WalletError::invalid_amount(amount));
        }
        if amount < item.min_deposit {
            return Err(WalletError::below_minimum(
                "deposit",
                amount,
                item.min_deposit,
                currency,
            ));
        }

        if method.requires_image && is_blank(proof_image) {
            return Err(WalletError::missing_field("proof_image"));
        }
        if method.requires_transaction_id && is_blank(reference) {
            return Err(WalletError::missing_field("reference"));
        }

        Ok(method)
    }

    /// Check a withdrawal request and compute its fee split
    ///
    /// The user is debited `amount`; the fee is withheld from the payout.
    pub fn validate_withdrawal(
        &self,
        method_id: &str,
        currency: &CurrencyCode,
        amount: Decimal,
        recipient: &str,
    ) -> Result<ValidatedWithdrawal, WalletError> {
        let method = self.withdrawal_method(method_id)?;
        if !method.active {
            return Err(WalletError::disabled(&format!(
                "Withdrawal method {}",
                method.id
            )));
        }
        if &method.currency != currency {
            return Err(WalletError::currency_mismatch(&method.currency, currency));
        }

        let item = self.currencies.require_active(currency)?;
        if amount <= Decimal::ZERO {
            return Err(WalletError::invalid_amount(amount));
        }
        if amount < item.min_withdrawal {
            return Err(WalletError::below_minimum(
                "withdrawal",
                amount,
                item.min_withdrawal,
                currency,
            ));
        }
        if recipient.trim().is_empty() {
            return Err(WalletError::missing_field("recipient"));
        }

        let fee = amount
            .checked_mul(method.fee_percentage)
            .map(|v| v / Decimal::ONE_HUNDRED)
            .ok_or_else(|| WalletError::invalid_field("amount", "fee overflows"))?
            .round_dp_with_strategy(item.class.decimal_places(), RoundingStrategy::AwayFromZero);
        let payout = amount - fee;
        if payout <= Decimal::ZERO {
            return Err(WalletError::invalid_field("amount", "does not cover the fee"));
        }

        Ok(ValidatedWithdrawal {
            method,
            fee,
            payout,
        })
    }
}

fn validate_identity(id: &str, name: &str) -> Result<(), WalletError> {
    if id.trim().is_empty() {
        return Err(WalletError::missing_field("id"));
    }
    if name.trim().is_empty() {
        return Err(WalletError::missing_field("name"));
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
