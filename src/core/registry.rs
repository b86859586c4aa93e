//! Currency registry
//!
//! The registry is the single authority on which currency codes exist. Every
//! balance mutation and every request is checked against it, so an unknown
//! code is rejected at the boundary instead of reading as a zero balance.
//!
//! Inactive currencies stay resolvable: refunds and reversals on a retired
//! currency must still succeed, only new requests are refused.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::core::traits::ConfigRepository;
use crate::types::{CurrencyClass, CurrencyCode, CurrencyItem, WalletError};

/// Read/write access to the configured currencies
#[derive(Clone)]
pub struct CurrencyRegistry {
    repo: Arc<dyn ConfigRepository>,
}

impl CurrencyRegistry {
    pub fn new(repo: Arc<dyn ConfigRepository>) -> Self {
        CurrencyRegistry { repo }
    }

    /// All currencies, active or not, in registration order
    pub fn list(&self) -> Result<Vec<CurrencyItem>, WalletError> {
        self.repo.currencies()
    }

    /// Currencies offered for new requests
    pub fn active(&self) -> Result<Vec<CurrencyItem>, WalletError> {
        Ok(self.list()?.into_iter().filter(|c| c.active).collect())
    }

    /// Look up a currency by code
    ///
    /// # Errors
    ///
    /// Returns `UnknownCurrency` if the code is not registered.
    pub fn get(&self, code: &CurrencyCode) -> Result<CurrencyItem, WalletError> {
        self.list()?
            .into_iter()
            .find(|c| &c.code == code)
            .ok_or_else(|| WalletError::unknown_currency(code.as_str()))
    }

    /// Parse a raw code and look it up
    pub fn resolve(&self, raw: &str) -> Result<CurrencyItem, WalletError> {
        let code = CurrencyCode::parse(raw).map_err(|_| WalletError::unknown_currency(raw))?;
        self.get(&code)
    }

    /// Look up a currency that must be open for new requests
    ///
    /// # Errors
    ///
    /// Returns `UnknownCurrency` for an unregistered code and `Disabled` for
    /// an inactive one.
    pub fn require_active(&self, code: &CurrencyCode) -> Result<CurrencyItem, WalletError> {
        let item = self.get(code)?;
        if !item.active {
            return Err(WalletError::disabled(&format!("Currency {}", code)));
        }
        Ok(item)
    }

    /// Settlement precision of a currency
    pub fn decimal_places(&self, code: &CurrencyCode) -> Result<u32, WalletError> {
        Ok(self.get(code)?.class.decimal_places())
    }

    /// Register a new currency
    ///
    /// # Errors
    ///
    /// Returns `Duplicate` if the code exists and `InvalidField` for a
    /// non-positive rate or a negative minimum.
    pub fn add(&self, item: CurrencyItem) -> Result<CurrencyItem, WalletError> {
        validate_item(&item)?;

        let mut currencies = self.list()?;
        if currencies.iter().any(|c| c.code == item.code) {
            return Err(WalletError::duplicate("Currency", &item.code));
        }

        currencies.push(item.clone());
        self.repo.save_currencies(currencies)?;
        info!(currency = %item.code, rate = %item.rate, "currency added");
        Ok(item)
    }

    /// Replace an existing entry, keyed by code
    pub fn update(&self, item: CurrencyItem) -> Result<CurrencyItem, WalletError> {
        validate_item(&item)?;
        self.modify(&item.code.clone(), |existing| *existing = item)
    }

    /// Open or close a currency for new requests
    pub fn set_active(&self, code: &CurrencyCode, active: bool) -> Result<CurrencyItem, WalletError> {
        self.modify(code, |item| item.active = active)
    }

    /// Change the base-relative rate
    pub fn set_rate(&self, code: &CurrencyCode, rate: Decimal) -> Result<CurrencyItem, WalletError> {
        if rate <= Decimal::ZERO {
            return Err(WalletError::invalid_field("rate", "must be greater than zero"));
        }
        self.modify(code, |item| item.rate = rate)
    }

    /// Change the request minimums
    pub fn set_minimums(
        &self,
        code: &CurrencyCode,
        min_deposit: Decimal,
        min_withdrawal: Decimal,
    ) -> Result<CurrencyItem, WalletError> {
        if min_deposit < Decimal::ZERO || min_withdrawal < Decimal::ZERO {
            return Err(WalletError::invalid_field("minimum", "must not be negative"));
        }
        self.modify(code, |item| {
            item.min_deposit = min_deposit;
            item.min_withdrawal = min_withdrawal;
        })
    }

    /// Install the stock currencies if the registry is empty
    ///
    /// Returns whether anything was written.
    pub fn seed_defaults(&self) -> Result<bool, WalletError> {
        if !self.list()?.is_empty() {
            return Ok(false);
        }
        self.repo.save_currencies(default_currencies()?)?;
        info!("seeded default currencies");
        Ok(true)
    }

    fn modify(
        &self,
        code: &CurrencyCode,
        change: impl FnOnce(&mut CurrencyItem),
    ) -> Result<CurrencyItem, WalletError> {
        let mut currencies = self.list()?;
        let item = currencies
            .iter_mut()
            .find(|c| &c.code == code)
            .ok_or_else(|| WalletError::unknown_currency(code.as_str()))?;
        change(item);
        let updated = item.clone();

        self.repo.save_currencies(currencies)?;
        info!(currency = %code, active = updated.active, rate = %updated.rate, "currency updated");
        Ok(updated)
    }
}

pub(crate) fn validate_item(item: &CurrencyItem) -> Result<(), WalletError> {
    if item.name.trim().is_empty() {
        return Err(WalletError::missing_field("name"));
    }
    if item.rate <= Decimal::ZERO {
        return Err(WalletError::invalid_field("rate", "must be greater than zero"));
    }
    if item.min_deposit < Decimal::ZERO || item.min_withdrawal < Decimal::ZERO {
        return Err(WalletError::invalid_field("minimum", "must not be negative"));
    }
    Ok(())
}

/// USDT is the base currency (rate 1); SYP is quoted against it
fn default_currencies() -> Result<Vec<CurrencyItem>, WalletError> {
    let mut usdt = CurrencyItem::new(
        CurrencyCode::parse("usdt")?,
        "Tether USD",
        Decimal::ONE,
        CurrencyClass::Token,
    );
    usdt.min_deposit = Decimal::ONE;
    usdt.min_withdrawal = Decimal::from(5);

    let mut syp = CurrencyItem::new(
        CurrencyCode::parse("syp")?,
        "Syrian Pound",
        Decimal::from(5000),
        CurrencyClass::Fiat,
    );
    syp.min_deposit = Decimal::from(5000);
    syp.min_withdrawal = Decimal::from(25000);

    Ok(vec![usdt, syp])
}
