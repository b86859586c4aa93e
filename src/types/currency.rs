//! Currency-related types
//!
//! Defines the validated currency code, registry entries and the exchange
//! settings singleton consulted by the conversion engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::WalletError;

/// Validated currency code
///
/// Codes are stored lowercase (`usdt`, `syp`), 1-12 ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse and normalize a currency code
    ///
    /// # Errors
    ///
    /// Returns `InvalidField` if the code is empty, longer than 12 characters
    /// or contains anything other than ASCII letters and digits.
    pub fn parse(raw: &str) -> Result<Self, WalletError> {
        let code = raw.trim().to_ascii_lowercase();
        if code.is_empty() || code.len() > 12 {
            return Err(WalletError::invalid_field(
                "currency",
                "code must be 1 to 12 characters",
            ));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(WalletError::invalid_field(
                "currency",
                "code must be alphanumeric",
            ));
        }
        Ok(CurrencyCode(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CurrencyCode::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurrencyCode::parse(s)
    }
}

/// Precision class of a currency
///
/// Fiat-like currencies settle at 2 decimal places, tokens at 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyClass {
    #[default]
    Fiat,
    Token,
}

impl CurrencyClass {
    /// Number of decimal places amounts in this class are settled at
    pub fn decimal_places(self) -> u32 {
        match self {
            CurrencyClass::Fiat => 2,
            CurrencyClass::Token => 6,
        }
    }
}

/// Entry of the currency registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyItem {
    pub code: CurrencyCode,
    pub name: String,
    /// Rate relative to the base currency (base has rate 1)
    pub rate: Decimal,
    pub active: bool,
    #[serde(default)]
    pub min_deposit: Decimal,
    #[serde(default)]
    pub min_withdrawal: Decimal,
    #[serde(default)]
    pub class: CurrencyClass,
}

impl CurrencyItem {
    pub fn new(code: CurrencyCode, name: &str, rate: Decimal, class: CurrencyClass) -> Self {
        CurrencyItem {
            code,
            name: name.to_string(),
            rate,
            active: true,
            min_deposit: Decimal::ZERO,
            min_withdrawal: Decimal::ZERO,
            class,
        }
    }
}

/// Explicit rate for one direction of a currency pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: Decimal,
}

/// Exchange configuration singleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSettings {
    /// Whether user-initiated conversions are allowed
    pub enabled: bool,
    /// Fee charged on the converted (gross) amount, in percent
    pub fee_percentage: Decimal,
    /// Pairwise rates taking precedence over base-relative rates
    #[serde(default)]
    pub overrides: Vec<PairRate>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        ExchangeSettings {
            enabled: true,
            fee_percentage: Decimal::ZERO,
            overrides: Vec::new(),
            updated_at: None,
        }
    }
}
