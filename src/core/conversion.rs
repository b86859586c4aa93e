//! Exchange and conversion engine
//!
//! Rates are expressed relative to a base currency (rate 1). The rate from
//! `A` to `B` is `B.rate / A.rate` unless the exchange settings carry an
//! explicit override for that direction.
//!
//! # Rounding
//!
//! Results are settled at the target currency's precision (2 places for
//! fiat, 6 for tokens). The gross amount is rounded toward zero and the fee
//! away from zero, so the net credited never exceeds the exact value and a
//! round trip can only lose value, never create it.

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::info;

use crate::core::registry::CurrencyRegistry;
use crate::core::traits::ConfigRepository;
use crate::types::{CurrencyCode, CurrencyItem, ExchangeSettings, PairRate, WalletError};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Result of a conversion calculation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    /// Source amount
    pub amount: Decimal,
    pub rate: Decimal,
    pub fee_percentage: Decimal,
    /// `amount * rate`, in the target currency
    pub gross: Decimal,
    /// Fee in the target currency
    pub fee: Decimal,
    /// `gross - fee`, credited to the user
    pub net: Decimal,
}

/// Rate from `from` to `to`, or `None` if no quote can be given
///
/// Overrides take precedence. Unknown codes and zero rates yield `None`.
pub fn rate_between(
    currencies: &[CurrencyItem],
    overrides: &[PairRate],
    from: &CurrencyCode,
    to: &CurrencyCode,
) -> Option<Decimal> {
    let known = |code: &CurrencyCode| currencies.iter().find(|c| &c.code == code);
    let (source, target) = (known(from)?, known(to)?);

    if let Some(pair) = overrides.iter().find(|p| &p.from == from && &p.to == to) {
        return (pair.rate > Decimal::ZERO).then_some(pair.rate);
    }

    if source.rate <= Decimal::ZERO || target.rate <= Decimal::ZERO {
        return None;
    }
    target.rate.checked_div(source.rate)
}

/// Apply a rate and a percentage fee at the given precision
///
/// Returns `(gross, fee, net)`.
///
/// # Errors
///
/// Returns an error if the amount is not positive, the fee is outside
/// 0-100 percent, or the computation overflows.
pub fn calculate(
    amount: Decimal,
    rate: Decimal,
    fee_percentage: Decimal,
    decimal_places: u32,
) -> Result<(Decimal, Decimal, Decimal), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::invalid_amount(amount));
    }
    validate_fee(fee_percentage)?;

    let overflow = || WalletError::invalid_field("amount", "conversion overflows");

    let gross = amount
        .checked_mul(rate)
        .ok_or_else(overflow)?
        .round_dp_with_strategy(decimal_places, RoundingStrategy::ToZero);
    let fee = gross
        .checked_mul(fee_percentage)
        .and_then(|v| v.checked_div(HUNDRED))
        .ok_or_else(overflow)?
        .round_dp_with_strategy(decimal_places, RoundingStrategy::AwayFromZero)
        .min(gross);
    let net = gross - fee;

    Ok((gross, fee, net))
}

fn validate_fee(fee_percentage: Decimal) -> Result<(), WalletError> {
    if fee_percentage < Decimal::ZERO || fee_percentage > HUNDRED {
        return Err(WalletError::invalid_field(
            "fee_percentage",
            "must be between 0 and 100",
        ));
    }
    Ok(())
}

/// Quotes conversions and manages the exchange settings
#[derive(Clone)]
pub struct ConversionEngine {
    registry: CurrencyRegistry,
    repo: Arc<dyn ConfigRepository>,
}

impl ConversionEngine {
    pub fn new(registry: CurrencyRegistry, repo: Arc<dyn ConfigRepository>) -> Self {
        ConversionEngine { registry, repo }
    }

    pub fn settings(&self) -> Result<ExchangeSettings, WalletError> {
        self.repo.exchange_settings()
    }

    /// Current rate for a pair, `None` when it cannot be quoted
    pub fn rate_between(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Option<Decimal>, WalletError> {
        let settings = self.settings()?;
        Ok(rate_between(
            &self.registry.list()?,
            &settings.overrides,
            from,
            to,
        ))
    }

    /// Convert `amount` of `from` into `to` with an explicit fee
    ///
    /// # Errors
    ///
    /// * `SameCurrency` - `from == to`
    /// * `UnknownCurrency` - either code is unregistered
    /// * `RateUnavailable` - no usable rate for the pair
    /// * `InvalidAmount` / `InvalidField` - bad amount, fee, or a result that
    ///   rounds to nothing
    pub fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
        fee_percentage: Decimal,
    ) -> Result<Quote, WalletError> {
        if from == to {
            return Err(WalletError::SameCurrency {
                currency: from.clone(),
            });
        }
        let target = self.registry.get(to)?;
        self.registry.get(from)?;

        let rate = self
            .rate_between(from, to)?
            .ok_or_else(|| WalletError::RateUnavailable {
                from: from.clone(),
                to: to.clone(),
            })?;

        let (gross, fee, net) =
            calculate(amount, rate, fee_percentage, target.class.decimal_places())?;
        if net <= Decimal::ZERO {
            return Err(WalletError::invalid_field(
                "amount",
                "too small to convert at this rate",
            ));
        }

        Ok(Quote {
            from: from.clone(),
            to: to.clone(),
            amount,
            rate,
            fee_percentage,
            gross,
            fee,
            net,
        })
    }

    /// Convert with the configured exchange fee
    pub fn quote(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Quote, WalletError> {
        let settings = self.settings()?;
        self.convert(amount, from, to, settings.fee_percentage)
    }

    /// Turn user conversions on or off
    pub fn set_enabled(&self, enabled: bool) -> Result<ExchangeSettings, WalletError> {
        self.modify(|s| s.enabled = enabled)
    }

    pub fn set_fee_percentage(&self, fee: Decimal) -> Result<ExchangeSettings, WalletError> {
        validate_fee(fee)?;
        self.modify(|s| s.fee_percentage = fee)
    }

    /// Set (or with `None`, remove) the explicit rate for one direction
    pub fn set_override(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        rate: Option<Decimal>,
    ) -> Result<ExchangeSettings, WalletError> {
        if from == to {
            return Err(WalletError::SameCurrency {
                currency: from.clone(),
            });
        }
        self.registry.get(from)?;
        self.registry.get(to)?;
        if rate.is_some_and(|r| r <= Decimal::ZERO) {
            return Err(WalletError::invalid_field("rate", "must be greater than zero"));
        }

        self.modify(|s| {
            s.overrides.retain(|p| !(&p.from == from && &p.to == to));
            if let Some(rate) = rate {
                s.overrides.push(PairRate {
                    from: from.clone(),
                    to: to.clone(),
                    rate,
                });
            }
        })
    }

    fn modify(
        &self,
        change: impl FnOnce(&mut ExchangeSettings),
    ) -> Result<ExchangeSettings, WalletError> {
        let mut settings = self.settings()?;
        change(&mut settings);
        settings.updated_at = Some(Utc::now());
        self.repo.save_exchange_settings(settings.clone())?;
        info!(
            enabled = settings.enabled,
            fee = %settings.fee_percentage,
            overrides = settings.overrides.len(),
            "exchange settings updated"
        );
        Ok(settings)
    }
}
