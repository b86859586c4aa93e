//! Wallet service
//!
//! This module provides the `Wallet`, which orchestrates request flows by
//! coordinating the registries, the conversion engine, the ledger store and
//! the relay.
//!
//! The wallet enforces business rules such as:
//! - Validation against the method and currency registries before the ledger
//!   is touched
//! - Creation-time balance effects (withdrawals and recharges debit at once,
//!   instant deposits credit at once, conversions move both legs)
//! - Mirroring ledger events and settings changes to the relay

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::balance::BalanceMutator;
use crate::core::conversion::{ConversionEngine, Quote};
use crate::core::ledger::{BalanceEffect, LedgerStore, StatusChange};
use crate::core::methods::MethodRegistry;
use crate::core::registry::CurrencyRegistry;
use crate::core::report::{summarize, Bucket, SummaryRow};
use crate::core::traits::{
    ConfigRepository, LedgerRepository, RelayRepository, Store, UserRepository,
};
use crate::core::users::{normalize_email, NewUser, ProfileUpdate, UserDirectory};
use crate::io::backup::BackupDocument;
use crate::relay::{Relay, RelayEvent, RelaySettings};
use crate::types::{
    Balances, CurrencyCode, CurrencyItem, DepositMethod, ExchangeSettings, MethodRef,
    Transaction, TransactionDetails, TransactionFilter, TransactionId, TransactionStatus, User,
    UserId, WalletError, WithdrawalMethod,
};

/// Deposit request
#[derive(Debug, Clone, PartialEq)]
pub struct DepositRequest {
    pub user_id: UserId,
    pub method_id: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub proof_image: Option<String>,
    pub reference: Option<String>,
}

/// Withdrawal request
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalRequest {
    pub user_id: UserId,
    pub method_id: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub recipient: String,
}

/// Conversion request
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub user_id: UserId,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub amount: Decimal,
}

/// Game credit top-up request
#[derive(Debug, Clone, PartialEq)]
pub struct RechargeRequest {
    pub user_id: UserId,
    pub game: String,
    pub account_id: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

/// What a restore overwrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub sections: Vec<&'static str>,
    pub users: usize,
    pub transactions: usize,
}

/// Request flows and back-office operations over one store
pub struct Wallet {
    users_repo: Arc<dyn UserRepository>,
    config_repo: Arc<dyn ConfigRepository>,
    relay_repo: Arc<dyn RelayRepository>,
    currencies: CurrencyRegistry,
    methods: MethodRegistry,
    conversion: ConversionEngine,
    balances: BalanceMutator,
    ledger: LedgerStore,
    users: UserDirectory,
    relay: Relay,
}

impl Wallet {
    /// Create a wallet over `store`
    ///
    /// # Arguments
    ///
    /// * `store` - Backend holding users, ledger, configuration and relay state
    /// * `relay` - Relay handle; should share `store` as its repository
    pub fn new<S: Store + 'static>(store: Arc<S>, relay: Relay) -> Self {
        let users_repo: Arc<dyn UserRepository> = store.clone();
        let config_repo: Arc<dyn ConfigRepository> = store.clone();
        let relay_repo: Arc<dyn RelayRepository> = store.clone();

        let currencies = CurrencyRegistry::new(config_repo.clone());
        let methods = MethodRegistry::new(currencies.clone(), config_repo.clone());
        let conversion = ConversionEngine::new(currencies.clone(), config_repo.clone());
        let balances = BalanceMutator::new(users_repo.clone(), currencies.clone());
        let ledger = LedgerStore::new(store, balances.clone());
        let users = UserDirectory::new(users_repo.clone(), currencies.clone());

        Wallet {
            users_repo,
            config_repo,
            relay_repo,
            currencies,
            methods,
            conversion,
            balances,
            ledger,
            users,
            relay,
        }
    }

    pub fn currencies(&self) -> &CurrencyRegistry {
        &self.currencies
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn conversion(&self) -> &ConversionEngine {
        &self.conversion
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Seed the stock currencies on an empty store
    pub fn initialize(&self) -> Result<bool, WalletError> {
        let seeded = self.currencies.seed_defaults()?;
        if seeded {
            self.config_repo
                .save_exchange_settings(ExchangeSettings::default())?;
        }
        Ok(seeded)
    }

    // Users

    pub fn register(&self, input: NewUser) -> Result<User, WalletError> {
        let user = self.users.register(input)?;
        self.relay.enqueue(&RelayEvent::UserRegistered {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        });
        Ok(user)
    }

    pub fn authenticate(
        &self,
        email: &str,
        password: &str,
        code: Option<&str>,
    ) -> Result<User, WalletError> {
        self.users.authenticate(email, password, code)
    }

    pub fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User, WalletError> {
        self.users.update_profile(id, update)
    }

    pub fn balances(&self, user: UserId) -> Result<Balances, WalletError> {
        self.balances.balances(user)
    }

    // Request flows

    /// Submit a deposit
    ///
    /// Instant methods complete and credit immediately; others stay pending
    /// until an admin decides.
    ///
    /// # Errors
    ///
    /// Any validation error from the method registry; nothing is recorded.
    pub fn request_deposit(&self, request: DepositRequest) -> Result<Transaction, WalletError> {
        self.users.get(request.user_id)?;
        let method = self.methods.validate_deposit(
            &request.method_id,
            &request.currency,
            request.amount,
            request.proof_image.as_deref(),
            request.reference.as_deref(),
        )?;

        let tx = Transaction::new(
            request.user_id,
            request.amount,
            request.currency,
            method.settlement.initial_status(),
            TransactionDetails::Deposit {
                method: MethodRef::Registered(method.id),
                proof_image: clean(request.proof_image),
                reference: clean(request.reference),
            },
        );
        self.record(tx)
    }

    /// Submit a withdrawal
    ///
    /// The full amount is debited at once; the method's fee is withheld from
    /// the payout. A rejection refunds the full amount.
    ///
    /// # Errors
    ///
    /// Validation errors, or `InsufficientFunds` when the balance does not
    /// cover the amount; nothing is recorded.
    pub fn request_withdrawal(
        &self,
        request: WithdrawalRequest,
    ) -> Result<Transaction, WalletError> {
        self.users.get(request.user_id)?;
        let validated = self.methods.validate_withdrawal(
            &request.method_id,
            &request.currency,
            request.amount,
            &request.recipient,
        )?;

        let tx = Transaction::new(
            request.user_id,
            request.amount,
            request.currency,
            validated.method.settlement.initial_status(),
            TransactionDetails::Withdrawal {
                method: MethodRef::Registered(validated.method.id),
                recipient: request.recipient.trim().to_string(),
                fee: validated.fee,
                payout: validated.payout,
            },
        );
        self.record(tx)
    }

    /// Exchange between two of the user's currencies
    ///
    /// Recorded as completed with both legs applied together.
    ///
    /// # Errors
    ///
    /// * `Disabled` - conversions are switched off or a currency is inactive
    /// * `SameCurrency`, `InvalidAmount`, `RateUnavailable`
    /// * `InsufficientFunds` - checked before anything is written
    pub fn convert(&self, request: ConversionRequest) -> Result<Transaction, WalletError> {
        let settings = self.conversion.settings()?;
        if !settings.enabled {
            return Err(WalletError::disabled("Currency conversion"));
        }
        if request.from == request.to {
            return Err(WalletError::SameCurrency {
                currency: request.from,
            });
        }
        self.currencies.require_active(&request.from)?;
        self.currencies.require_active(&request.to)?;
        if request.amount <= Decimal::ZERO {
            return Err(WalletError::invalid_amount(request.amount));
        }

        let available = self.balances.balances(request.user_id)?.get(&request.from);
        if available < request.amount {
            return Err(WalletError::insufficient_funds(
                request.user_id,
                &request.from,
                available,
                request.amount,
            ));
        }

        let quote = self.conversion.convert(
            request.amount,
            &request.from,
            &request.to,
            settings.fee_percentage,
        )?;

        let tx = Transaction::new(
            request.user_id,
            request.amount,
            request.from,
            TransactionStatus::Completed,
            TransactionDetails::Conversion {
                target_currency: quote.to,
                target_amount: quote.net,
                rate: quote.rate,
                fee: quote.fee,
            },
        );
        self.record(tx)
    }

    /// Submit a game credit top-up; debits at once, stays pending
    pub fn request_recharge(&self, request: RechargeRequest) -> Result<Transaction, WalletError> {
        self.users.get(request.user_id)?;
        if request.game.trim().is_empty() {
            return Err(WalletError::missing_field("game"));
        }
        if request.account_id.trim().is_empty() {
            return Err(WalletError::missing_field("account_id"));
        }
        self.currencies.require_active(&request.currency)?;
        if request.amount <= Decimal::ZERO {
            return Err(WalletError::invalid_amount(request.amount));
        }

        let tx = Transaction::new(
            request.user_id,
            request.amount,
            request.currency,
            TransactionStatus::Pending,
            TransactionDetails::GameRecharge {
                game: request.game.trim().to_string(),
                account_id: request.account_id.trim().to_string(),
            },
        );
        self.record(tx)
    }

    /// Price a conversion with the configured fee, without recording it
    pub fn quote(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Quote, WalletError> {
        self.conversion.quote(amount, from, to)
    }

    fn record(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        let effect = BalanceEffect::on_create(&tx);
        let stored = self.ledger.append_with_effect(tx, effect)?;

        // The record is committed; a failed lookup only degrades the message
        let user_email = match self.users_repo.find_user(stored.user_id) {
            Ok(user) => user.map(|u| u.email).unwrap_or_default(),
            Err(e) => {
                warn!(tx = %stored.id, "Could not look up user for relay message: {}", e);
                String::new()
            }
        };
        self.relay.enqueue(&RelayEvent::TransactionCreated {
            tx: stored.clone(),
            user_email,
        });
        Ok(stored)
    }

    // Back office

    /// Complete a pending transaction
    pub fn approve(&self, id: TransactionId) -> Result<StatusChange, WalletError> {
        self.decide(id, TransactionStatus::Completed)
    }

    /// Reject a pending transaction, refunding debits
    pub fn reject(&self, id: TransactionId) -> Result<StatusChange, WalletError> {
        self.decide(id, TransactionStatus::Rejected)
    }

    fn decide(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<StatusChange, WalletError> {
        let change = self.ledger.set_status(id, status)?;
        self.relay.enqueue(&RelayEvent::StatusChanged {
            tx: change.transaction.clone(),
            previous: change.previous,
        });
        Ok(change)
    }

    pub fn transaction(&self, id: TransactionId) -> Result<Transaction, WalletError> {
        self.ledger.get(id)
    }

    pub fn transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>, WalletError> {
        Ok(self.ledger.query(filter)?.collect())
    }

    pub fn report(
        &self,
        filter: TransactionFilter,
        bucket: Bucket,
    ) -> Result<Vec<SummaryRow>, WalletError> {
        Ok(summarize(self.ledger.query(filter)?, bucket))
    }

    pub fn add_currency(&self, item: CurrencyItem) -> Result<CurrencyItem, WalletError> {
        let item = self.currencies.add(item)?;
        self.settings_changed(format!("currency {} added", item.code));
        Ok(item)
    }

    pub fn set_currency_active(
        &self,
        code: &CurrencyCode,
        active: bool,
    ) -> Result<CurrencyItem, WalletError> {
        let item = self.currencies.set_active(code, active)?;
        self.settings_changed(format!(
            "currency {} {}",
            code,
            if active { "activated" } else { "deactivated" }
        ));
        Ok(item)
    }

    pub fn set_currency_rate(
        &self,
        code: &CurrencyCode,
        rate: Decimal,
    ) -> Result<CurrencyItem, WalletError> {
        let item = self.currencies.set_rate(code, rate)?;
        self.settings_changed(format!("rate of {} set to {}", code, rate));
        Ok(item)
    }

    pub fn set_currency_minimums(
        &self,
        code: &CurrencyCode,
        min_deposit: Decimal,
        min_withdrawal: Decimal,
    ) -> Result<CurrencyItem, WalletError> {
        let item = self
            .currencies
            .set_minimums(code, min_deposit, min_withdrawal)?;
        self.settings_changed(format!(
            "minimums of {} set to {} / {}",
            code, min_deposit, min_withdrawal
        ));
        Ok(item)
    }

    /// Update the exchange switch and fee; `None` leaves a value unchanged
    pub fn configure_exchange(
        &self,
        enabled: Option<bool>,
        fee_percentage: Option<Decimal>,
    ) -> Result<ExchangeSettings, WalletError> {
        let mut settings = self.conversion.settings()?;
        if let Some(fee) = fee_percentage {
            settings = self.conversion.set_fee_percentage(fee)?;
        }
        if let Some(enabled) = enabled {
            settings = self.conversion.set_enabled(enabled)?;
        }
        self.settings_changed(format!(
            "exchange {} with fee {}%",
            if settings.enabled { "enabled" } else { "disabled" },
            settings.fee_percentage
        ));
        Ok(settings)
    }

    pub fn set_pair_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        rate: Option<Decimal>,
    ) -> Result<ExchangeSettings, WalletError> {
        let settings = self.conversion.set_override(from, to, rate)?;
        match rate {
            Some(rate) => self.settings_changed(format!("rate {} -> {} fixed at {}", from, to, rate)),
            None => self.settings_changed(format!("rate override {} -> {} removed", from, to)),
        }
        Ok(settings)
    }

    pub fn save_deposit_method(&self, method: DepositMethod) -> Result<DepositMethod, WalletError> {
        let method = self.methods.upsert_deposit_method(method)?;
        self.settings_changed(format!("deposit method {} saved", method.id));
        Ok(method)
    }

    pub fn save_withdrawal_method(
        &self,
        method: WithdrawalMethod,
    ) -> Result<WithdrawalMethod, WalletError> {
        let method = self.methods.upsert_withdrawal_method(method)?;
        self.settings_changed(format!("withdrawal method {} saved", method.id));
        Ok(method)
    }

    /// Toggle a method by id, whichever registry holds it
    pub fn set_method_active(&self, id: &str, active: bool) -> Result<(), WalletError> {
        let result = match self.methods.set_deposit_active(id, active) {
            Err(WalletError::NotFound { .. }) => {
                self.methods.set_withdrawal_active(id, active).map(|_| ())
            }
            other => other.map(|_| ()),
        };
        result?;
        self.settings_changed(format!(
            "method {} {}",
            id,
            if active { "activated" } else { "deactivated" }
        ));
        Ok(())
    }

    pub fn relay_settings(&self) -> Result<RelaySettings, WalletError> {
        self.relay_repo.relay_settings()
    }

    /// Replace the relay configuration, keeping the last sync time
    pub fn configure_relay(&self, mut settings: RelaySettings) -> Result<RelaySettings, WalletError> {
        settings.last_sync = self.relay_repo.relay_settings()?.last_sync;
        self.relay_repo.save_relay_settings(settings.clone())?;
        info!(enabled = settings.enabled, ready = settings.is_ready(), "relay configured");
        self.settings_changed("relay configured".to_string());
        Ok(settings)
    }

    fn settings_changed(&self, what: String) {
        self.relay.enqueue(&RelayEvent::SettingsChanged { what });
    }

    // Backup

    /// Capture users, ledger and configuration
    pub fn backup(&self) -> Result<BackupDocument, WalletError> {
        let document = self.ledger.exclusive(|ledger| -> Result<_, WalletError> {
            Ok(BackupDocument {
                users: Some(self.users_repo.list_users()?),
                transactions: Some(ledger.list_transactions()?),
                exchange_rate: Some(self.config_repo.exchange_settings()?),
                deposit_methods: Some(self.config_repo.deposit_methods()?),
                withdrawal_methods: Some(self.config_repo.withdrawal_methods()?),
                currencies: Some(self.config_repo.currencies()?),
                created_at: Some(Utc::now()),
            })
        })?;

        let users = document.users.as_ref().map_or(0, Vec::len);
        let transactions = document.transactions.as_ref().map_or(0, Vec::len);
        info!(users, transactions, "backup created");
        self.relay.enqueue(&RelayEvent::BackupCreated {
            created_at: document.created_at.unwrap_or_else(Utc::now),
            users,
            transactions,
        });
        Ok(document)
    }

    /// Overwrite every section present in `document`
    ///
    /// The document is validated first; on a validation error nothing is
    /// changed.
    pub fn restore(&self, document: BackupDocument) -> Result<RestoreSummary, WalletError> {
        document.validate()?;
        let sections = document.sections();
        if sections.is_empty() {
            warn!("restore document has no sections");
        }

        let summary = self.ledger.exclusive(|ledger| -> Result<_, WalletError> {
            let mut summary = RestoreSummary {
                sections,
                ..Default::default()
            };

            if let Some(currencies) = document.currencies {
                self.config_repo.save_currencies(currencies)?;
            }
            if let Some(settings) = document.exchange_rate {
                self.config_repo.save_exchange_settings(settings)?;
            }
            if let Some(methods) = document.deposit_methods {
                self.config_repo.save_deposit_methods(methods)?;
            }
            if let Some(methods) = document.withdrawal_methods {
                self.config_repo.save_withdrawal_methods(methods)?;
            }
            if let Some(mut users) = document.users {
                for user in &mut users {
                    user.email = normalize_email(&user.email);
                }
                summary.users = users.len();
                self.users_repo.replace_users(users)?;
            }
            if let Some(transactions) = document.transactions {
                summary.transactions = transactions.len();
                ledger.replace_transactions(transactions)?;
            }
            Ok(summary)
        })?;

        info!(
            sections = ?summary.sections,
            users = summary.users,
            transactions = summary.transactions,
            "backup restored"
        );
        Ok(summary)
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{QueuedMessage, RelayError, RelayTransport, RetryPolicy};
    use crate::storage::MemoryStore;
    use crate::types::{Settlement, TransactionType};
    use async_trait::async_trait;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NullTransport;

    #[async_trait]
    impl RelayTransport for NullTransport {
        async fn send(&self, _settings: &RelaySettings, _text: &str) -> Result<(), RelayError> {
            Ok(())
        }
    }

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::parse(s).unwrap()
    }

    fn wallet() -> (Wallet, UserId) {
        let store = Arc::new(MemoryStore::new());
        let relay = Relay::new(
            store.clone(),
            Arc::new(NullTransport),
            RetryPolicy::default(),
            false,
        );
        let wallet = Wallet::new(store, relay);
        wallet.initialize().unwrap();

        wallet
            .save_deposit_method(DepositMethod {
                id: "usdt-trc20".to_string(),
                name: "USDT TRC20".to_string(),
                currency: code("usdt"),
                active: true,
                requires_image: false,
                requires_transaction_id: true,
                settlement: Settlement::RequiresApproval,
            })
            .unwrap();
        wallet
            .save_deposit_method(DepositMethod {
                id: "syp-cash".to_string(),
                name: "Cash desk".to_string(),
                currency: code("syp"),
                active: true,
                requires_image: false,
                requires_transaction_id: false,
                settlement: Settlement::Instant,
            })
            .unwrap();
        wallet
            .save_withdrawal_method(WithdrawalMethod {
                id: "syriatel-cash".to_string(),
                name: "Syriatel Cash".to_string(),
                currency: code("syp"),
                active: true,
                settlement: Settlement::RequiresApproval,
                fee_percentage: dec!(1),
            })
            .unwrap();

        let user = wallet
            .register(NewUser {
                name: "Huda".to_string(),
                email: "huda@example.com".to_string(),
                password: "long enough".to_string(),
                ..Default::default()
            })
            .unwrap();
        (wallet, user.id)
    }

    fn deposit_syp(wallet: &Wallet, user: UserId, amount: Decimal) -> Transaction {
        wallet
            .request_deposit(DepositRequest {
                user_id: user,
                method_id: "syp-cash".to_string(),
                amount,
                currency: code("syp"),
                proof_image: None,
                reference: None,
            })
            .unwrap()
    }

    fn balance(wallet: &Wallet, user: UserId, currency: &str) -> Decimal {
        wallet.balances(user).unwrap().get(&code(currency))
    }

    #[test]
    fn test_pending_deposit_then_approve() {
        let (wallet, user) = setup_pending_deposit();
        let pending = wallet
            .transactions(TransactionFilter {
                status: Some(TransactionStatus::Pending),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(balance(&wallet, user, "usdt"), Decimal::ZERO);

        wallet.approve(pending[0].id).unwrap();

        assert_eq!(balance(&wallet, user, "usdt"), dec!(100));
        assert_eq!(balance(&wallet, user, "syp"), Decimal::ZERO);
    }

    fn setup_pending_deposit() -> (Wallet, UserId) {
        let (wallet, user) = wallet();
        wallet
            .request_deposit(DepositRequest {
                user_id: user,
                method_id: "usdt-trc20".to_string(),
                amount: dec!(100),
                currency: code("usdt"),
                proof_image: None,
                reference: Some(" 0xfeed ".to_string()),
            })
            .unwrap();
        (wallet, user)
    }

    #[test]
    fn test_instant_deposit_credits_immediately() {
        let (wallet, user) = wallet();
        let tx = deposit_syp(&wallet, user, dec!(60000));
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(balance(&wallet, user, "syp"), dec!(60000));
    }

    #[test]
    fn test_withdrawal_debits_and_rejection_restores() {
        let (wallet, user) = wallet();
        deposit_syp(&wallet, user, dec!(60000));

        let tx = wallet
            .request_withdrawal(WithdrawalRequest {
                user_id: user,
                method_id: "syriatel-cash".to_string(),
                amount: dec!(50000),
                currency: code("syp"),
                recipient: "0999123456".to_string(),
            })
            .unwrap();
        assert_eq!(balance(&wallet, user, "syp"), dec!(10000));
        assert!(matches!(
            tx.details,
            TransactionDetails::Withdrawal { fee, payout, .. } if fee == dec!(500) && payout == dec!(49500)
        ));

        wallet.reject(tx.id).unwrap();
        assert_eq!(balance(&wallet, user, "syp"), dec!(60000));
    }

    #[test]
    fn test_withdrawal_insufficient_records_nothing() {
        let (wallet, user) = wallet();
        let result = wallet.request_withdrawal(WithdrawalRequest {
            user_id: user,
            method_id: "syriatel-cash".to_string(),
            amount: dec!(50000),
            currency: code("syp"),
            recipient: "0999123456".to_string(),
        });

        assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));
        assert!(wallet.transactions(TransactionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_reference_fails_before_ledger() {
        let (wallet, user) = wallet();
        let result = wallet.request_deposit(DepositRequest {
            user_id: user,
            method_id: "usdt-trc20".to_string(),
            amount: dec!(100),
            currency: code("usdt"),
            proof_image: None,
            reference: None,
        });
        assert_eq!(result, Err(WalletError::missing_field("reference")));
        assert!(wallet.transactions(TransactionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_conversion_moves_both_legs() {
        let (wallet, user) = setup_pending_deposit();
        let pending = wallet.transactions(TransactionFilter::default()).unwrap();
        wallet.approve(pending[0].id).unwrap();
        wallet.configure_exchange(None, Some(dec!(2))).unwrap();

        let tx = wallet
            .convert(ConversionRequest {
                user_id: user,
                from: code("usdt"),
                to: code("syp"),
                amount: dec!(10),
            })
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.tx_type(), TransactionType::Conversion);
        assert_eq!(balance(&wallet, user, "usdt"), dec!(90));
        assert_eq!(balance(&wallet, user, "syp"), dec!(49000));
    }

    #[rstest]
    #[case::disabled(false, "usdt", "syp", dec!(1))]
    #[case::same_currency(true, "usdt", "usdt", dec!(1))]
    #[case::zero_amount(true, "usdt", "syp", dec!(0))]
    #[case::insufficient(true, "usdt", "syp", dec!(1000))]
    fn test_conversion_rejections(
        #[case] enabled: bool,
        #[case] from: &str,
        #[case] to: &str,
        #[case] amount: Decimal,
    ) {
        let (wallet, user) = wallet();
        wallet.configure_exchange(Some(enabled), None).unwrap();

        let result = wallet.convert(ConversionRequest {
            user_id: user,
            from: code(from),
            to: code(to),
            amount,
        });

        assert!(result.is_err());
        assert!(wallet.transactions(TransactionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_recharge_rejection_refunds() {
        let (wallet, user) = wallet();
        deposit_syp(&wallet, user, dec!(30000));

        let tx = wallet
            .request_recharge(RechargeRequest {
                user_id: user,
                game: "pubg".to_string(),
                account_id: "5123".to_string(),
                amount: dec!(25000),
                currency: code("syp"),
            })
            .unwrap();
        assert_eq!(balance(&wallet, user, "syp"), dec!(5000));

        wallet.reject(tx.id).unwrap();
        assert_eq!(balance(&wallet, user, "syp"), dec!(30000));
        assert!(wallet.approve(tx.id).is_err());
    }

    #[test]
    fn test_backup_then_restore_round_trip() {
        let (wallet, user) = wallet();
        deposit_syp(&wallet, user, dec!(30000));
        let document = wallet.backup().unwrap();

        let (fresh, _) = wallet_without_users();
        let summary = fresh.restore(document).unwrap();

        assert_eq!(summary.users, 1);
        assert_eq!(summary.transactions, 1);
        assert_eq!(balance(&fresh, user, "syp"), dec!(30000));
    }

    fn wallet_without_users() -> (Wallet, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let relay = Relay::new(
            store.clone(),
            Arc::new(NullTransport),
            RetryPolicy::default(),
            false,
        );
        (Wallet::new(store.clone(), relay), store)
    }

    #[test]
    fn test_partial_restore_leaves_other_sections() {
        let (wallet, user) = wallet();
        let restored = wallet
            .restore(BackupDocument {
                currencies: Some(vec![CurrencyItem::new(
                    code("usdt"),
                    "Tether",
                    dec!(1),
                    crate::types::CurrencyClass::Token,
                )]),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(restored.sections, vec!["currencies"]);
        assert_eq!(wallet.currencies().list().unwrap().len(), 1);
        assert!(wallet.users().get(user).is_ok());
        assert_eq!(wallet.methods().deposit_methods().unwrap().len(), 2);
    }

    #[test]
    fn test_restore_normalizes_emails() {
        let (wallet, _) = wallet();
        let mut document = wallet.backup().unwrap();
        if let Some(users) = document.users.as_mut() {
            users[0].email = " Huda@Example.COM".to_string();
        }

        let (fresh, _) = wallet_without_users();
        fresh.restore(document).unwrap();

        assert!(fresh
            .authenticate("huda@example.com", "long enough", None)
            .is_ok());
        let duplicate = fresh.register(NewUser {
            name: "Other".to_string(),
            email: "HUDA@example.com".to_string(),
            password: "long enough".to_string(),
            ..Default::default()
        });
        assert!(matches!(duplicate, Err(WalletError::Duplicate { .. })));
        assert_eq!(fresh.users().list().unwrap().len(), 1);
    }

    /// Memory store whose user lookups fail once a transaction was inserted
    struct LookupFailsAfterInsert {
        inner: MemoryStore,
        inserted: AtomicBool,
    }

    impl UserRepository for LookupFailsAfterInsert {
        fn find_user(&self, id: UserId) -> Result<Option<User>, WalletError> {
            if self.inserted.load(Ordering::SeqCst) {
                return Err(WalletError::storage("disk unavailable"));
            }
            self.inner.find_user(id)
        }
        fn find_user_by_email(&self, email: &str) -> Result<Option<User>, WalletError> {
            self.inner.find_user_by_email(email)
        }
        fn insert_user(&self, user: User) -> Result<User, WalletError> {
            self.inner.insert_user(user)
        }
        fn save_user(&self, user: &User) -> Result<User, WalletError> {
            self.inner.save_user(user)
        }
        fn list_users(&self) -> Result<Vec<User>, WalletError> {
            self.inner.list_users()
        }
        fn replace_users(&self, users: Vec<User>) -> Result<(), WalletError> {
            self.inner.replace_users(users)
        }
    }

    impl LedgerRepository for LookupFailsAfterInsert {
        fn insert_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
            let stored = self.inner.insert_transaction(tx)?;
            self.inserted.store(true, Ordering::SeqCst);
            Ok(stored)
        }
        fn find_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, WalletError> {
            self.inner.find_transaction(id)
        }
        fn update_status(
            &self,
            id: TransactionId,
            expected: TransactionStatus,
            status: TransactionStatus,
            at: chrono::DateTime<Utc>,
        ) -> Result<Transaction, WalletError> {
            self.inner.update_status(id, expected, status, at)
        }
        fn list_transactions(&self) -> Result<Vec<Transaction>, WalletError> {
            self.inner.list_transactions()
        }
        fn replace_transactions(&self, transactions: Vec<Transaction>) -> Result<(), WalletError> {
            self.inner.replace_transactions(transactions)
        }
    }

    impl ConfigRepository for LookupFailsAfterInsert {
        fn currencies(&self) -> Result<Vec<CurrencyItem>, WalletError> {
            self.inner.currencies()
        }
        fn save_currencies(&self, currencies: Vec<CurrencyItem>) -> Result<(), WalletError> {
            self.inner.save_currencies(currencies)
        }
        fn deposit_methods(&self) -> Result<Vec<DepositMethod>, WalletError> {
            self.inner.deposit_methods()
        }
        fn save_deposit_methods(&self, methods: Vec<DepositMethod>) -> Result<(), WalletError> {
            self.inner.save_deposit_methods(methods)
        }
        fn withdrawal_methods(&self) -> Result<Vec<WithdrawalMethod>, WalletError> {
            self.inner.withdrawal_methods()
        }
        fn save_withdrawal_methods(
            &self,
            methods: Vec<WithdrawalMethod>,
        ) -> Result<(), WalletError> {
            self.inner.save_withdrawal_methods(methods)
        }
        fn exchange_settings(&self) -> Result<ExchangeSettings, WalletError> {
            self.inner.exchange_settings()
        }
        fn save_exchange_settings(&self, settings: ExchangeSettings) -> Result<(), WalletError> {
            self.inner.save_exchange_settings(settings)
        }
    }

    impl RelayRepository for LookupFailsAfterInsert {
        fn relay_settings(&self) -> Result<RelaySettings, WalletError> {
            self.inner.relay_settings()
        }
        fn save_relay_settings(&self, settings: RelaySettings) -> Result<(), WalletError> {
            self.inner.save_relay_settings(settings)
        }
        fn relay_queue(&self) -> Result<Vec<QueuedMessage>, WalletError> {
            self.inner.relay_queue()
        }
        fn save_relay_queue(&self, queue: Vec<QueuedMessage>) -> Result<(), WalletError> {
            self.inner.save_relay_queue(queue)
        }
        fn dead_letters(&self) -> Result<Vec<QueuedMessage>, WalletError> {
            self.inner.dead_letters()
        }
        fn push_dead_letter(&self, message: QueuedMessage) -> Result<(), WalletError> {
            self.inner.push_dead_letter(message)
        }
    }

    #[test]
    fn test_recorded_transaction_survives_failed_user_lookup() {
        let store = Arc::new(LookupFailsAfterInsert {
            inner: MemoryStore::new(),
            inserted: AtomicBool::new(false),
        });
        let relay = Relay::new(
            store.clone(),
            Arc::new(NullTransport),
            RetryPolicy::default(),
            false,
        );
        let wallet = Wallet::new(store.clone(), relay);
        wallet.initialize().unwrap();
        wallet
            .configure_relay(RelaySettings {
                enabled: true,
                recipient: Some("42".to_string()),
                token: Some("t".to_string()),
                last_sync: None,
            })
            .unwrap();
        let user = wallet
            .register(NewUser {
                name: "Huda".to_string(),
                email: "huda@example.com".to_string(),
                password: "long enough".to_string(),
                ..Default::default()
            })
            .unwrap();
        let mut funded = store.inner.find_user(user.id).unwrap().unwrap();
        funded.balances.credit(user.id, &code("syp"), dec!(30000)).unwrap();
        store.inner.save_user(&funded).unwrap();

        let tx = wallet.request_recharge(RechargeRequest {
            user_id: user.id,
            game: "pubg".to_string(),
            account_id: "5123".to_string(),
            amount: dec!(25000),
            currency: code("syp"),
        });

        assert!(tx.is_ok());
        assert_eq!(store.inner.list_transactions().unwrap().len(), 1);
        let stored = store.inner.find_user(user.id).unwrap().unwrap();
        assert_eq!(stored.balances.get(&code("syp")), dec!(5000));
        // settings change, registration, transaction created
        assert_eq!(wallet.relay().pending(), 3);
    }

    #[test]
    fn test_relay_enqueues_when_enabled() {
        let (wallet, user) = wallet();
        assert_eq!(wallet.relay().pending(), 0);

        wallet
            .configure_relay(RelaySettings {
                enabled: true,
                recipient: Some("42".to_string()),
                token: Some("t".to_string()),
                last_sync: None,
            })
            .unwrap();
        deposit_syp(&wallet, user, dec!(5000));

        // settings change + transaction created
        assert_eq!(wallet.relay().pending(), 2);
    }
}
