//! Ledger store
//!
//! This module provides the `LedgerStore`, the append-only transaction log
//! and the only place a transaction's status changes.
//!
//! # Atomicity
//!
//! Every write that carries a balance effect runs inside one critical
//! section: the effect is applied first, then the record is written. If the
//! write fails the effect is reverted, so a balance never moves without a
//! matching ledger entry and vice versa.
//!
//! # Status lifecycle
//!
//! `pending -> completed` or `pending -> rejected`. Terminal states are
//! immutable; nothing moves back to pending.

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};

use crate::core::balance::BalanceMutator;
use crate::core::traits::LedgerRepository;
use crate::types::{
    CurrencyCode, Transaction, TransactionDetails, TransactionFilter, TransactionId,
    TransactionStatus, UserId, WalletError,
};

/// Balance change paired with a ledger write
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceEffect {
    None,
    Credit {
        currency: CurrencyCode,
        amount: Decimal,
    },
    Debit {
        currency: CurrencyCode,
        amount: Decimal,
    },
    /// Debit one currency and credit another in one save
    Exchange {
        debit: (CurrencyCode, Decimal),
        credit: (CurrencyCode, Decimal),
    },
}

impl BalanceEffect {
    /// Effect of recording `tx` as it stands
    ///
    /// Withdrawals and game recharges debit at creation whatever their
    /// status; deposits credit only when already completed; a completed
    /// conversion moves both legs.
    pub fn on_create(tx: &Transaction) -> BalanceEffect {
        match (&tx.details, tx.status) {
            (TransactionDetails::Deposit { .. }, TransactionStatus::Completed) => {
                BalanceEffect::Credit {
                    currency: tx.currency.clone(),
                    amount: tx.amount,
                }
            }
            (TransactionDetails::Deposit { .. }, _) => BalanceEffect::None,
            (TransactionDetails::Withdrawal { .. }, _)
            | (TransactionDetails::GameRecharge { .. }, _) => BalanceEffect::Debit {
                currency: tx.currency.clone(),
                amount: tx.amount,
            },
            (
                TransactionDetails::Conversion {
                    target_currency,
                    target_amount,
                    ..
                },
                TransactionStatus::Completed,
            ) => BalanceEffect::Exchange {
                debit: (tx.currency.clone(), tx.amount),
                credit: (target_currency.clone(), *target_amount),
            },
            (TransactionDetails::Conversion { .. }, _) => BalanceEffect::None,
        }
    }

    /// Effect of moving a pending `tx` to `status`
    pub fn on_transition(tx: &Transaction, status: TransactionStatus) -> BalanceEffect {
        match (&tx.details, status) {
            (TransactionDetails::Deposit { .. }, TransactionStatus::Completed) => {
                BalanceEffect::Credit {
                    currency: tx.currency.clone(),
                    amount: tx.amount,
                }
            }
            (TransactionDetails::Withdrawal { .. }, TransactionStatus::Rejected)
            | (TransactionDetails::GameRecharge { .. }, TransactionStatus::Rejected) => {
                BalanceEffect::Credit {
                    currency: tx.currency.clone(),
                    amount: tx.amount,
                }
            }
            // A pending conversion only exists in restored data, where its
            // exchange was already applied
            (
                TransactionDetails::Conversion {
                    target_currency,
                    target_amount,
                    ..
                },
                TransactionStatus::Rejected,
            ) => BalanceEffect::Exchange {
                debit: (target_currency.clone(), *target_amount),
                credit: (tx.currency.clone(), tx.amount),
            },
            _ => BalanceEffect::None,
        }
    }

    /// The effect that undoes this one
    pub fn inverse(&self) -> BalanceEffect {
        match self {
            BalanceEffect::None => BalanceEffect::None,
            BalanceEffect::Credit { currency, amount } => BalanceEffect::Debit {
                currency: currency.clone(),
                amount: *amount,
            },
            BalanceEffect::Debit { currency, amount } => BalanceEffect::Credit {
                currency: currency.clone(),
                amount: *amount,
            },
            BalanceEffect::Exchange { debit, credit } => BalanceEffect::Exchange {
                debit: credit.clone(),
                credit: debit.clone(),
            },
        }
    }

    fn apply(&self, balances: &BalanceMutator, user: UserId) -> Result<(), WalletError> {
        match self {
            BalanceEffect::None => Ok(()),
            BalanceEffect::Credit { currency, amount } => {
                balances.credit(user, currency, *amount).map(|_| ())
            }
            BalanceEffect::Debit { currency, amount } => {
                balances.debit(user, currency, *amount).map(|_| ())
            }
            BalanceEffect::Exchange { debit, credit } => balances
                .exchange(user, (&debit.0, debit.1), (&credit.0, credit.1))
                .map(|_| ()),
        }
    }
}

/// Outcome of a status change
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub transaction: Transaction,
    pub previous: TransactionStatus,
}

/// Append-only transaction log with paired balance effects
#[derive(Clone)]
pub struct LedgerStore {
    repo: Arc<dyn LedgerRepository>,
    balances: BalanceMutator,
    /// Serializes every ledger write together with its balance effect
    critical: Arc<Mutex<()>>,
}

impl LedgerStore {
    pub fn new(repo: Arc<dyn LedgerRepository>, balances: BalanceMutator) -> Self {
        LedgerStore {
            repo,
            balances,
            critical: Arc::new(Mutex::new(())),
        }
    }

    /// Store a record as given, without touching balances
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` if the amount is not positive and `Duplicate`
    /// on an id collision.
    pub fn append(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        self.append_with_effect(tx, BalanceEffect::None)
    }

    /// Store a record and apply its creation-time balance effect atomically
    ///
    /// # Arguments
    ///
    /// * `tx` - The record to append
    /// * `effect` - Balance change that must accompany it
    ///
    /// # Returns
    ///
    /// * `Ok(Transaction)` - The stored record
    /// * `Err(WalletError)` - Nothing was appended and balances are unchanged
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The amount is zero or negative
    /// - The effect fails (e.g. `InsufficientFunds`)
    /// - The record cannot be stored
    pub fn append_with_effect(
        &self,
        tx: Transaction,
        effect: BalanceEffect,
    ) -> Result<Transaction, WalletError> {
        if tx.amount <= Decimal::ZERO {
            return Err(WalletError::invalid_amount(tx.amount));
        }

        let _guard = self.critical.lock();
        effect.apply(&self.balances, tx.user_id)?;

        match self.repo.insert_transaction(tx.clone()) {
            Ok(stored) => {
                info!(
                    tx = %stored.id,
                    user = %stored.user_id,
                    kind = %stored.tx_type(),
                    status = %stored.status,
                    amount = %stored.amount,
                    currency = %stored.currency,
                    "transaction recorded"
                );
                Ok(stored)
            }
            Err(e) => {
                self.revert(&effect, tx.user_id, tx.id);
                Err(e)
            }
        }
    }

    /// Move a pending transaction to a terminal status
    ///
    /// Applies the balance effect of the transition (credit on deposit
    /// completion, refund on withdrawal or recharge rejection) together with
    /// the status write.
    ///
    /// # Errors
    ///
    /// * `NotFound` - unknown id
    /// * `InvalidTransition` - the record is terminal or `status` is pending
    /// * any balance error; the status is then unchanged
    pub fn set_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<StatusChange, WalletError> {
        let _guard = self.critical.lock();
        let current = self.get(id)?;

        if current.status.is_terminal() || !status.is_terminal() {
            return Err(WalletError::invalid_transition(id, current.status, status));
        }

        let effect = BalanceEffect::on_transition(&current, status);
        effect.apply(&self.balances, current.user_id)?;

        match self
            .repo
            .update_status(id, current.status, status, Utc::now())
        {
            Ok(updated) => {
                info!(
                    tx = %id,
                    from = %current.status,
                    to = %status,
                    "transaction status changed"
                );
                Ok(StatusChange {
                    transaction: updated,
                    previous: current.status,
                })
            }
            Err(e) => {
                self.revert(&effect, current.user_id, id);
                Err(e)
            }
        }
    }

    /// Look up a record
    pub fn get(&self, id: TransactionId) -> Result<Transaction, WalletError> {
        self.repo
            .find_transaction(id)?
            .ok_or_else(|| WalletError::not_found("Transaction", id))
    }

    /// Records matching `filter`, in insertion order
    ///
    /// Works on a snapshot taken at call time; filtering is lazy.
    pub fn query(
        &self,
        filter: TransactionFilter,
    ) -> Result<impl Iterator<Item = Transaction>, WalletError> {
        Ok(self
            .repo
            .list_transactions()?
            .into_iter()
            .filter(move |tx| filter.matches(tx)))
    }

    /// Run `f` against the repository while holding the ledger's critical
    /// section, so no append or status change interleaves with it
    pub(crate) fn exclusive<T>(&self, f: impl FnOnce(&dyn LedgerRepository) -> T) -> T {
        let _guard = self.critical.lock();
        f(self.repo.as_ref())
    }

    fn revert(&self, effect: &BalanceEffect, user: UserId, tx: TransactionId) {
        if let Err(e) = effect.inverse().apply(&self.balances, user) {
            error!(
                tx = %tx,
                user = %user,
                "Could not revert balance effect after failed ledger write: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::CurrencyRegistry;
    use crate::core::traits::UserRepository;
    use crate::storage::MemoryStore;
    use crate::types::{Balances, MethodRef, TransactionType, User};
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::parse(s).unwrap()
    }

    struct Fixture {
        ledger: LedgerStore,
        balances: BalanceMutator,
        user: UserId,
    }

    fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let registry = CurrencyRegistry::new(store.clone());
        registry.seed_defaults().unwrap();
        let user = store
            .insert_user(User {
                id: Uuid::new_v4(),
                name: "Lina".to_string(),
                email: "lina@example.com".to_string(),
                password_hash: String::new(),
                telegram: None,
                phone: None,
                balances: Balances::new(),
                two_factor: None,
                created_at: Utc::now(),
                version: 0,
            })
            .unwrap();
        let balances = BalanceMutator::new(store.clone(), registry);
        Fixture {
            ledger: LedgerStore::new(store, balances.clone()),
            balances,
            user: user.id,
        }
    }

    fn deposit(user: UserId, amount: Decimal, status: TransactionStatus) -> Transaction {
        Transaction::new(
            user,
            amount,
            code("usdt"),
            status,
            TransactionDetails::Deposit {
                method: MethodRef::Registered("usdt-trc20".to_string()),
                proof_image: None,
                reference: Some("0xabc".to_string()),
            },
        )
    }

    fn withdrawal(user: UserId, amount: Decimal) -> Transaction {
        Transaction::new(
            user,
            amount,
            code("syp"),
            TransactionStatus::Pending,
            TransactionDetails::Withdrawal {
                method: MethodRef::Legacy("Syriatel Cash".to_string()),
                recipient: "0999123456".to_string(),
                fee: Decimal::ZERO,
                payout: amount,
            },
        )
    }

    fn balance(f: &Fixture, currency: &str) -> Decimal {
        f.balances.balances(f.user).unwrap().get(&code(currency))
    }

    #[test]
    fn test_pending_deposit_completion_credits_once() {
        let f = setup();
        let tx = f
            .ledger
            .append(deposit(f.user, dec!(100), TransactionStatus::Pending))
            .unwrap();
        assert_eq!(balance(&f, "usdt"), Decimal::ZERO);

        let change = f.ledger.set_status(tx.id, TransactionStatus::Completed).unwrap();

        assert_eq!(change.previous, TransactionStatus::Pending);
        assert!(change.transaction.updated_at.is_some());
        assert_eq!(balance(&f, "usdt"), dec!(100));
        assert_eq!(balance(&f, "syp"), Decimal::ZERO);
    }

    #[test]
    fn test_withdrawal_rejection_refunds() {
        let f = setup();
        f.balances.credit(f.user, &code("syp"), dec!(80000)).unwrap();

        let tx = withdrawal(f.user, dec!(50000));
        let effect = BalanceEffect::on_create(&tx);
        let tx = f.ledger.append_with_effect(tx, effect).unwrap();
        assert_eq!(balance(&f, "syp"), dec!(30000));

        f.ledger.set_status(tx.id, TransactionStatus::Rejected).unwrap();
        assert_eq!(balance(&f, "syp"), dec!(80000));
    }

    #[test]
    fn test_failed_effect_appends_nothing() {
        let f = setup();
        let tx = withdrawal(f.user, dec!(50000));
        let effect = BalanceEffect::on_create(&tx);

        let result = f.ledger.append_with_effect(tx, effect);

        assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));
        assert_eq!(f.ledger.query(TransactionFilter::default()).unwrap().count(), 0);
    }

    #[test]
    fn test_duplicate_append_reverts_effect() {
        let f = setup();
        let tx = deposit(f.user, dec!(10), TransactionStatus::Completed);
        f.ledger
            .append_with_effect(tx.clone(), BalanceEffect::on_create(&tx))
            .unwrap();

        let result = f.ledger.append_with_effect(tx.clone(), BalanceEffect::on_create(&tx));

        assert!(matches!(result, Err(WalletError::Duplicate { .. })));
        assert_eq!(balance(&f, "usdt"), dec!(10));
    }

    #[rstest]
    #[case::complete_completed(TransactionStatus::Completed, TransactionStatus::Completed)]
    #[case::reject_completed(TransactionStatus::Completed, TransactionStatus::Rejected)]
    #[case::back_to_pending(TransactionStatus::Pending, TransactionStatus::Pending)]
    fn test_invalid_transitions(
        #[case] initial: TransactionStatus,
        #[case] target: TransactionStatus,
    ) {
        let f = setup();
        let tx = f.ledger.append(deposit(f.user, dec!(5), initial)).unwrap();

        let result = f.ledger.set_status(tx.id, target);

        assert!(matches!(result, Err(WalletError::InvalidTransition { .. })));
        assert_eq!(f.ledger.get(tx.id).unwrap().status, initial);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let f = setup();
        let tx = f
            .ledger
            .append(deposit(f.user, dec!(5), TransactionStatus::Pending))
            .unwrap();
        f.ledger.set_status(tx.id, TransactionStatus::Rejected).unwrap();

        assert!(f.ledger.set_status(tx.id, TransactionStatus::Completed).is_err());
        assert_eq!(balance(&f, "usdt"), Decimal::ZERO);
    }

    #[test]
    fn test_set_status_unknown_id() {
        let f = setup();
        let result = f.ledger.set_status(Uuid::new_v4(), TransactionStatus::Completed);
        assert!(matches!(result, Err(WalletError::NotFound { .. })));
    }

    #[test]
    fn test_rejecting_restored_conversion_reverses_exchange() {
        let f = setup();
        f.balances.credit(f.user, &code("syp"), dec!(49000)).unwrap();
        let tx = f
            .ledger
            .append(Transaction::new(
                f.user,
                dec!(10),
                code("usdt"),
                TransactionStatus::Pending,
                TransactionDetails::Conversion {
                    target_currency: code("syp"),
                    target_amount: dec!(49000),
                    rate: dec!(5000),
                    fee: dec!(1000),
                },
            ))
            .unwrap();

        f.ledger.set_status(tx.id, TransactionStatus::Rejected).unwrap();

        assert_eq!(balance(&f, "syp"), Decimal::ZERO);
        assert_eq!(balance(&f, "usdt"), dec!(10));
    }

    #[test]
    fn test_query_filters_in_insertion_order() {
        let f = setup();
        f.balances.credit(f.user, &code("syp"), dec!(100000)).unwrap();
        let first = f
            .ledger
            .append(deposit(f.user, dec!(1), TransactionStatus::Pending))
            .unwrap();
        let w = withdrawal(f.user, dec!(30000));
        f.ledger
            .append_with_effect(w.clone(), BalanceEffect::on_create(&w))
            .unwrap();
        let third = f
            .ledger
            .append(deposit(f.user, dec!(2), TransactionStatus::Pending))
            .unwrap();

        let deposits: Vec<_> = f
            .ledger
            .query(TransactionFilter {
                tx_type: Some(TransactionType::Deposit),
                ..Default::default()
            })
            .unwrap()
            .map(|tx| tx.id)
            .collect();

        assert_eq!(deposits, vec![first.id, third.id]);
    }

    #[test]
    fn test_effect_inverse_round_trip() {
        let effect = BalanceEffect::Exchange {
            debit: (code("usdt"), dec!(10)),
            credit: (code("syp"), dec!(49000)),
        };
        assert_eq!(effect.inverse().inverse(), effect);
    }
}
