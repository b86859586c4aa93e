//! End-to-end integration tests
//!
//! These tests drive the wallet through its public API against a JSON-file
//! store in a temporary directory. Each test:
//! 1. Restores the configuration fixture from tests/fixtures/seed_config.json
//! 2. Registers users and submits requests
//! 3. Checks balances, ledger contents and (where relevant) the reopened file
//!
//! The scenarios cover:
//! - Pending deposits and their approval
//! - Withdrawals debited up front and refunded on rejection
//! - Conversions between currencies with fees
//! - Backup and restore through files
//! - Relay delivery with transient failures

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use wallet_ledger::core::{
        ConversionRequest, DepositRequest, NewUser, RechargeRequest, Wallet, WithdrawalRequest,
    };
    use wallet_ledger::io::{read_backup_file, write_backup_file, write_transactions_csv};
    use wallet_ledger::relay::{
        Relay, RelayError, RelaySettings, RelayTransport, RetryPolicy,
    };
    use wallet_ledger::storage::FileStore;
    use wallet_ledger::types::{
        CurrencyCode, TransactionFilter, TransactionStatus, UserId, WalletError,
    };

    const FIXTURE: &str = "tests/fixtures/seed_config.json";

    /// Fails the first `failures` sends, then records delivered texts
    struct FlakyTransport {
        failures: usize,
        calls: AtomicUsize,
        delivered: Mutex<Vec<String>>,
    }

    impl FlakyTransport {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RelayTransport for FlakyTransport {
        async fn send(&self, _settings: &RelaySettings, text: &str) -> Result<(), RelayError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(RelayError::Http {
                    status: 502,
                    message: "bad gateway".to_string(),
                });
            }
            self.delivered.lock().push(text.to_string());
            Ok(())
        }
    }

    fn code(raw: &str) -> CurrencyCode {
        CurrencyCode::parse(raw).unwrap()
    }

    /// Open a wallet on `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Data file; created on first write
    /// * `transport` - Relay transport the wallet delivers to
    fn open(path: &Path, transport: Arc<dyn RelayTransport>) -> Wallet {
        let store = Arc::new(FileStore::open(path).unwrap());
        let relay = Relay::new(store.clone(), transport, RetryPolicy::default(), false);
        Wallet::new(store, relay)
    }

    /// Temporary data file with the fixture configuration and one user
    fn seeded(transport: Arc<dyn RelayTransport>) -> (TempDir, PathBuf, Wallet, UserId) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.json");
        let wallet = open(&path, transport);

        let summary = wallet
            .restore(read_backup_file(Path::new(FIXTURE)).unwrap())
            .unwrap();
        assert_eq!(
            summary.sections,
            vec!["exchangeRate", "depositMethods", "withdrawalMethods", "currencies"]
        );

        let user = wallet
            .register(NewUser {
                name: "Huda".to_string(),
                email: "Huda@Example.com".to_string(),
                password: "correct horse".to_string(),
                ..Default::default()
            })
            .unwrap();
        (dir, path, wallet, user.id)
    }

    fn balance(wallet: &Wallet, user: UserId, currency: &str) -> Decimal {
        wallet.balances(user).unwrap().get(&code(currency))
    }

    fn deposit_cash(wallet: &Wallet, user: UserId, amount: Decimal) {
        wallet
            .request_deposit(DepositRequest {
                user_id: user,
                method_id: "syp-cash".to_string(),
                amount,
                currency: code("syp"),
                proof_image: None,
                reference: None,
            })
            .unwrap();
    }

    #[test]
    fn test_pending_deposit_approved_after_reopen() {
        let (_dir, path, wallet, user) = seeded(Arc::new(FlakyTransport::new(0)));

        let tx = wallet
            .request_deposit(DepositRequest {
                user_id: user,
                method_id: "usdt-trc20".to_string(),
                amount: dec!(100),
                currency: code("usdt"),
                proof_image: None,
                reference: Some("0xabc".to_string()),
            })
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        drop(wallet);

        let wallet = open(&path, Arc::new(FlakyTransport::new(0)));
        wallet.approve(tx.id).unwrap();

        assert_eq!(balance(&wallet, user, "usdt"), dec!(100));
        assert_eq!(balance(&wallet, user, "syp"), Decimal::ZERO);
        assert!(matches!(
            wallet.reject(tx.id),
            Err(WalletError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_withdrawal_rejection_restores_balance() {
        let (_dir, _path, wallet, user) = seeded(Arc::new(FlakyTransport::new(0)));
        deposit_cash(&wallet, user, dec!(75000));

        let tx = wallet
            .request_withdrawal(WithdrawalRequest {
                user_id: user,
                method_id: "syriatel-cash".to_string(),
                amount: dec!(50000),
                currency: code("syp"),
                recipient: "0933000000".to_string(),
            })
            .unwrap();
        assert_eq!(balance(&wallet, user, "syp"), dec!(25000));

        wallet.reject(tx.id).unwrap();
        assert_eq!(balance(&wallet, user, "syp"), dec!(75000));
    }

    #[test]
    fn test_below_minimum_withdrawal_records_nothing() {
        let (_dir, _path, wallet, user) = seeded(Arc::new(FlakyTransport::new(0)));
        deposit_cash(&wallet, user, dec!(75000));

        let result = wallet.request_withdrawal(WithdrawalRequest {
            user_id: user,
            method_id: "syriatel-cash".to_string(),
            amount: dec!(10000),
            currency: code("syp"),
            recipient: "0933000000".to_string(),
        });

        assert!(matches!(result, Err(WalletError::BelowMinimum { .. })));
        assert_eq!(balance(&wallet, user, "syp"), dec!(75000));
        assert_eq!(
            wallet.transactions(TransactionFilter::default()).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_conversion_with_fixture_fee() {
        let (_dir, _path, wallet, user) = seeded(Arc::new(FlakyTransport::new(0)));
        let tx = wallet
            .request_deposit(DepositRequest {
                user_id: user,
                method_id: "usdt-trc20".to_string(),
                amount: dec!(10),
                currency: code("usdt"),
                proof_image: None,
                reference: Some("0xabc".to_string()),
            })
            .unwrap();
        wallet.approve(tx.id).unwrap();

        wallet
            .convert(ConversionRequest {
                user_id: user,
                from: code("usdt"),
                to: code("syp"),
                amount: dec!(10),
            })
            .unwrap();

        assert_eq!(balance(&wallet, user, "usdt"), Decimal::ZERO);
        assert_eq!(balance(&wallet, user, "syp"), dec!(49000));

        // converting back never yields more than was spent
        wallet
            .convert(ConversionRequest {
                user_id: user,
                from: code("syp"),
                to: code("usdt"),
                amount: dec!(49000),
            })
            .unwrap();
        assert!(balance(&wallet, user, "usdt") <= dec!(10));
    }

    #[test]
    fn test_duplicate_email_leaves_registry_unchanged() {
        let (_dir, _path, wallet, _user) = seeded(Arc::new(FlakyTransport::new(0)));

        let result = wallet.register(NewUser {
            name: "Someone else".to_string(),
            email: "  huda@EXAMPLE.com ".to_string(),
            password: "another password".to_string(),
            ..Default::default()
        });

        assert!(matches!(result, Err(WalletError::Duplicate { .. })));
        assert_eq!(wallet.users().list().unwrap().len(), 1);
    }

    #[test]
    fn test_backup_file_restores_into_fresh_store() {
        let (dir, _path, wallet, user) = seeded(Arc::new(FlakyTransport::new(0)));
        deposit_cash(&wallet, user, dec!(30000));
        wallet
            .request_recharge(RechargeRequest {
                user_id: user,
                game: "pubg".to_string(),
                account_id: "5123".to_string(),
                amount: dec!(5000),
                currency: code("syp"),
            })
            .unwrap();

        let backup_path = dir.path().join("backup.json");
        write_backup_file(&backup_path, &wallet.backup().unwrap()).unwrap();

        let fresh = open(&dir.path().join("fresh.json"), Arc::new(FlakyTransport::new(0)));
        let summary = fresh
            .restore(read_backup_file(&backup_path).unwrap())
            .unwrap();

        assert_eq!(summary.users, 1);
        assert_eq!(summary.transactions, 2);
        assert_eq!(balance(&fresh, user, "syp"), dec!(25000));
        assert!(fresh
            .authenticate("huda@example.com", "correct horse", None)
            .is_ok());

        let pending = fresh
            .transactions(TransactionFilter {
                status: Some(TransactionStatus::Pending),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_csv_export_of_query() {
        let (_dir, _path, wallet, user) = seeded(Arc::new(FlakyTransport::new(0)));
        deposit_cash(&wallet, user, dec!(30000));

        let transactions = wallet
            .transactions(TransactionFilter {
                user_id: Some(user),
                ..Default::default()
            })
            .unwrap();
        let mut output = Vec::new();
        write_transactions_csv(&transactions, &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,user,type,status,amount,currency,created_at,updated_at")
        );
        let row = lines.next().unwrap();
        assert!(row.contains(",deposit,completed,30000,syp,"));
        assert!(lines.next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_delivers_in_order_after_failures() {
        let transport = Arc::new(FlakyTransport::new(2));
        let (_dir, path, wallet, user) = seeded(transport.clone());
        wallet
            .configure_relay(RelaySettings {
                enabled: true,
                recipient: Some("-100200".to_string()),
                token: Some("bot-token".to_string()),
                last_sync: None,
            })
            .unwrap();

        for amount in [dec!(5000), dec!(6000), dec!(7000)] {
            deposit_cash(&wallet, user, amount);
        }
        assert_eq!(wallet.relay().pending(), 4);

        let report = wallet.relay().drain().await;

        assert_eq!(report.sent, 4);
        assert_eq!(report.dead_lettered, 0);
        let delivered = transport.delivered.lock().clone();
        assert_eq!(delivered.len(), 4);
        assert!(delivered[0].contains("relay configured"));
        assert!(delivered[1].contains("5000"));
        assert!(delivered[2].contains("6000"));
        assert!(delivered[3].contains("7000"));

        drop(wallet);
        let reopened = open(&path, Arc::new(FlakyTransport::new(0)));
        assert_eq!(reopened.relay().pending(), 0);
        assert!(reopened.relay_settings().unwrap().last_sync.is_some());
    }
}
