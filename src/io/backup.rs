//! Backup document
//!
//! A backup is a single JSON object. Every section is optional on restore: a
//! missing key leaves that part of the state untouched, so a partial
//! document (say, only `currencies`) can be used to push configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::core::registry::validate_item;
use crate::core::users::normalize_email;
use crate::types::{
    CurrencyItem, DepositMethod, ExchangeSettings, Transaction, User, WalletError,
    WithdrawalMethod,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<User>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<ExchangeSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_methods: Option<Vec<DepositMethod>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_methods: Option<Vec<WithdrawalMethod>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currencies: Option<Vec<CurrencyItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl BackupDocument {
    /// Reject documents that would break store invariants
    ///
    /// Checks positive amounts and unique transaction ids, unique emails and
    /// user ids with non-negative balances, and unique currency codes with
    /// positive rates and non-negative minimums.
    pub fn validate(&self) -> Result<(), WalletError> {
        if let Some(transactions) = &self.transactions {
            let mut ids = HashSet::new();
            for tx in transactions {
                if tx.amount <= rust_decimal::Decimal::ZERO {
                    return Err(WalletError::invalid_amount(tx.amount));
                }
                if !ids.insert(tx.id) {
                    return Err(WalletError::duplicate("Transaction", tx.id));
                }
            }
        }

        if let Some(users) = &self.users {
            let mut ids = HashSet::new();
            let mut emails = HashSet::new();
            for user in users {
                if !ids.insert(user.id) {
                    return Err(WalletError::duplicate("User", user.id));
                }
                if !emails.insert(normalize_email(&user.email)) {
                    return Err(WalletError::duplicate("User", &user.email));
                }
                let negative = user
                    .balances
                    .iter()
                    .find(|(_, amount)| **amount < rust_decimal::Decimal::ZERO);
                if let Some((code, amount)) = negative {
                    return Err(WalletError::invalid_field(
                        "balances",
                        &format!("{} balance {} of user {} is negative", code, amount, user.id),
                    ));
                }
            }
        }

        if let Some(currencies) = &self.currencies {
            let mut codes = HashSet::new();
            for item in currencies {
                validate_item(item)?;
                if !codes.insert(item.code.clone()) {
                    return Err(WalletError::duplicate("Currency", &item.code));
                }
            }
        }

        Ok(())
    }

    /// Names of the sections present, in document order
    pub fn sections(&self) -> Vec<&'static str> {
        [
            ("users", self.users.is_some()),
            ("transactions", self.transactions.is_some()),
            ("exchangeRate", self.exchange_rate.is_some()),
            ("depositMethods", self.deposit_methods.is_some()),
            ("withdrawalMethods", self.withdrawal_methods.is_some()),
            ("currencies", self.currencies.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }
}

pub fn read_backup<R: Read>(reader: R) -> Result<BackupDocument, WalletError> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_backup<W: Write>(writer: W, document: &BackupDocument) -> Result<(), WalletError> {
    serde_json::to_writer_pretty(writer, document)?;
    Ok(())
}

pub fn read_backup_file(path: &Path) -> Result<BackupDocument, WalletError> {
    read_backup(BufReader::new(File::open(path)?))
}

pub fn write_backup_file(path: &Path, document: &BackupDocument) -> Result<(), WalletError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_backup(&mut writer, document)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Balances, CurrencyClass, CurrencyCode};
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn usdt() -> CurrencyItem {
        CurrencyItem::new(
            CurrencyCode::parse("usdt").unwrap(),
            "Tether",
            dec!(1),
            CurrencyClass::Token,
        )
    }

    #[test]
    fn test_partial_document_parses() {
        let doc = read_backup(
            r#"{"currencies":[{"code":"usdt","name":"Tether","rate":"1","active":true}]}"#
                .as_bytes(),
        )
        .unwrap();

        assert!(doc.users.is_none());
        assert!(doc.transactions.is_none());
        assert_eq!(doc.sections(), vec!["currencies"]);
    }

    #[test]
    fn test_top_level_keys() {
        let doc = BackupDocument {
            users: Some(Vec::new()),
            transactions: Some(Vec::new()),
            exchange_rate: Some(ExchangeSettings::default()),
            deposit_methods: Some(Vec::new()),
            withdrawal_methods: Some(Vec::new()),
            currencies: Some(Vec::new()),
            created_at: Some(Utc::now()),
        };
        let mut out = Vec::new();
        write_backup(&mut out, &doc).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        for key in [
            "users",
            "transactions",
            "exchangeRate",
            "depositMethods",
            "withdrawalMethods",
            "currencies",
            "createdAt",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_duplicate_currency_rejected() {
        let item = usdt();
        let doc = BackupDocument {
            currencies: Some(vec![item.clone(), item]),
            ..Default::default()
        };
        assert!(matches!(doc.validate(), Err(WalletError::Duplicate { .. })));
    }

    #[test]
    fn test_malformed_json_is_storage_error() {
        assert!(matches!(
            read_backup("[1, 2".as_bytes()),
            Err(WalletError::Storage { .. })
        ));
    }

    #[test]
    fn test_negative_balance_rejected() {
        let raw = format!(
            r#"{{"users":[{{"id":"{}","name":"Lina","email":"lina@example.com",
                "passwordHash":"","balances":{{"usdt":"-50"}},
                "createdAt":"2024-03-01T10:00:00Z"}}]}}"#,
            Uuid::new_v4()
        );
        let doc = read_backup(raw.as_bytes()).unwrap();

        assert!(matches!(
            doc.validate(),
            Err(WalletError::InvalidField { ref field, .. }) if field == "balances"
        ));
    }

    #[test]
    fn test_zero_balance_accepted() {
        let mut balances = Balances::new();
        balances
            .credit(Uuid::nil(), &CurrencyCode::parse("usdt").unwrap(), dec!(5))
            .unwrap();
        balances
            .debit(Uuid::nil(), &CurrencyCode::parse("usdt").unwrap(), dec!(5))
            .unwrap();
        let doc = BackupDocument {
            users: Some(vec![User {
                id: Uuid::new_v4(),
                name: "Lina".to_string(),
                email: "lina@example.com".to_string(),
                password_hash: String::new(),
                telegram: None,
                phone: None,
                balances,
                two_factor: None,
                created_at: Utc::now(),
                version: 0,
            }]),
            ..Default::default()
        };
        assert!(doc.validate().is_ok());
    }

    #[rstest]
    #[case::zero_rate(|c: &mut CurrencyItem| c.rate = dec!(0), "rate")]
    #[case::negative_rate(|c: &mut CurrencyItem| c.rate = dec!(-1), "rate")]
    #[case::negative_min_deposit(|c: &mut CurrencyItem| c.min_deposit = dec!(-1), "minimum")]
    #[case::negative_min_withdrawal(|c: &mut CurrencyItem| c.min_withdrawal = dec!(-0.5), "minimum")]
    fn test_invalid_currency_rejected(#[case] edit: fn(&mut CurrencyItem), #[case] expected: &str) {
        let mut item = usdt();
        edit(&mut item);
        let doc = BackupDocument {
            currencies: Some(vec![item]),
            ..Default::default()
        };

        assert!(matches!(
            doc.validate(),
            Err(WalletError::InvalidField { ref field, .. }) if field == expected
        ));
    }
}
