//! Ledger summaries by time bucket

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::{CurrencyCode, Transaction, TransactionStatus, TransactionType, WalletError};

/// Granularity of a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Day,
    Month,
}

impl Bucket {
    /// Start (UTC midnight) of the bucket containing `at`
    pub fn start_of(self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let first = match self {
            Bucket::Day => date,
            Bucket::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date),
        };
        first
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight))
            .unwrap_or(at)
    }

    /// Display label, `2024-03-07` or `2024-03`
    pub fn label(self, start: DateTime<Utc>) -> String {
        match self {
            Bucket::Day => start.format("%Y-%m-%d").to_string(),
            Bucket::Month => start.format("%Y-%m").to_string(),
        }
    }
}

impl FromStr for Bucket {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Bucket::Day),
            "month" | "monthly" => Ok(Bucket::Month),
            other => Err(WalletError::invalid_field(
                "bucket",
                &format!("expected day or month, got '{}'", other),
            )),
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bucket::Day => "day",
            Bucket::Month => "month",
        })
    }
}

/// Count and amount for one status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotal {
    pub count: u64,
    pub amount: Decimal,
}

/// One row of a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub bucket: String,
    pub bucket_start: DateTime<Utc>,
    pub tx_type: TransactionType,
    pub currency: CurrencyCode,
    pub pending: StatusTotal,
    pub completed: StatusTotal,
    pub rejected: StatusTotal,
}

impl SummaryRow {
    fn total_mut(&mut self, status: TransactionStatus) -> &mut StatusTotal {
        match status {
            TransactionStatus::Pending => &mut self.pending,
            TransactionStatus::Completed => &mut self.completed,
            TransactionStatus::Rejected => &mut self.rejected,
        }
    }
}

/// Group transactions by bucket, type and currency
///
/// Rows are ordered by bucket start, then type, then currency. Amounts that
/// would overflow saturate at the decimal maximum.
pub fn summarize<I>(transactions: I, bucket: Bucket) -> Vec<SummaryRow>
where
    I: IntoIterator<Item = Transaction>,
{
    let mut rows: BTreeMap<(DateTime<Utc>, TransactionType, CurrencyCode), SummaryRow> =
        BTreeMap::new();

    for tx in transactions {
        let start = bucket.start_of(tx.created_at);
        let row = rows
            .entry((start, tx.tx_type(), tx.currency.clone()))
            .or_insert_with(|| SummaryRow {
                bucket: bucket.label(start),
                bucket_start: start,
                tx_type: tx.tx_type(),
                currency: tx.currency.clone(),
                pending: StatusTotal::default(),
                completed: StatusTotal::default(),
                rejected: StatusTotal::default(),
            });

        let total = row.total_mut(tx.status);
        total.count += 1;
        total.amount = total.amount.saturating_add(tx.amount);
    }

    rows.into_values().collect()
}
