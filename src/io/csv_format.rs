//! CSV output for ledger queries and summaries
//!
//! All functions write to any `Write` and do no other I/O, so they are tested
//! against in-memory buffers.

use csv::Writer;
use std::io::Write;

use crate::core::report::SummaryRow;
use crate::types::{Transaction, WalletError};

const TRANSACTION_HEADER: [&str; 8] = [
    "id",
    "user",
    "type",
    "status",
    "amount",
    "currency",
    "created_at",
    "updated_at",
];

/// Write transactions with columns
/// `id,user,type,status,amount,currency,created_at,updated_at`
///
/// Rows are written in the order given; timestamps are RFC 3339 and an
/// unset `updated_at` is an empty field.
///
/// # Arguments
///
/// * `transactions` - Records to write
/// * `output` - Destination
///
/// # Errors
///
/// Returns a `Storage` error if writing fails.
pub fn write_transactions_csv<'a, I>(transactions: I, output: &mut dyn Write) -> Result<(), WalletError>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut writer = Writer::from_writer(output);
    writer.write_record(TRANSACTION_HEADER)?;

    for tx in transactions {
        writer.write_record(&[
            tx.id.to_string(),
            tx.user_id.to_string(),
            tx.tx_type().to_string(),
            tx.status.to_string(),
            tx.amount.normalize().to_string(),
            tx.currency.to_string(),
            tx.created_at.to_rfc3339(),
            tx.updated_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write summary rows, one line per bucket/type/currency
pub fn write_summary_csv(rows: &[SummaryRow], output: &mut dyn Write) -> Result<(), WalletError> {
    let mut writer = Writer::from_writer(output);
    writer.write_record([
        "bucket",
        "type",
        "currency",
        "pending_count",
        "pending_amount",
        "completed_count",
        "completed_amount",
        "rejected_count",
        "rejected_amount",
    ])?;

    for row in rows {
        writer.write_record(&[
            row.bucket.clone(),
            row.tx_type.to_string(),
            row.currency.to_string(),
            row.pending.count.to_string(),
            row.pending.amount.normalize().to_string(),
            row.completed.count.to_string(),
            row.completed.amount.normalize().to_string(),
            row.rejected.count.to_string(),
            row.rejected.amount.normalize().to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
