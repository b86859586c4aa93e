//! I/O module
//!
//! Handles file formats that leave the wallet.
//!
//! # Components
//!
//! - `backup` - JSON backup document, full or partial
//! - `csv_format` - CSV export of ledger queries and summaries

pub mod backup;
pub mod csv_format;

pub use backup::{read_backup_file, write_backup_file, BackupDocument};
pub use csv_format::{write_summary_csv, write_transactions_csv};
