use crate::config::{AppConfig, RelayOptions, DEFAULT_DATA_PATH, DEFAULT_LOG_FILTER};
use crate::core::report::Bucket;
use crate::types::{CurrencyClass, CurrencyCode, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Multi-currency wallet ledger
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger")]
#[command(about = "Multi-currency wallet ledger with approvals, conversion and relay", long_about = None)]
pub struct CliArgs {
    /// Wallet data file
    #[arg(
        long = "data",
        env = "WALLET_DATA",
        value_name = "PATH",
        default_value = DEFAULT_DATA_PATH,
        global = true
    )]
    pub data: PathBuf,

    /// Log filter directive (RUST_LOG syntax)
    #[arg(long = "log", env = "WALLET_LOG", value_name = "FILTER", global = true)]
    pub log: Option<String>,

    /// Relay HTTP request timeout in seconds
    #[arg(long = "relay-timeout", value_name = "SECS", global = true)]
    pub relay_timeout: Option<u64>,

    /// Delivery attempts before a relay message is dead-lettered
    #[arg(long = "relay-attempts", value_name = "COUNT", global = true)]
    pub relay_attempts: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Seed the default currencies into an empty data file
    Init,
    /// Register a user
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        telegram: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Check credentials (and a TOTP code when two-factor is on)
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        code: Option<String>,
    },
    /// Submit a deposit request
    Deposit {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        method: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        currency: CurrencyCode,
        /// Reference to an uploaded proof-of-payment image
        #[arg(long)]
        proof: Option<String>,
        /// Payer transaction id
        #[arg(long)]
        reference: Option<String>,
    },
    /// Submit a withdrawal request
    Withdraw {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        method: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        currency: CurrencyCode,
        #[arg(long)]
        recipient: String,
    },
    /// Exchange between two currencies of the user
    Convert {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        from: CurrencyCode,
        #[arg(long)]
        to: CurrencyCode,
        #[arg(long)]
        amount: Decimal,
    },
    /// Submit a game credit top-up
    Recharge {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        game: String,
        #[arg(long = "account")]
        account_id: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        currency: CurrencyCode,
    },
    /// Complete a pending transaction
    Approve { id: Uuid },
    /// Reject a pending transaction
    Reject { id: Uuid },
    /// Show a user's balances
    Balance {
        #[command(flatten)]
        user: UserArg,
    },
    /// List transactions
    Transactions {
        #[command(flatten)]
        filter: FilterArgs,
        /// Write CSV instead of a table
        #[arg(long)]
        csv: bool,
    },
    /// Price a conversion without recording it
    Quote {
        #[arg(long)]
        from: CurrencyCode,
        #[arg(long)]
        to: CurrencyCode,
        #[arg(long)]
        amount: Decimal,
    },
    /// Totals per period, type and currency as CSV
    Report {
        #[arg(long, value_enum, default_value = "month")]
        bucket: BucketArg,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Write a backup document
    Backup { path: PathBuf },
    /// Restore the sections present in a backup document
    Restore { path: PathBuf },
    /// Manage the currency registry
    #[command(subcommand)]
    Currency(CurrencyCommand),
    /// Configure conversions
    Exchange {
        #[arg(long)]
        enabled: Option<bool>,
        /// Fee in percent of the converted amount
        #[arg(long)]
        fee: Option<Decimal>,
    },
    /// Fix or clear the rate of one currency pair
    PairRate {
        #[arg(long)]
        from: CurrencyCode,
        #[arg(long)]
        to: CurrencyCode,
        /// Omit to remove the override
        #[arg(long)]
        rate: Option<Decimal>,
    },
    /// Manage deposit and withdrawal methods
    #[command(subcommand)]
    Method(MethodCommand),
    /// Manage the notification relay
    #[command(subcommand)]
    Relay(RelayCommand),
    /// Manage two-factor authentication
    #[command(subcommand)]
    TwoFactor(TwoFactorCommand),
}

#[derive(Subcommand, Debug)]
pub enum CurrencyCommand {
    /// List the registry
    List,
    Add {
        code: CurrencyCode,
        #[arg(long)]
        name: String,
        /// Units per one unit of the base currency
        #[arg(long)]
        rate: Decimal,
        #[arg(long, value_enum, default_value = "fiat")]
        class: ClassArg,
        #[arg(long, default_value = "0")]
        min_deposit: Decimal,
        #[arg(long, default_value = "0")]
        min_withdrawal: Decimal,
    },
    SetActive {
        code: CurrencyCode,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
    SetRate { code: CurrencyCode, rate: Decimal },
    SetMinimums {
        code: CurrencyCode,
        #[arg(long)]
        deposit: Decimal,
        #[arg(long)]
        withdrawal: Decimal,
    },
}

#[derive(Subcommand, Debug)]
pub enum MethodCommand {
    /// List both registries
    List,
    AddDeposit {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        currency: CurrencyCode,
        /// Complete without admin approval
        #[arg(long)]
        instant: bool,
        #[arg(long)]
        requires_image: bool,
        #[arg(long)]
        requires_reference: bool,
    },
    AddWithdrawal {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        currency: CurrencyCode,
        #[arg(long)]
        instant: bool,
        /// Percentage withheld from the payout
        #[arg(long, default_value = "0")]
        fee: Decimal,
    },
    SetActive {
        id: String,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RelayCommand {
    Configure {
        #[arg(long)]
        enabled: bool,
        /// Recipient chat id
        #[arg(long)]
        recipient: Option<String>,
        /// Bot token
        #[arg(long)]
        token: Option<String>,
    },
    /// Deliver queued messages now
    Flush,
    /// Show settings and queue length
    Status,
}

#[derive(Subcommand, Debug)]
pub enum TwoFactorCommand {
    /// Print a fresh secret and its provisioning URI
    Setup {
        #[command(flatten)]
        user: UserArg,
    },
    Enable {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        secret: String,
        #[arg(long)]
        code: String,
    },
    Disable {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        code: String,
    },
}

/// User addressed by email
#[derive(Args, Debug, Clone)]
pub struct UserArg {
    #[arg(long = "user", value_name = "EMAIL")]
    pub email: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only this user's transactions (by email)
    #[arg(long = "user", value_name = "EMAIL")]
    pub email: Option<String>,
    #[arg(long = "type", value_enum)]
    pub tx_type: Option<TypeArg>,
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
    /// Inclusive lower bound (RFC 3339)
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339)
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    Deposit,
    Withdrawal,
    Conversion,
    GameRecharge,
}

impl From<TypeArg> for TransactionType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Deposit => TransactionType::Deposit,
            TypeArg::Withdrawal => TransactionType::Withdrawal,
            TypeArg::Conversion => TransactionType::Conversion,
            TypeArg::GameRecharge => TransactionType::GameRecharge,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Pending,
    Completed,
    Rejected,
}

impl From<StatusArg> for TransactionStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => TransactionStatus::Pending,
            StatusArg::Completed => TransactionStatus::Completed,
            StatusArg::Rejected => TransactionStatus::Rejected,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClassArg {
    Fiat,
    Token,
}

impl From<ClassArg> for CurrencyClass {
    fn from(arg: ClassArg) -> Self {
        match arg {
            ClassArg::Fiat => CurrencyClass::Fiat,
            ClassArg::Token => CurrencyClass::Token,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BucketArg {
    Day,
    Month,
}

impl From<BucketArg> for Bucket {
    fn from(arg: BucketArg) -> Self {
        match arg {
            BucketArg::Day => Bucket::Day,
            BucketArg::Month => Bucket::Month,
        }
    }
}

impl CliArgs {
    /// Create an AppConfig from CLI arguments
    ///
    /// Flags that were not given fall back to the defaults; zero values are
    /// replaced (with a warning) by `RelayOptions::new`.
    ///
    /// # Returns
    ///
    /// An `AppConfig` with values from CLI arguments or defaults.
    pub fn to_config(&self) -> AppConfig {
        let relay = if self.relay_timeout.is_some() || self.relay_attempts.is_some() {
            let default = RelayOptions::default();
            RelayOptions::new(
                self.relay_timeout
                    .map(Duration::from_secs)
                    .unwrap_or(default.request_timeout),
                self.relay_attempts
                    .unwrap_or(default.retry.max_attempts),
            )
        } else {
            RelayOptions::default()
        };

        AppConfig {
            data_path: self.data.clone(),
            log_filter: self
                .log
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            relay,
        }
    }
}
