//! Wallet Ledger CLI
//!
//! Command-line interface over a JSON-file backed wallet.
//!
//! # Usage
//!
//! ```bash
//! wallet-ledger init
//! wallet-ledger register --name Huda --email huda@example.com --password 'long enough'
//! wallet-ledger deposit --user huda@example.com --method usdt-trc20 --amount 100 --currency usdt --reference 0xfeed
//! wallet-ledger transactions --status pending
//! wallet-ledger approve 5f0c...
//! wallet-ledger --data /srv/wallet.json transactions --csv > ledger.csv
//! ```
//!
//! Queued relay messages are delivered before the process exits. Logs go to
//! stderr; the default directive is `wallet_ledger=info`, overridden by
//! `--log`/`WALLET_LOG` or `RUST_LOG`.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid request, unreadable data file, etc.)

use std::error::Error;
use std::io::Write;
use std::process;
use std::sync::Arc;

use tracing::debug;
use tracing_subscriber::EnvFilter;
use wallet_ledger::cli::{
    self, CliArgs, Command, CurrencyCommand, FilterArgs, MethodCommand, RelayCommand,
    TwoFactorCommand,
};
use wallet_ledger::config::{AppConfig, DEFAULT_LOG_FILTER};
use wallet_ledger::core::traits::RelayRepository;
use wallet_ledger::core::two_factor;
use wallet_ledger::core::{
    ConversionRequest, DepositRequest, NewUser, RechargeRequest, Wallet, WithdrawalRequest,
};
use wallet_ledger::io::{read_backup_file, write_backup_file, write_summary_csv, write_transactions_csv};
use wallet_ledger::relay::{Relay, RelaySettings, TelegramTransport};
use wallet_ledger::storage::FileStore;
use wallet_ledger::types::{
    CurrencyItem, DepositMethod, Settlement, Transaction, TransactionFilter, UserId,
    WalletError, WithdrawalMethod,
};

#[tokio::main]
async fn main() {
    let args = cli::parse_args();
    let config = args.to_config();
    init_tracing(&args, &config);

    if let Err(e) = run(args, config).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(args: &CliArgs, config: &AppConfig) {
    let filter = match args.log {
        Some(_) => EnvFilter::try_new(&config.log_filter).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

async fn run(args: CliArgs, config: AppConfig) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(FileStore::open(&config.data_path)?);
    let transport = TelegramTransport::new(config.relay.request_timeout)?;
    let relay = Relay::new(
        store.clone(),
        Arc::new(transport),
        config.relay.retry,
        false,
    );
    let wallet = Wallet::new(store.clone(), relay.clone());

    dispatch(&wallet, &store, args.command).await?;

    if relay.pending() > 0 {
        let report = relay.drain().await;
        debug!(sent = report.sent, dead_lettered = report.dead_lettered, "relay drained");
    }
    Ok(())
}

async fn dispatch(
    wallet: &Wallet,
    store: &FileStore,
    command: Command,
) -> Result<(), Box<dyn Error>> {
    let mut out = std::io::stdout().lock();

    match command {
        Command::Init => {
            if wallet.initialize()? {
                writeln!(out, "Seeded default currencies into {}", store.path().display())?;
            } else {
                writeln!(out, "Already initialized")?;
            }
        }
        Command::Register {
            name,
            email,
            password,
            telegram,
            phone,
        } => {
            let user = wallet.register(NewUser {
                name,
                email,
                password,
                telegram,
                phone,
            })?;
            writeln!(out, "Registered {} ({})", user.email, user.id)?;
        }
        Command::Login {
            email,
            password,
            code,
        } => {
            let user = wallet.authenticate(&email, &password, code.as_deref())?;
            writeln!(out, "Welcome, {}", user.name)?;
        }
        Command::Deposit {
            user,
            method,
            amount,
            currency,
            proof,
            reference,
        } => {
            let tx = wallet.request_deposit(DepositRequest {
                user_id: user_id(wallet, &user.email)?,
                method_id: method,
                amount,
                currency,
                proof_image: proof,
                reference,
            })?;
            print_transaction(&mut out, &tx)?;
        }
        Command::Withdraw {
            user,
            method,
            amount,
            currency,
            recipient,
        } => {
            let tx = wallet.request_withdrawal(WithdrawalRequest {
                user_id: user_id(wallet, &user.email)?,
                method_id: method,
                amount,
                currency,
                recipient,
            })?;
            print_transaction(&mut out, &tx)?;
        }
        Command::Convert {
            user,
            from,
            to,
            amount,
        } => {
            let tx = wallet.convert(ConversionRequest {
                user_id: user_id(wallet, &user.email)?,
                from,
                to,
                amount,
            })?;
            print_transaction(&mut out, &tx)?;
        }
        Command::Recharge {
            user,
            game,
            account_id,
            amount,
            currency,
        } => {
            let tx = wallet.request_recharge(RechargeRequest {
                user_id: user_id(wallet, &user.email)?,
                game,
                account_id,
                amount,
                currency,
            })?;
            print_transaction(&mut out, &tx)?;
        }
        Command::Approve { id } => {
            let change = wallet.approve(id)?;
            writeln!(out, "{} {} -> {}", id, change.previous, change.transaction.status)?;
        }
        Command::Reject { id } => {
            let change = wallet.reject(id)?;
            writeln!(out, "{} {} -> {}", id, change.previous, change.transaction.status)?;
        }
        Command::Balance { user } => {
            let balances = wallet.balances(user_id(wallet, &user.email)?)?;
            for (code, amount) in balances.iter() {
                writeln!(out, "{}\t{}", code, amount.normalize())?;
            }
        }
        Command::Transactions { filter, csv } => {
            let transactions = wallet.transactions(build_filter(wallet, &filter)?)?;
            if csv {
                write_transactions_csv(&transactions, &mut out)?;
            } else {
                for tx in &transactions {
                    print_transaction(&mut out, tx)?;
                }
            }
        }
        Command::Quote { from, to, amount } => {
            let quote = wallet.quote(amount, &from, &to)?;
            writeln!(
                out,
                "{} {} -> {} {} (rate {}, fee {}%: gross {}, fee {})",
                quote.amount, quote.from, quote.net, quote.to, quote.rate,
                quote.fee_percentage, quote.gross, quote.fee
            )?;
        }
        Command::Report { bucket, filter } => {
            let rows = wallet.report(build_filter(wallet, &filter)?, bucket.into())?;
            write_summary_csv(&rows, &mut out)?;
        }
        Command::Backup { path } => {
            let document = wallet.backup()?;
            write_backup_file(&path, &document)?;
            writeln!(out, "Backup written to {}", path.display())?;
        }
        Command::Restore { path } => {
            let summary = wallet.restore(read_backup_file(&path)?)?;
            writeln!(
                out,
                "Restored {} ({} users, {} transactions)",
                summary.sections.join(", "),
                summary.users,
                summary.transactions
            )?;
        }
        Command::Currency(command) => currency(wallet, command, &mut out)?,
        Command::Exchange { enabled, fee } => {
            let settings = wallet.configure_exchange(enabled, fee)?;
            writeln!(
                out,
                "Exchange {} with fee {}%",
                if settings.enabled { "enabled" } else { "disabled" },
                settings.fee_percentage
            )?;
        }
        Command::PairRate { from, to, rate } => {
            wallet.set_pair_rate(&from, &to, rate)?;
            match rate {
                Some(rate) => writeln!(out, "{} -> {} fixed at {}", from, to, rate)?,
                None => writeln!(out, "{} -> {} follows base rates", from, to)?,
            }
        }
        Command::Method(command) => method(wallet, command, &mut out)?,
        Command::Relay(command) => match command {
            RelayCommand::Configure {
                enabled,
                recipient,
                token,
            } => {
                let settings = wallet.configure_relay(RelaySettings {
                    enabled,
                    recipient,
                    token,
                    last_sync: None,
                })?;
                writeln!(out, "Relay {}", if settings.is_ready() { "ready" } else { "inactive" })?;
            }
            RelayCommand::Flush => {
                let report = wallet.relay().drain().await;
                writeln!(
                    out,
                    "Sent {}, dead-lettered {}, still queued {}",
                    report.sent,
                    report.dead_lettered,
                    wallet.relay().pending()
                )?;
            }
            RelayCommand::Status => {
                let settings = wallet.relay_settings()?;
                writeln!(out, "ready: {}", settings.is_ready())?;
                writeln!(out, "queued: {}", wallet.relay().pending())?;
                writeln!(out, "dead letters: {}", store.dead_letters()?.len())?;
                if let Some(at) = settings.last_sync {
                    writeln!(out, "last sync: {}", at.to_rfc3339())?;
                }
            }
        },
        Command::TwoFactor(command) => match command {
            TwoFactorCommand::Setup { user } => {
                let user = wallet.users().find_by_email(&user.email)?;
                let secret = two_factor::generate_secret();
                writeln!(out, "secret: {}", secret)?;
                writeln!(
                    out,
                    "uri: {}",
                    two_factor::provisioning_uri("wallet-ledger", &user.email, &secret)
                )?;
            }
            TwoFactorCommand::Enable { user, secret, code } => {
                let id = user_id(wallet, &user.email)?;
                wallet.users().enable_two_factor(id, &secret, &code)?;
                writeln!(out, "Two-factor enabled")?;
            }
            TwoFactorCommand::Disable { user, code } => {
                let id = user_id(wallet, &user.email)?;
                wallet.users().disable_two_factor(id, &code)?;
                writeln!(out, "Two-factor disabled")?;
            }
        },
    }

    out.flush()?;
    Ok(())
}

fn currency(wallet: &Wallet, command: CurrencyCommand, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    match command {
        CurrencyCommand::List => {
            for item in wallet.currencies().list()? {
                writeln!(
                    out,
                    "{}\t{}\trate {}\tmin {}/{}\t{}",
                    item.code,
                    item.name,
                    item.rate,
                    item.min_deposit,
                    item.min_withdrawal,
                    if item.active { "active" } else { "inactive" }
                )?;
            }
        }
        CurrencyCommand::Add {
            code,
            name,
            rate,
            class,
            min_deposit,
            min_withdrawal,
        } => {
            let mut item = CurrencyItem::new(code, &name, rate, class.into());
            item.min_deposit = min_deposit;
            item.min_withdrawal = min_withdrawal;
            let item = wallet.add_currency(item)?;
            writeln!(out, "Added {}", item.code)?;
        }
        CurrencyCommand::SetActive { code, active } => {
            wallet.set_currency_active(&code, active)?;
            writeln!(out, "{} {}", code, if active { "activated" } else { "deactivated" })?;
        }
        CurrencyCommand::SetRate { code, rate } => {
            wallet.set_currency_rate(&code, rate)?;
            writeln!(out, "{} rate {}", code, rate)?;
        }
        CurrencyCommand::SetMinimums {
            code,
            deposit,
            withdrawal,
        } => {
            wallet.set_currency_minimums(&code, deposit, withdrawal)?;
            writeln!(out, "{} minimums {} / {}", code, deposit, withdrawal)?;
        }
    }
    Ok(())
}

fn method(wallet: &Wallet, command: MethodCommand, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let settlement = |instant: bool| {
        if instant {
            Settlement::Instant
        } else {
            Settlement::RequiresApproval
        }
    };

    match command {
        MethodCommand::List => {
            for m in wallet.methods().deposit_methods()? {
                writeln!(out, "deposit\t{}\t{}\t{}\tactive={}", m.id, m.name, m.currency, m.active)?;
            }
            for m in wallet.methods().withdrawal_methods()? {
                writeln!(
                    out,
                    "withdrawal\t{}\t{}\t{}\tfee={}%\tactive={}",
                    m.id, m.name, m.currency, m.fee_percentage, m.active
                )?;
            }
        }
        MethodCommand::AddDeposit {
            id,
            name,
            currency,
            instant,
            requires_image,
            requires_reference,
        } => {
            let saved = wallet.save_deposit_method(DepositMethod {
                id,
                name,
                currency,
                active: true,
                requires_image,
                requires_transaction_id: requires_reference,
                settlement: settlement(instant),
            })?;
            writeln!(out, "Saved deposit method {}", saved.id)?;
        }
        MethodCommand::AddWithdrawal {
            id,
            name,
            currency,
            instant,
            fee,
        } => {
            let saved = wallet.save_withdrawal_method(WithdrawalMethod {
                id,
                name,
                currency,
                active: true,
                settlement: settlement(instant),
                fee_percentage: fee,
            })?;
            writeln!(out, "Saved withdrawal method {}", saved.id)?;
        }
        MethodCommand::SetActive { id, active } => {
            wallet.set_method_active(&id, active)?;
            writeln!(out, "{} {}", id, if active { "activated" } else { "deactivated" })?;
        }
    }
    Ok(())
}

fn user_id(wallet: &Wallet, email: &str) -> Result<UserId, WalletError> {
    Ok(wallet.users().find_by_email(email)?.id)
}

fn build_filter(wallet: &Wallet, args: &FilterArgs) -> Result<TransactionFilter, WalletError> {
    Ok(TransactionFilter {
        tx_type: args.tx_type.map(Into::into),
        status: args.status.map(Into::into),
        user_id: args
            .email
            .as_deref()
            .map(|email| user_id(wallet, email))
            .transpose()?,
        from: args.from,
        until: args.until,
    })
}

fn print_transaction(out: &mut impl Write, tx: &Transaction) -> std::io::Result<()> {
    writeln!(
        out,
        "{}\t{}\t{}\t{} {}\t{}",
        tx.id,
        tx.tx_type(),
        tx.status,
        tx.amount.normalize(),
        tx.currency,
        tx.created_at.to_rfc3339()
    )
}
