// money-sync CLI - one store session per command
//
// Usage: money-sync <FILE> <COMMAND> [ARGS] [credential]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use money_sync::{
    report, IdSpace, MoneyTable, PayeeIntent, SqliteStore, SyncConfig, SyncEngine, SyncError, TableStore,
    TransactionIntent,
};
use rust_decimal::Decimal;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MONEY_SYNC_LOG";

#[derive(Parser)]
#[command(name = "money-sync")]
#[command(version)]
#[command(about = "Insert payees and transactions into a Money file and keep balances in step")]
struct Cli {
    /// Money file (.mny / .mdb / SQLite)
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,

    /// JSON config with sentinel constants (falls back to $MONEY_SYNC_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// File credential; takes precedence over a positional [credential]
    #[arg(long, global = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every transaction in TRN
    List {
        credential: Option<String>,
        /// Write CSV to stdout instead of record blocks
        #[arg(long)]
        csv: bool,
    },

    /// List ACCT records
    Accounts {
        credential: Option<String>,
        #[arg(long)]
        csv: bool,
    },

    /// List XACCT records (cached balances)
    Xacct {
        credential: Option<String>,
        #[arg(long)]
        csv: bool,
    },

    /// Insert a payee into PAY and XPAY
    Payee {
        payee_id: i64,
        name: String,
        credential: Option<String>,
    },

    /// Insert a transaction and adjust its account balance
    ///
    /// A single trailing positional is always the memo. To give a credential
    /// without a memo, pass an empty memo ("") or use --password.
    Transaction {
        transaction_id: i64,
        account_id: i64,
        /// Signed amount; negative leaves the account
        #[arg(allow_hyphen_values = true)]
        amount: Decimal,
        payee_id: i64,
        memo: Option<String>,
        credential: Option<String>,
        /// Category id (hcat); null when omitted
        #[arg(long)]
        category: Option<i64>,
        /// Check or reference number (szId)
        #[arg(long, default_value = "")]
        number: String,
    },

    /// Add a signed amount to an account's cached balance
    Updatebalance {
        account_id: i64,
        #[arg(allow_hyphen_values = true)]
        amount: Decimal,
        credential: Option<String>,
    },

    /// Check an existing transaction's critical fields
    Compare {
        transaction_id: i64,
        credential: Option<String>,
    },

    /// Print the next unused transaction id
    Nextid {
        credential: Option<String>,
        /// Allocate in PAY instead of TRN
        #[arg(long)]
        payee: bool,
    },
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = run(cli);

    if let Err(e) = &outcome {
        if let Some(notice) = failure_notice(e) {
            eprintln!("\n{}", notice);
        }
        eprintln!("✗ Failed: {:#}", e);
    }
    ExitCode::from(exit_status(&outcome))
}

/// 0 on full success, 1 on any failure (partial ones included)
fn exit_status(outcome: &Result<()>) -> u8 {
    match outcome {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Extra warning for failures that left the file half-written
fn failure_notice(err: &anyhow::Error) -> Option<&'static str> {
    let partial = err
        .downcast_ref::<SyncError>()
        .map_or(false, SyncError::is_partial);
    partial.then_some("⚠️  The file is now inconsistent and needs manual attention.")
}

fn run(cli: Cli) -> Result<()> {
    let config = SyncConfig::load(cli.config.as_deref())?;
    let file = cli.file.as_path();
    let password = cli.password;

    match cli.command {
        Commands::List { credential, csv } => cmd_list(file, password.or(credential), &config, MoneyTable::Trn, csv),
        Commands::Accounts { credential, csv } => cmd_list(file, password.or(credential), &config, MoneyTable::Acct, csv),
        Commands::Xacct { credential, csv } => cmd_list(file, password.or(credential), &config, MoneyTable::XAcct, csv),
        Commands::Payee {
            payee_id,
            name,
            credential,
        } => cmd_payee(file, password.or(credential), &config, payee_id, name),
        Commands::Transaction {
            transaction_id,
            account_id,
            amount,
            payee_id,
            memo,
            credential,
            category,
            number,
        } => {
            let intent = TransactionIntent {
                transaction_id,
                account_id,
                category_id: category,
                payee_id,
                amount,
                memo: memo.unwrap_or_default(),
                reference_number: number,
            };
            cmd_transaction(file, password.or(credential), &config, intent)
        }
        Commands::Updatebalance {
            account_id,
            amount,
            credential,
        } => cmd_update_balance(file, password.or(credential), &config, account_id, amount),
        Commands::Compare {
            transaction_id,
            credential,
        } => cmd_compare(file, password.or(credential), &config, transaction_id),
        Commands::Nextid { credential, payee } => {
            let space = if payee { IdSpace::Payee } else { IdSpace::Transaction };
            cmd_next_id(file, password.or(credential), &config, space)
        }
    }
}

/// Open the store, hand an engine to `work`, close the store whatever happened.
fn with_engine<T>(
    file: &Path,
    credential: Option<String>,
    config: &SyncConfig,
    work: impl FnOnce(&mut SyncEngine<'_, SqliteStore>) -> Result<T>,
) -> Result<T> {
    let credential = credential.filter(|c| !c.is_empty());
    let mut store = SqliteStore::open(file, credential.as_deref())?;

    let outcome = {
        let mut engine = SyncEngine::new(&mut store, config);
        work(&mut engine)
    };

    let closed = store.close();
    let value = outcome?;
    closed?;
    Ok(value)
}

// =============================================================================
// COMMANDS
// =============================================================================

fn cmd_list(file: &Path, credential: Option<String>, config: &SyncConfig, table: MoneyTable, csv: bool) -> Result<()> {
    with_engine(file, credential, config, |engine| {
        let listing = engine.listing(table)?;
        if csv {
            report::write_csv(&listing, io::stdout().lock()).context("writing CSV")?;
        } else {
            print!("{}", report::render_listing(&listing, engine.policy()));
        }
        Ok(())
    })
}

fn cmd_payee(file: &Path, credential: Option<String>, config: &SyncConfig, payee_id: i64, name: String) -> Result<()> {
    println!("=== Inserting Payee ===");
    let intent = PayeeIntent {
        payee_id,
        display_name: name,
    };

    with_engine(file, credential, config, |engine| {
        let inserted = engine.insert_payee(&intent)?;
        for warning in &inserted.warnings {
            println!("⚠️  {}", warning);
        }
        println!("✓ Inserted payee {} into PAY table", inserted.payee_id);
        println!("✓ Inserted payee {} into XPAY table", inserted.payee_id);
        println!("SUCCESS");
        Ok(())
    })
}

fn cmd_transaction(file: &Path, credential: Option<String>, config: &SyncConfig, intent: TransactionIntent) -> Result<()> {
    println!("=== Inserting Transaction ===");
    println!("htrn: {}", intent.transaction_id);
    println!("hacct: {}", intent.account_id);
    println!("amt: {}", intent.amount);
    println!("hpay: {}", intent.payee_id);
    match intent.category_id {
        Some(hcat) => println!("hcat: {}", hcat),
        None => println!("hcat: null"),
    }

    with_engine(file, credential, config, |engine| {
        let synced = engine.insert_transaction(&intent)?;
        for warning in &synced.warnings {
            println!("⚠️  {}", warning);
        }
        println!("✓ Inserted transaction {} into TRN table", synced.transaction_id);

        if let Some(verification) = &synced.verification {
            println!("\n=== Verifying Insert ===");
            print!("{}", report::render_verification(verification, engine.policy()));
        }

        println!("\n=== Updating Account Balance ===");
        println!("✓ {}", synced.balance.summary());
        println!("SUCCESS");
        Ok(())
    })
}

fn cmd_update_balance(
    file: &Path,
    credential: Option<String>,
    config: &SyncConfig,
    account_id: i64,
    amount: Decimal,
) -> Result<()> {
    println!("=== Updating Account Balance ===");
    with_engine(file, credential, config, |engine| {
        let update = engine.update_balance(account_id, amount)?;
        println!("✓ {}", update.summary());
        println!("SUCCESS");
        Ok(())
    })
}

fn cmd_compare(file: &Path, credential: Option<String>, config: &SyncConfig, transaction_id: i64) -> Result<()> {
    println!("Comparing against htrn {}", transaction_id);
    println!("File: {}\n", file.display());

    with_engine(file, credential, config, |engine| {
        let report = engine.compare(transaction_id)?;
        print!("{}", report::render_verification(&report, engine.policy()));
        println!();
        print!("{}", report::render_critical_expectations(engine.policy()));
        Ok(())
    })
}

fn cmd_next_id(file: &Path, credential: Option<String>, config: &SyncConfig, space: IdSpace) -> Result<()> {
    with_engine(file, credential, config, |engine| {
        let table = space.table();
        let next = engine.next_id(space)?;
        println!("=== Finding Next Available {} ID ===", table);
        println!("Next available {}: {}", table.key_column(), next);
        println!("\n✓ Use this ID for your next {} insertion", table);
        println!("SUCCESS");
        Ok(())
    })
}
