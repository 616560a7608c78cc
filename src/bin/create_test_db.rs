use std::error::Error;
use std::path::Path;
use std::process::exit;
use std::str::FromStr;

use clap::Parser;
use email_address::EmailAddress;
use rusqlite::Connection;
use time::OffsetDateTime;

use walleteer_rs::{
    PasswordHash, ValidatedPassword,
    category::{CategoryKind, create_category},
    initialize_db,
    transaction::{TransactionData, TransactionKind, create_transaction},
    user::create_user,
    wallet::{WalletKind, create_wallet},
};

/// A utility for creating a test database for the REST API server of walleteer_rs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let connection = Connection::open(output_path)?;

    initialize_db(&connection)?;

    println!("Creating test user (test@example.com, password 'test')...");

    let password_hash = PasswordHash::new(
        ValidatedPassword::new_unchecked("test"),
        PasswordHash::DEFAULT_COST,
    )?;
    let user = create_user(
        "Test User",
        &EmailAddress::from_str("test@example.com")?,
        password_hash,
        &connection,
    )?;

    println!("Creating wallets, categories, and transactions...");

    let bank = create_wallet(user.id, "Bank", WalletKind::Bank, 1_000_000.0, &connection)?;
    create_wallet(user.id, "Cash", WalletKind::Cash, 50_000.0, &connection)?;

    let salary = create_category(user.id, "Salary", CategoryKind::Income, &connection)?;
    let groceries = create_category(user.id, "Groceries", CategoryKind::Expense, &connection)?;

    let today = OffsetDateTime::now_utc().date();
    create_transaction(
        user.id,
        TransactionData {
            wallet_id: bank.id,
            category_id: salary.id,
            kind: TransactionKind::Income,
            amount: 500_000.0,
            date: today,
            description: "Monthly salary".to_string(),
        },
        &connection,
    )?;
    create_transaction(
        user.id,
        TransactionData {
            wallet_id: bank.id,
            category_id: groceries.id,
            kind: TransactionKind::Expense,
            amount: 75_000.0,
            date: today,
            description: "Weekly groceries".to_string(),
        },
        &connection,
    )?;

    println!("Success!");

    Ok(())
}
