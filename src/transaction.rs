//! Transaction management for the personal finance application.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionKind` enum
//! - The ledger operations that keep wallet balances consistent with the
//!   transaction history
//! - Route handlers for the transaction endpoints
//!
//! Every ledger operation pairs its writes inside a single database
//! transaction: inserting, updating, or deleting a transaction row always
//! commits together with the matching wallet balance adjustment, or not at
//! all. Updates reverse the old signed amount from the old wallet before
//! applying the new signed amount to the new wallet, which handles amount,
//! kind, and wallet changes uniformly.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{
    Connection,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::Date;

use crate::{
    AppState, DatabaseId, Error,
    category::CategoryId,
    user::UserID,
    wallet::{WalletId, apply_balance_delta},
};

// ============================================================================
// MODELS
// ============================================================================

/// Alias for the integer type used for transaction IDs.
pub type TransactionId = DatabaseId;

/// Whether a transaction records money coming in or going out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Money was earned or received.
    Income,
    /// Money was spent.
    Expense,
}

impl TransactionKind {
    /// The string stored in the database for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    /// Apply this kind's sign to a positive `amount`.
    ///
    /// Income counts towards a wallet's balance, expenses count against it.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            _ => Err(()),
        }
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// A single dated financial event against one wallet.
///
/// `category_id` is `None` only for the two legs of a wallet transfer, which
/// are linked to each other through `transfer_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The ID of the user that owns the transaction.
    pub user_id: UserID,
    /// The wallet the transaction is posted to.
    pub wallet_id: WalletId,
    /// The category labelling the transaction, absent for transfer legs.
    pub category_id: Option<CategoryId>,
    /// Whether money came in or went out.
    pub kind: TransactionKind,
    /// The amount of money spent or earned. Always positive.
    pub amount: f64,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// Links the two legs of a wallet transfer. `None` for ordinary
    /// transactions.
    pub transfer_id: Option<i64>,
}

impl Transaction {
    /// The amount with the kind's sign applied.
    pub fn signed_amount(&self) -> f64 {
        self.kind.signed(self.amount)
    }
}

/// Create the transaction table.
///
/// The table is named `txn` because `transaction` is an SQL keyword.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS txn (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES user(id),
                wallet_id INTEGER NOT NULL REFERENCES wallet(id),
                category_id INTEGER REFERENCES category(id),
                kind TEXT NOT NULL,
                amount REAL NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                transfer_id INTEGER
                )",
        (),
    )?;

    Ok(())
}

fn map_transaction_row(row: &rusqlite::Row) -> Result<Transaction, rusqlite::Error> {
    let raw_user_id = row.get(1)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserID::new(raw_user_id),
        wallet_id: row.get(2)?,
        category_id: row.get(3)?,
        kind: row.get(4)?,
        amount: row.get(5)?,
        date: row.get(6)?,
        description: row.get(7)?,
        transfer_id: row.get(8)?,
    })
}

const TXN_COLUMNS: &str =
    "id, user_id, wallet_id, category_id, kind, amount, date, description, transfer_id";

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Check that the wallet with `wallet_id` belongs to `user_id`.
///
/// # Errors
/// Returns an [Error::NotFound] if the wallet does not exist or belongs to
/// another user.
pub(crate) fn assert_wallet_owned(
    wallet_id: WalletId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    connection
        .query_row(
            "SELECT 1 FROM wallet WHERE id = :id AND user_id = :user_id",
            &[(":id", &wallet_id), (":user_id", &user_id.as_i64())],
            |_| Ok(()),
        )
        .map_err(|error| error.into())
}

fn assert_category_owned(
    category_id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    connection
        .query_row(
            "SELECT 1 FROM category WHERE id = :id AND user_id = :user_id",
            &[(":id", &category_id), (":user_id", &user_id.as_i64())],
            |_| Ok(()),
        )
        .map_err(|error| error.into())
}

/// Insert a transaction row without touching any wallet balance.
///
/// Callers are responsible for pairing this with [apply_balance_delta] inside
/// the same database transaction.
#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_transaction_row(
    user_id: UserID,
    wallet_id: WalletId,
    category_id: Option<CategoryId>,
    kind: TransactionKind,
    amount: f64,
    date: Date,
    description: &str,
    transfer_id: Option<i64>,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "INSERT INTO txn (user_id, wallet_id, category_id, kind, amount, date, description, transfer_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING {TXN_COLUMNS}"
        ))?
        .query_row(
            (
                user_id.as_i64(),
                wallet_id,
                category_id,
                kind,
                amount,
                date,
                description,
                transfer_id,
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// The fields used to create or overwrite a transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionData {
    /// The wallet the transaction is posted to.
    pub wallet_id: WalletId,
    /// The category labelling the transaction.
    pub category_id: CategoryId,
    /// Whether money came in or went out.
    pub kind: TransactionKind,
    /// The amount of money spent or earned. Must be positive.
    pub amount: f64,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    #[serde(default)]
    pub description: String,
}

/// Create a new transaction and apply its signed amount to the owning
/// wallet's balance.
///
/// Both writes happen in one database transaction: either the row is inserted
/// and the balance adjusted, or neither happens.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if `data.amount` is zero or negative,
/// - [Error::NotFound] if the wallet or category does not belong to `user_id`,
/// - [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    user_id: UserID,
    data: TransactionData,
    connection: &Connection,
) -> Result<Transaction, Error> {
    if data.amount <= 0.0 {
        return Err(Error::InvalidAmount);
    }

    let tx = connection.unchecked_transaction()?;

    assert_wallet_owned(data.wallet_id, user_id, &tx)?;
    assert_category_owned(data.category_id, user_id, &tx)?;

    let transaction = insert_transaction_row(
        user_id,
        data.wallet_id,
        Some(data.category_id),
        data.kind,
        data.amount,
        data.date,
        &data.description,
        None,
        &tx,
    )?;
    apply_balance_delta(data.wallet_id, transaction.signed_amount(), &tx)?;

    tx.commit()?;

    Ok(transaction)
}

/// Retrieve the transaction with `id` belonging to `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - [Error::SqlError] if there is some other SQL error.
pub fn get_transaction(
    id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM txn WHERE id = :id AND user_id = :user_id"
        ))?
        .query_row(
            &[(":id", &id), (":user_id", &user_id.as_i64())],
            map_transaction_row,
        )
        .map_err(|error| error.into())
}

/// Overwrite the transaction with `id` and move the reversed/reapplied signed
/// amounts between the affected wallets.
///
/// Within one database transaction this: loads the existing row, reverses its
/// old signed amount from its old wallet, applies the new signed amount to
/// the new wallet (which may be the same wallet), and overwrites the row's
/// fields. Reversing before applying means a wallet reassignment needs no
/// special casing.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if `data.amount` is zero or negative,
/// - [Error::NotFound] if the transaction, wallet, or category does not
///   belong to `user_id`,
/// - [Error::SqlError] if there is some other SQL error.
///
/// All writes are rolled back together on any error.
pub fn update_transaction(
    id: TransactionId,
    user_id: UserID,
    data: TransactionData,
    connection: &Connection,
) -> Result<Transaction, Error> {
    if data.amount <= 0.0 {
        return Err(Error::InvalidAmount);
    }

    let tx = connection.unchecked_transaction()?;

    let existing = get_transaction(id, user_id, &tx)?;
    apply_balance_delta(existing.wallet_id, -existing.signed_amount(), &tx)?;

    assert_wallet_owned(data.wallet_id, user_id, &tx)?;
    assert_category_owned(data.category_id, user_id, &tx)?;
    apply_balance_delta(data.wallet_id, data.kind.signed(data.amount), &tx)?;

    let updated = tx
        .prepare(&format!(
            "UPDATE txn
             SET wallet_id = ?1, category_id = ?2, kind = ?3, amount = ?4, date = ?5, description = ?6
             WHERE id = ?7
             RETURNING {TXN_COLUMNS}"
        ))?
        .query_row(
            (
                data.wallet_id,
                data.category_id,
                data.kind,
                data.amount,
                data.date,
                &data.description,
                id,
            ),
            map_transaction_row,
        )?;

    tx.commit()?;

    Ok(updated)
}

/// Delete the transaction with `id` and reverse its signed amount on its
/// wallet, in one database transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - [Error::SqlError] if there is some other SQL error.
pub fn delete_transaction(
    id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let tx = connection.unchecked_transaction()?;

    let existing = get_transaction(id, user_id, &tx)?;
    apply_balance_delta(existing.wallet_id, -existing.signed_amount(), &tx)?;
    tx.execute("DELETE FROM txn WHERE id = ?1", (id,))?;

    tx.commit()?;

    Ok(())
}

/// A transaction joined with the names of its wallet and category for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionListing {
    /// The transaction itself.
    pub transaction: Transaction,
    /// The name of the wallet the transaction is posted to.
    pub wallet_name: String,
    /// The name of the category, absent for transfer legs.
    pub category_name: Option<String>,
}

/// Get the user's transactions with wallet and category names, ordered by
/// date descending (ties broken by ID descending, i.e. newest row first).
///
/// `limit` selects up to the first N transactions; `None` returns all of them.
///
/// # Errors
/// Returns an [Error::SqlError] if an SQL related error occurred.
pub fn get_transaction_listings(
    user_id: UserID,
    limit: Option<u64>,
    connection: &Connection,
) -> Result<Vec<TransactionListing>, Error> {
    let mut query_string = format!(
        "SELECT {columns}, w.name, c.name
         FROM txn t
         INNER JOIN wallet w ON w.id = t.wallet_id
         LEFT JOIN category c ON c.id = t.category_id
         WHERE t.user_id = :user_id
         ORDER BY t.date DESC, t.id DESC",
        columns = "t.id, t.user_id, t.wallet_id, t.category_id, t.kind, t.amount, t.date, t.description, t.transfer_id"
    );

    if let Some(limit) = limit {
        query_string.push_str(&format!(" LIMIT {limit}"));
    }

    connection
        .prepare(&query_string)?
        .query_map(&[(":user_id", &user_id.as_i64())], |row| {
            let transaction = map_transaction_row(row)?;
            let wallet_name = row.get(9)?;
            let category_name = row.get(10)?;

            Ok(TransactionListing {
                transaction,
                wallet_name,
                category_name,
            })
        })?
        .map(|listing| listing.map_err(|error| error.into()))
        .collect()
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The state needed by the transaction route handlers.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A reference to a wallet inside a serialized transaction.
#[derive(Debug, Serialize)]
pub struct WalletRef {
    /// The ID of the wallet as a decimal string.
    pub id: String,
    /// The display name of the wallet.
    pub name: String,
}

/// A reference to a category inside a serialized transaction.
#[derive(Debug, Serialize)]
pub struct CategoryRef {
    /// The ID of the category as a decimal string.
    pub id: String,
    /// The display name of the category.
    pub name: String,
}

/// A transaction as serialized in API responses.
///
/// The IDs are serialized as decimal strings so that clients working with
/// double precision JSON numbers cannot lose precision on large IDs.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// The ID of the transaction as a decimal string.
    pub id: String,
    /// Whether money came in or went out.
    pub kind: TransactionKind,
    /// The amount of money spent or earned.
    pub amount: f64,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The wallet the transaction is posted to.
    pub wallet: WalletRef,
    /// The category labelling the transaction, absent for transfer legs.
    pub category: Option<CategoryRef>,
    /// The ID linking the two legs of a transfer, as a decimal string.
    pub transfer_id: Option<String>,
}

impl From<TransactionListing> for TransactionResponse {
    fn from(listing: TransactionListing) -> Self {
        let TransactionListing {
            transaction,
            wallet_name,
            category_name,
        } = listing;

        let category = transaction
            .category_id
            .zip(category_name)
            .map(|(id, name)| CategoryRef {
                id: id.to_string(),
                name,
            });

        Self {
            id: transaction.id.to_string(),
            kind: transaction.kind,
            amount: transaction.amount,
            date: transaction.date,
            description: transaction.description,
            wallet: WalletRef {
                id: transaction.wallet_id.to_string(),
                name: wallet_name,
            },
            category,
            transfer_id: transaction.transfer_id.map(|id| id.to_string()),
        }
    }
}

/// A route handler for listing the user's transactions, newest first.
pub async fn get_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transactions: Vec<TransactionResponse> =
        get_transaction_listings(user_id, None, &connection)?
            .into_iter()
            .map(TransactionResponse::from)
            .collect();

    Ok(Json(json!({ "transactions": transactions })).into_response())
}

/// A route handler for creating a new transaction.
///
/// On success the owning wallet's balance has already been adjusted by the
/// transaction's signed amount.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<TransactionData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = create_transaction(user_id, data, &connection)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Transaction created.",
            "transaction_id": transaction.id.to_string(),
        })),
    )
        .into_response())
}

/// A route handler for updating a transaction.
///
/// This function will return the status code 404 if the transaction does not
/// exist or belongs to another user.
pub async fn update_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<TransactionId>,
    Json(data): Json<TransactionData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    update_transaction(transaction_id, user_id, data, &connection)?;

    Ok(Json(json!({ "message": "Transaction updated." })).into_response())
}

/// A route handler for deleting a transaction.
///
/// This function will return the status code 404 if the transaction does not
/// exist or belongs to another user.
pub async fn delete_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    Path(transaction_id): Path<TransactionId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_transaction(transaction_id, user_id, &connection)?;

    Ok(Json(json!({ "message": "Transaction deleted." })).into_response())
}
