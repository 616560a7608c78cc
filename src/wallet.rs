//! Wallet management for the personal finance application.
//!
//! This module contains everything related to wallets:
//! - The `Wallet` model and `WalletKind` enum
//! - Database functions for storing, querying, and deleting wallets
//! - Route handlers for the wallet endpoints
//!
//! A wallet's `balance` column is a cached quantity: it always equals the
//! balance the wallet was created with plus the signed sum of every
//! transaction posted to it. The ledger code in [crate::transaction] and
//! [crate::transfer] adjusts it via `apply_balance_delta` inside the same
//! database transaction that writes the transaction rows.

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
use time::{Date, OffsetDateTime};

use crate::{AppState, DatabaseId, Error, user::UserID};

// ============================================================================
// MODELS
// ============================================================================

/// Alias for the integer type used for wallet IDs.
pub type WalletId = DatabaseId;

/// The kind of a wallet, i.e. where the money is actually kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    /// Physical cash.
    Cash,
    /// A bank account.
    Bank,
    /// An electronic wallet such as a prepaid phone app.
    EWallet,
    /// Anything that does not fit the other kinds.
    Other,
}

impl WalletKind {
    /// The string stored in the database for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Cash => "cash",
            WalletKind::Bank => "bank",
            WalletKind::EWallet => "e_wallet",
            WalletKind::Other => "other",
        }
    }
}

impl FromStr for WalletKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(WalletKind::Cash),
            "bank" => Ok(WalletKind::Bank),
            "e_wallet" => Ok(WalletKind::EWallet),
            "other" => Ok(WalletKind::Other),
            _ => Err(()),
        }
    }
}

impl ToSql for WalletKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for WalletKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// A named store of funds owned by one user, with a running balance.
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    /// The ID of the wallet.
    pub id: WalletId,
    /// The ID of the user that owns the wallet.
    pub user_id: UserID,
    /// The display name of the wallet.
    pub name: String,
    /// Where the money is kept.
    pub kind: WalletKind,
    /// The cached balance of the wallet.
    pub balance: f64,
    /// Whether the wallet is shown in listings and counted in total assets.
    pub is_active: bool,
    /// The date the wallet was created.
    pub created_at: Date,
}

/// Create the wallet table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_wallet_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS wallet (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES user(id),
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                balance REAL NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_wallet_row(row: &rusqlite::Row) -> Result<Wallet, rusqlite::Error> {
    let raw_user_id = row.get(1)?;

    Ok(Wallet {
        id: row.get(0)?,
        user_id: UserID::new(raw_user_id),
        name: row.get(2)?,
        kind: row.get(3)?,
        balance: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const WALLET_COLUMNS: &str = "id, user_id, name, kind, balance, is_active, created_at";

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new wallet for `user_id` with an initial balance.
///
/// # Errors
/// Returns an [Error::SqlError] if an SQL related error occurred.
pub fn create_wallet(
    user_id: UserID,
    name: &str,
    kind: WalletKind,
    initial_balance: f64,
    connection: &Connection,
) -> Result<Wallet, Error> {
    let created_at = OffsetDateTime::now_utc().date();

    let wallet = connection
        .prepare(&format!(
            "INSERT INTO wallet (user_id, name, kind, balance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {WALLET_COLUMNS}"
        ))?
        .query_row(
            (user_id.as_i64(), name, kind, initial_balance, created_at),
            map_wallet_row,
        )?;

    Ok(wallet)
}

/// Retrieve the wallet with `wallet_id` belonging to `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the wallet does not exist or belongs to another user,
/// - [Error::SqlError] if there is some other SQL error.
pub fn get_wallet(
    wallet_id: WalletId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Wallet, Error> {
    connection
        .prepare(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallet WHERE id = :id AND user_id = :user_id"
        ))?
        .query_row(
            &[(":id", &wallet_id), (":user_id", &user_id.as_i64())],
            map_wallet_row,
        )
        .map_err(|error| error.into())
}

/// Get all active wallets belonging to `user_id`, most recently created first.
///
/// # Errors
/// Returns an [Error::SqlError] if an SQL related error occurred.
pub fn get_wallets(user_id: UserID, connection: &Connection) -> Result<Vec<Wallet>, Error> {
    connection
        .prepare(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallet
             WHERE user_id = :user_id AND is_active = 1
             ORDER BY created_at DESC, id DESC"
        ))?
        .query_map(&[(":user_id", &user_id.as_i64())], map_wallet_row)?
        .map(|wallet| wallet.map_err(|error| error.into()))
        .collect()
}

/// Overwrite the name and kind of the wallet with `wallet_id`.
///
/// The balance is deliberately not updatable here: it only moves through the
/// ledger operations so that it stays consistent with the transaction history.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the wallet does not exist or belongs to another user,
/// - [Error::SqlError] if there is some other SQL error.
pub fn update_wallet(
    wallet_id: WalletId,
    user_id: UserID,
    name: &str,
    kind: WalletKind,
    connection: &Connection,
) -> Result<Wallet, Error> {
    connection
        .prepare(&format!(
            "UPDATE wallet SET name = ?1, kind = ?2
             WHERE id = ?3 AND user_id = ?4
             RETURNING {WALLET_COLUMNS}"
        ))?
        .query_row((name, kind, wallet_id, user_id.as_i64()), map_wallet_row)
        .map_err(|error| error.into())
}

/// Delete the wallet with `wallet_id` belonging to `user_id`.
///
/// Deletion is refused while any transaction still references the wallet,
/// since deleting the wallet would orphan its transaction history and break
/// the balance bookkeeping.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the wallet does not exist or belongs to another user,
/// - [Error::WalletHasTransactions] if transactions still reference the wallet,
/// - [Error::SqlError] if there is some other SQL error.
pub fn delete_wallet(
    wallet_id: WalletId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let tx = connection.unchecked_transaction()?;

    // Checking ownership first means a foreign wallet reports NotFound rather
    // than leaking that the ID exists.
    get_wallet(wallet_id, user_id, &tx)?;

    let transaction_count: i64 = tx.query_row(
        "SELECT COUNT(id) FROM txn WHERE wallet_id = :wallet_id",
        &[(":wallet_id", &wallet_id)],
        |row| row.get(0),
    )?;

    if transaction_count > 0 {
        return Err(Error::WalletHasTransactions);
    }

    tx.execute("DELETE FROM wallet WHERE id = ?1", (wallet_id,))?;
    tx.commit()?;

    Ok(())
}

/// Adjust the cached balance of `wallet_id` by `delta`.
///
/// This is the single place the balance column is written outside of wallet
/// creation. Callers must run it inside the same database transaction as the
/// transaction-row writes it accounts for.
pub(crate) fn apply_balance_delta(
    wallet_id: WalletId,
    delta: f64,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE wallet SET balance = balance + ?1 WHERE id = ?2",
        (delta, wallet_id),
    )?;

    if rows_affected != 1 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Get the total balance across all of the user's active wallets.
///
/// # Errors
/// Returns an [Error::SqlError] if an SQL related error occurred.
pub fn get_total_assets(user_id: UserID, connection: &Connection) -> Result<f64, Error> {
    let total = connection.query_row(
        "SELECT COALESCE(SUM(balance), 0) FROM wallet
         WHERE user_id = :user_id AND is_active = 1",
        &[(":user_id", &user_id.as_i64())],
        |row| row.get(0),
    )?;

    Ok(total)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The state needed by the wallet route handlers.
#[derive(Debug, Clone)]
pub struct WalletState {
    /// The database connection for managing wallets.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for WalletState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The JSON payload for creating a wallet.
#[derive(Debug, Deserialize)]
pub struct CreateWalletData {
    /// The display name of the wallet.
    pub name: String,
    /// Where the money is kept.
    pub kind: WalletKind,
    /// The balance the wallet starts out with.
    #[serde(default)]
    pub balance: f64,
}

/// The JSON payload for updating a wallet.
#[derive(Debug, Deserialize)]
pub struct UpdateWalletData {
    /// The display name of the wallet.
    pub name: String,
    /// Where the money is kept.
    pub kind: WalletKind,
}

/// A wallet as serialized in API responses.
///
/// The IDs are serialized as decimal strings so that clients working with
/// double precision JSON numbers cannot lose precision on large IDs.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    /// The ID of the wallet as a decimal string.
    pub id: String,
    /// The display name of the wallet.
    pub name: String,
    /// Where the money is kept.
    pub kind: WalletKind,
    /// The cached balance of the wallet.
    pub balance: f64,
    /// Whether the wallet is shown in listings and counted in total assets.
    pub is_active: bool,
    /// The date the wallet was created.
    pub created_at: Date,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id.to_string(),
            name: wallet.name,
            kind: wallet.kind,
            balance: wallet.balance,
            is_active: wallet.is_active,
            created_at: wallet.created_at,
        }
    }
}

/// A route handler for listing the user's active wallets.
pub async fn get_wallets_endpoint(
    State(state): State<WalletState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let wallets: Vec<WalletResponse> = get_wallets(user_id, &connection)?
        .into_iter()
        .map(WalletResponse::from)
        .collect();

    Ok(Json(json!({ "wallets": wallets })).into_response())
}

/// A route handler for creating a new wallet.
pub async fn create_wallet_endpoint(
    State(state): State<WalletState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<CreateWalletData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let wallet = create_wallet(user_id, &data.name, data.kind, data.balance, &connection)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Wallet created.",
            "wallet": WalletResponse::from(wallet),
        })),
    )
        .into_response())
}

/// A route handler for updating a wallet's name and kind.
///
/// This function will return the status code 404 if the wallet does not exist
/// or belongs to another user.
pub async fn update_wallet_endpoint(
    State(state): State<WalletState>,
    Extension(user_id): Extension<UserID>,
    Path(wallet_id): Path<WalletId>,
    Json(data): Json<UpdateWalletData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let wallet = update_wallet(wallet_id, user_id, &data.name, data.kind, &connection)?;

    Ok(Json(json!({
        "message": "Wallet updated.",
        "wallet": WalletResponse::from(wallet),
    }))
    .into_response())
}

/// A route handler for deleting a wallet.
///
/// Responds with a 409 when the wallet still has transactions posted to it.
pub async fn delete_wallet_endpoint(
    State(state): State<WalletState>,
    Extension(user_id): Extension<UserID>,
    Path(wallet_id): Path<WalletId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_wallet(wallet_id, user_id, &connection)?;

    Ok(Json(json!({ "message": "Wallet deleted." })).into_response())
}
