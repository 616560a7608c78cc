//! Moving balance between two wallets owned by the same user.
//!
//! A transfer is recorded as a pair of linked transaction rows: an expense
//! leg on the source wallet and an income leg on the destination wallet,
//! sharing a `transfer_id` and carrying no category. Recording both legs as
//! ordinary transactions keeps the per-wallet balance invariant intact, and
//! the pair cancels out in aggregate, so the sum of all wallet balances is
//! unchanged by a transfer.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use time::Date;

use crate::{
    AppState, Error, OverdraftPolicy,
    transaction::{Transaction, TransactionKind, assert_wallet_owned, insert_transaction_row},
    user::UserID,
    wallet::{WalletId, WalletResponse, apply_balance_delta, get_wallet},
};

/// The description recorded on both legs when the client does not provide one.
const DEFAULT_TRANSFER_DESCRIPTION: &str = "Wallet transfer";

/// The JSON payload for transferring balance between two wallets.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferData {
    /// The wallet the amount is taken from.
    pub from_wallet_id: WalletId,
    /// The wallet the amount is added to.
    pub to_wallet_id: WalletId,
    /// The amount to move. Must be positive.
    pub amount: f64,
    /// When the transfer happened.
    pub date: Date,
    /// A text description recorded on both legs.
    pub description: Option<String>,
}

/// Move `data.amount` from one wallet to another as a pair of linked
/// transactions, atomically.
///
/// Within one database transaction this inserts the expense leg on the source
/// wallet, the income leg on the destination wallet, and adjusts both cached
/// balances. The legs share a `transfer_id` (the expense leg's row ID).
///
/// # Errors
/// This function will return a:
/// - [Error::SameWalletTransfer] if source and destination are the same wallet,
/// - [Error::InvalidAmount] if `data.amount` is zero or negative,
/// - [Error::NotFound] if either wallet does not belong to `user_id`,
/// - [Error::InsufficientFunds] if `policy` is [OverdraftPolicy::Deny] and the
///   source wallet's balance does not cover the amount,
/// - [Error::SqlError] if there is some other SQL error.
///
/// All writes are rolled back together on any error.
pub fn transfer_balance(
    user_id: UserID,
    data: TransferData,
    policy: OverdraftPolicy,
    connection: &Connection,
) -> Result<(Transaction, Transaction), Error> {
    if data.from_wallet_id == data.to_wallet_id {
        return Err(Error::SameWalletTransfer);
    }

    if data.amount <= 0.0 {
        return Err(Error::InvalidAmount);
    }

    let description = data
        .description
        .unwrap_or_else(|| DEFAULT_TRANSFER_DESCRIPTION.to_string());

    let tx = connection.unchecked_transaction()?;

    let source = get_wallet(data.from_wallet_id, user_id, &tx)?;
    assert_wallet_owned(data.to_wallet_id, user_id, &tx)?;

    if policy == OverdraftPolicy::Deny && source.balance < data.amount {
        return Err(Error::InsufficientFunds);
    }

    let debit = insert_transaction_row(
        user_id,
        data.from_wallet_id,
        None,
        TransactionKind::Expense,
        data.amount,
        data.date,
        &description,
        None,
        &tx,
    )?;
    // The expense leg's row ID doubles as the transfer ID for both legs.
    tx.execute(
        "UPDATE txn SET transfer_id = ?1 WHERE id = ?1",
        (debit.id,),
    )?;
    let credit = insert_transaction_row(
        user_id,
        data.to_wallet_id,
        None,
        TransactionKind::Income,
        data.amount,
        data.date,
        &description,
        Some(debit.id),
        &tx,
    )?;

    apply_balance_delta(data.from_wallet_id, -data.amount, &tx)?;
    apply_balance_delta(data.to_wallet_id, data.amount, &tx)?;

    tx.commit()?;

    let debit = Transaction {
        transfer_id: Some(debit.id),
        ..debit
    };

    Ok((debit, credit))
}

/// The state needed by the transfer route handler.
#[derive(Debug, Clone)]
pub struct TransferState {
    /// The database connection holding the wallets.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Whether transfers may overdraw the source wallet.
    pub overdraft_policy: OverdraftPolicy,
}

impl FromRef<AppState> for TransferState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            overdraft_policy: state.overdraft_policy,
        }
    }
}

/// A route handler for transferring balance between two of the user's wallets.
///
/// Responds with both wallets' post-transfer states.
pub async fn transfer_endpoint(
    State(state): State<TransferState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<TransferData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let from_wallet_id = data.from_wallet_id;
    let to_wallet_id = data.to_wallet_id;
    transfer_balance(user_id, data, state.overdraft_policy, &connection)?;

    let from_wallet = get_wallet(from_wallet_id, user_id, &connection)?;
    let to_wallet = get_wallet(to_wallet_id, user_id, &connection)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Transfer complete.",
            "from_wallet": WalletResponse::from(from_wallet),
            "to_wallet": WalletResponse::from(to_wallet),
        })),
    )
        .into_response())
}
