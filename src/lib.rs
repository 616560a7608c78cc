//! Walleteer is a web app for managing your money across multiple wallets.
//!
//! This library provides a JSON REST API backed by SQLite. Users register and
//! log in, organise their money into wallets (cash, bank, e-wallet), label
//! transactions with income/expense categories, move money between wallets,
//! and read monthly statistics from the dashboard endpoint.
//!
//! The one invariant the whole crate is built around: a wallet's cached
//! balance always equals its balance at creation plus the signed sum of every
//! transaction posted to it. All mutations that touch this invariant run
//! inside a single database transaction.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
pub mod auth;
pub mod category;
pub mod dashboard;
mod database_id;
mod db;
pub mod endpoints;
pub mod log_in;
pub mod log_out;
mod logging;
mod password;
pub mod profile;
pub mod register_user;
mod routing;
mod timezone;
pub mod transaction;
pub mod transfer;
pub mod user;
pub mod wallet;

pub use app_state::{AppState, OverdraftPolicy, create_cookie_key};
pub use database_id::DatabaseId;
pub use db::initialize as initialize_db;
pub use logging::logging_middleware;
pub use password::{PasswordHash, ValidatedPassword};
pub use routing::build_router;
pub use user::{User, UserID};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The user provided an email/password combination that does not match a
    /// registered user.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The session cookie is missing from the cookie jar in the request.
    #[error("no session cookie in the cookie jar :(")]
    CookieMissing,

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    /// When communicating with the application client this error should be
    /// replaced with a general error type indicating an internal server error.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The string used to register a user is not a valid email address.
    #[error("\"{0}\" is not a valid email address")]
    InvalidEmail(String),

    /// The email used to register a user already exists in the database.
    #[error("the email address is already registered")]
    DuplicateEmail,

    /// A zero or negative amount was used for a transaction or transfer.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// A transfer named the same wallet as both source and destination.
    #[error("cannot transfer between a wallet and itself")]
    SameWalletTransfer,

    /// A transfer was rejected because the source wallet's balance does not
    /// cover the amount and the server is configured to deny overdrafts.
    #[error("insufficient balance in the source wallet")]
    InsufficientFunds,

    /// Tried to delete a wallet that still has transactions posted to it.
    #[error("the wallet has related transactions and cannot be deleted")]
    WalletHasTransactions,

    /// Tried to delete a category that transactions still reference.
    #[error("the category has related transactions and cannot be deleted")]
    CategoryHasTransactions,

    /// The requested resource was not found.
    ///
    /// This error covers both a missing row and a row owned by another user,
    /// so responses do not reveal whether a foreign ID exists.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A query was given an ID that does not refer to an existing row.
    #[error("a referenced resource does not exist")]
    InvalidForeignKey,

    /// There was an error computing or formatting a date.
    #[error("could not process date: {0}")]
    DateError(String),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An error occurred while serializing a struct as JSON.
    #[error("could not serialize as JSON: {0}")]
    JsonSerializationError(String),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("user.email") =>
            {
                Error::DuplicateEmail
            }
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(_))
                if sql_error.extended_code == 787 =>
            {
                Error::InvalidForeignKey
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidCredentials | Error::CookieMissing => StatusCode::UNAUTHORIZED,
            Error::TooWeak(_)
            | Error::InvalidEmail(_)
            | Error::InvalidAmount
            | Error::SameWalletTransfer
            | Error::InvalidForeignKey => StatusCode::UNPROCESSABLE_ENTITY,
            Error::DuplicateEmail
            | Error::InsufficientFunds
            | Error::WalletHasTransactions
            | Error::CategoryHasTransactions => StatusCode::CONFLICT,
            Error::NotFound => StatusCode::NOT_FOUND,
            // Any errors that are not handled above are not intended to be
            // shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "An unexpected error occurred, check the server logs for more details." })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
