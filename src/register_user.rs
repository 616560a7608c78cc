//! The registration endpoint for creating a new user account.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use email_address::EmailAddress;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState, Error, PasswordHash, ValidatedPassword,
    user::{UserResponse, create_user},
};

/// The state needed for creating a new user.
#[derive(Debug, Clone)]
pub struct RegistrationState {
    /// The database connection for storing users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The JSON payload for registering a new user.
#[derive(Debug, Deserialize)]
pub struct RegisterData {
    /// The display name of the new user.
    pub name: String,
    /// The email address to register. Must be unique across users.
    pub email: String,
    /// The plain text password to hash and store.
    pub password: String,
}

/// A route handler for registering a new user account.
///
/// The email must be syntactically valid and not yet registered, and the
/// password must pass the strength check. The new user is not logged in by
/// registering; the client follows up with a log-in request.
pub async fn register_user(
    State(state): State<RegistrationState>,
    Json(data): Json<RegisterData>,
) -> Result<Response, Error> {
    let email = EmailAddress::from_str(&data.email)
        .map_err(|_| Error::InvalidEmail(data.email.clone()))?;

    let validated_password = ValidatedPassword::new(&data.password)?;
    let password_hash = PasswordHash::new(validated_password, PasswordHash::DEFAULT_COST)
        .inspect_err(|error| {
            tracing::error!("an error occurred while hashing a password: {error}")
        })?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let user = create_user(&data.name, &email, password_hash, &connection)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful.",
            "user": UserResponse::from(user),
        })),
    )
        .into_response())
}
