//! Routes for reading and updating the logged in user's profile.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState, Error, PasswordHash, ValidatedPassword,
    user::{UserID, UserResponse, get_user_by_id, update_user_password, update_user_profile},
};

/// The state needed by the profile route handlers.
#[derive(Debug, Clone)]
pub struct ProfileState {
    /// The database connection for reading and updating users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ProfileState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The JSON payload for updating the profile fields.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileData {
    /// The user's job title. `None` clears the field.
    pub job_title: Option<String>,
    /// The user's own estimate of their monthly income. `None` clears the field.
    pub monthly_income_estimate: Option<f64>,
}

/// The JSON payload for changing the password.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordData {
    /// The user's current password, for re-authentication.
    pub current_password: String,
    /// The new plain text password to hash and store.
    pub new_password: String,
}

/// A route handler returning the logged in user's profile.
pub async fn get_profile_endpoint(
    State(state): State<ProfileState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let user = get_user_by_id(user_id, &connection)?;

    Ok(Json(json!({ "user": UserResponse::from(user) })).into_response())
}

/// A route handler for updating the logged in user's profile fields.
pub async fn update_profile_endpoint(
    State(state): State<ProfileState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<UpdateProfileData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    update_user_profile(
        user_id,
        data.job_title.as_deref(),
        data.monthly_income_estimate,
        &connection,
    )?;
    let user = get_user_by_id(user_id, &connection)?;

    Ok(Json(json!({
        "message": "Profile updated.",
        "user": UserResponse::from(user),
    }))
    .into_response())
}

/// A route handler for changing the logged in user's password.
///
/// The current password is verified before the new one is validated, hashed,
/// and stored.
pub async fn change_password_endpoint(
    State(state): State<ProfileState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<ChangePasswordData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let user = get_user_by_id(user_id, &connection)?;

    let is_password_valid = user
        .password_hash
        .verify(&data.current_password)
        .map_err(|error| {
            tracing::error!("Unhandled error while verifying credentials: {error}");
            Error::HashingError(error.to_string())
        })?;

    if !is_password_valid {
        return Err(Error::InvalidCredentials);
    }

    let validated_password = ValidatedPassword::new(&data.new_password)?;
    let password_hash = PasswordHash::new(validated_password, PasswordHash::DEFAULT_COST)
        .inspect_err(|error| {
            tracing::error!("an error occurred while hashing a password: {error}")
        })?;

    update_user_password(user_id, &password_hash, &connection)?;

    Ok(Json(json!({ "message": "Password changed." })).into_response())
}

#[cfg(test)]
mod profile_tests {
    use std::{
        str::FromStr,
        sync::{Arc, Mutex},
    };

    use axum::{
        Extension, Router,
        routing::{get, put},
    };
    use axum_test::TestServer;
    use email_address::EmailAddress;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{
        PasswordHash, endpoints, initialize_db,
        user::{create_user, get_user_by_id},
    };

    use super::{
        ProfileState, change_password_endpoint, get_profile_endpoint, update_profile_endpoint,
    };

    const TEST_PASSWORD: &str = "averystrongandsecurepassword";

    fn get_test_server() -> (TestServer, ProfileState, crate::user::User) {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        initialize_db(&connection).expect("Could not initialize database");
        let user = create_user(
            "Test User",
            &EmailAddress::from_str("foo@bar.baz").unwrap(),
            PasswordHash::from_raw_password(TEST_PASSWORD, 4).unwrap(),
            &connection,
        )
        .expect("Could not create test user");

        let state = ProfileState {
            db_connection: Arc::new(Mutex::new(connection)),
        };
        let app = Router::new()
            .route(
                endpoints::PROFILE,
                get(get_profile_endpoint).put(update_profile_endpoint),
            )
            .route(endpoints::PROFILE_PASSWORD, put(change_password_endpoint))
            .layer(Extension(user.id))
            .with_state(state.clone());

        let server = TestServer::try_new(app).expect("Could not create test server.");

        (server, state, user)
    }

    #[tokio::test]
    async fn get_profile_returns_user_without_password() {
        let (server, _, _) = get_test_server();

        let response = server.get(endpoints::PROFILE).await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["user"]["name"], "Test User");
        assert!(
            body["user"].get("password").is_none() && body["user"].get("password_hash").is_none(),
            "the password hash must not be serialized"
        );
    }

    #[tokio::test]
    async fn update_profile_sets_fields() {
        let (server, _, _) = get_test_server();

        let response = server
            .put(endpoints::PROFILE)
            .json(&json!({
                "job_title": "Plumber",
                "monthly_income_estimate": 4200.0,
            }))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["user"]["job_title"], "Plumber");
        assert_eq!(body["user"]["monthly_income_estimate"], 4200.0);
    }

    #[tokio::test]
    async fn change_password_requires_correct_current_password() {
        let (server, _, _) = get_test_server();

        let response = server
            .put(endpoints::PROFILE_PASSWORD)
            .json(&json!({
                "current_password": "thewrongpassword",
                "new_password": "anotherverystrongpassword",
            }))
            .await;

        response.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn change_password_stores_new_hash() {
        let (server, state, user) = get_test_server();

        let response = server
            .put(endpoints::PROFILE_PASSWORD)
            .json(&json!({
                "current_password": TEST_PASSWORD,
                "new_password": "anotherverystrongpassword",
            }))
            .await;

        response.assert_status_ok();
        let connection = state.db_connection.lock().unwrap();
        let updated_user = get_user_by_id(user.id, &connection).unwrap();
        assert!(updated_user.password_hash.verify("anotherverystrongpassword").unwrap());
        assert!(!updated_user.password_hash.verify(TEST_PASSWORD).unwrap());
    }

    #[tokio::test]
    async fn change_password_rejects_weak_new_password() {
        let (server, _, _) = get_test_server();

        let response = server
            .put(endpoints::PROFILE_PASSWORD)
            .json(&json!({
                "current_password": TEST_PASSWORD,
                "new_password": "foo",
            }))
            .await;

        response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
