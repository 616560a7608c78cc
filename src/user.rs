//! Code for creating the user table and fetching users from the database.

use std::fmt::Display;

use email_address::EmailAddress;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{Error, PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A user of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The user's display name.
    pub name: String,
    /// The email address the user registered and logs in with.
    pub email: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// The user's job title, if they have filled out their profile.
    pub job_title: Option<String>,
    /// The user's own estimate of their monthly income, if they have filled
    /// out their profile.
    pub monthly_income_estimate: Option<f64>,
    /// The date the user registered.
    pub created_at: Date,
}

/// A user as serialized in API responses.
///
/// The password hash never leaves the server; the ID is serialized as a
/// decimal string so that clients working with double precision JSON numbers
/// cannot lose precision on large IDs.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// The ID of the user as a decimal string.
    pub id: String,
    /// The user's display name.
    pub name: String,
    /// The email address the user registered with.
    pub email: String,
    /// The user's job title, if set.
    pub job_title: Option<String>,
    /// The user's own estimate of their monthly income, if set.
    pub monthly_income_estimate: Option<f64>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name,
            email: user.email,
            job_title: user.job_title,
            monthly_income_estimate: user.monthly_income_estimate,
        }
    }
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                job_title TEXT,
                monthly_income_estimate REAL,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_user_row(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let raw_id = row.get(0)?;
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: UserID::new(raw_id),
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        job_title: row.get(4)?,
        monthly_income_estimate: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const USER_COLUMNS: &str = "id, name, email, password, job_title, monthly_income_estimate, created_at";

/// Create and insert a new user into the database.
///
/// The email is taken as an [EmailAddress] so that only syntactically valid
/// addresses reach the database.
///
/// # Errors
///
/// Returns a:
/// - [Error::DuplicateEmail] if the email is already registered,
/// - [Error::SqlError] if some other SQL related error occurred.
pub fn create_user(
    name: &str,
    email: &EmailAddress,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<User, Error> {
    let created_at = OffsetDateTime::now_utc().date();

    let user = connection
        .prepare(&format!(
            "INSERT INTO user (name, email, password, created_at)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING {USER_COLUMNS}"
        ))?
        .query_row(
            (
                name,
                email.to_string(),
                password_hash.to_string(),
                created_at,
            ),
            map_user_row,
        )?;

    Ok(user)
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("SELECT {USER_COLUMNS} FROM user WHERE id = :id"))?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(|error| error.into())
}

/// Get the user from the database with an email equal to `email`.
///
/// # Errors
///
/// This function will return an error if:
/// - `email` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("SELECT {USER_COLUMNS} FROM user WHERE email = :email"))?
        .query_row(&[(":email", &email)], map_user_row)
        .map_err(|error| error.into())
}

/// Overwrite the profile fields of the user with an ID equal to `user_id`.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if `user_id` does not belong to a registered user,
/// - [Error::SqlError] if an SQL related error occurred.
pub fn update_user_profile(
    user_id: UserID,
    job_title: Option<&str>,
    monthly_income_estimate: Option<f64>,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET job_title = ?1, monthly_income_estimate = ?2 WHERE id = ?3",
        (job_title, monthly_income_estimate, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Replace the password hash of the user with an ID equal to `user_id`.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if `user_id` does not belong to a registered user,
/// - [Error::SqlError] if an SQL related error occurred.
pub fn update_user_password(
    user_id: UserID,
    password_hash: &PasswordHash,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET password = ?1 WHERE id = ?2",
        (password_hash.to_string(), user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

#[cfg(test)]
mod user_tests {
    use std::str::FromStr;

    use email_address::EmailAddress;
    use rusqlite::Connection;

    use crate::{
        PasswordHash,
        user::{
            UserID, create_user, get_user_by_email, get_user_by_id, update_user_password,
            update_user_profile,
        },
    };

    use super::{Error, create_user_table};

    fn get_db_connection() -> Connection {
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        create_user_table(&conn).expect("Could not create user table");

        conn
    }

    fn insert_test_user(connection: &Connection) -> super::User {
        create_user(
            "Test User",
            &EmailAddress::from_str("foo@bar.baz").unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            connection,
        )
        .expect("Could not insert test user")
    }

    #[test]
    fn insert_user_succeeds() {
        let connection = get_db_connection();

        let inserted_user = insert_test_user(&connection);

        assert!(inserted_user.id.as_i64() > 0);
        assert_eq!(inserted_user.name, "Test User");
        assert_eq!(inserted_user.email, "foo@bar.baz");
        assert_eq!(inserted_user.job_title, None);
    }

    #[test]
    fn insert_user_fails_with_duplicate_email() {
        let connection = get_db_connection();
        insert_test_user(&connection);

        let result = create_user(
            "Other User",
            &EmailAddress::from_str("foo@bar.baz").unwrap(),
            PasswordHash::new_unchecked("hunter3"),
            &connection,
        );

        assert_eq!(result, Err(Error::DuplicateEmail));
    }

    #[test]
    fn get_user_fails_with_non_existent_id() {
        let connection = get_db_connection();

        let id = UserID::new(42);

        assert_eq!(get_user_by_id(id, &connection), Err(Error::NotFound));
    }

    #[test]
    fn get_user_succeeds_with_existing_id() {
        let connection = get_db_connection();
        let test_user = insert_test_user(&connection);

        let retrieved_user = get_user_by_id(test_user.id, &connection).unwrap();

        assert_eq!(retrieved_user, test_user);
    }

    #[test]
    fn get_user_by_email_succeeds() {
        let connection = get_db_connection();
        let test_user = insert_test_user(&connection);

        let retrieved_user = get_user_by_email("foo@bar.baz", &connection).unwrap();

        assert_eq!(retrieved_user, test_user);
    }

    #[test]
    fn update_profile_overwrites_fields() {
        let connection = get_db_connection();
        let test_user = insert_test_user(&connection);

        update_user_profile(test_user.id, Some("Plumber"), Some(4200.0), &connection).unwrap();

        let updated_user = get_user_by_id(test_user.id, &connection).unwrap();
        assert_eq!(updated_user.job_title.as_deref(), Some("Plumber"));
        assert_eq!(updated_user.monthly_income_estimate, Some(4200.0));
    }

    #[test]
    fn update_password_replaces_hash() {
        let connection = get_db_connection();
        let test_user = insert_test_user(&connection);
        let new_hash = PasswordHash::new_unchecked("hunter3");

        update_user_password(test_user.id, &new_hash, &connection).unwrap();

        let updated_user = get_user_by_id(test_user.id, &connection).unwrap();
        assert_eq!(updated_user.password_hash, new_hash);
    }

    #[test]
    fn update_password_fails_for_missing_user() {
        let connection = get_db_connection();
        let new_hash = PasswordHash::new_unchecked("hunter3");

        let result = update_user_password(UserID::new(42), &new_hash, &connection);

        assert_eq!(result, Err(Error::NotFound));
    }
}
