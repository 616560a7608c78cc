//! Category management for labelling transactions.
//!
//! A category is a user-defined label with an income/expense kind. The kind
//! pairs a category with the matching transaction kind by convention only,
//! it is not enforced when a transaction is created.

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

use crate::{AppState, DatabaseId, Error, user::UserID};

// ============================================================================
// MODELS
// ============================================================================

/// Alias for the integer type used for category IDs.
pub type CategoryId = DatabaseId;

/// Whether a category labels money coming in or going out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    /// The category labels income transactions.
    Income,
    /// The category labels expense transactions.
    Expense,
}

impl CategoryKind {
    /// The string stored in the database for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
        }
    }
}

impl FromStr for CategoryKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(CategoryKind::Income),
            "expense" => Ok(CategoryKind::Expense),
            _ => Err(()),
        }
    }
}

impl ToSql for CategoryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for CategoryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// A user-defined label attached to transactions for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    /// The ID of the category.
    pub id: CategoryId,
    /// The ID of the user that owns the category.
    pub user_id: UserID,
    /// The display name of the category.
    pub name: String,
    /// Whether the category labels income or expenses.
    pub kind: CategoryKind,
}

/// Create the category table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS category (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES user(id),
                name TEXT NOT NULL,
                kind TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_category_row(row: &rusqlite::Row) -> Result<Category, rusqlite::Error> {
    let raw_user_id = row.get(1)?;

    Ok(Category {
        id: row.get(0)?,
        user_id: UserID::new(raw_user_id),
        name: row.get(2)?,
        kind: row.get(3)?,
    })
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new category for `user_id`.
///
/// # Errors
/// Returns an [Error::SqlError] if an SQL related error occurred.
pub fn create_category(
    user_id: UserID,
    name: &str,
    kind: CategoryKind,
    connection: &Connection,
) -> Result<Category, Error> {
    let category = connection
        .prepare(
            "INSERT INTO category (user_id, name, kind)
             VALUES (?1, ?2, ?3)
             RETURNING id, user_id, name, kind",
        )?
        .query_row((user_id.as_i64(), name, kind), map_category_row)?;

    Ok(category)
}

/// Retrieve the category with `category_id` belonging to `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the category does not exist or belongs to another user,
/// - [Error::SqlError] if there is some other SQL error.
pub fn get_category(
    category_id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Category, Error> {
    connection
        .prepare("SELECT id, user_id, name, kind FROM category WHERE id = :id AND user_id = :user_id")?
        .query_row(
            &[(":id", &category_id), (":user_id", &user_id.as_i64())],
            map_category_row,
        )
        .map_err(|error| error.into())
}

/// Get all categories belonging to `user_id`, ordered by name.
///
/// # Errors
/// Returns an [Error::SqlError] if an SQL related error occurred.
pub fn get_categories(user_id: UserID, connection: &Connection) -> Result<Vec<Category>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, name, kind FROM category
             WHERE user_id = :user_id
             ORDER BY name ASC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_category_row)?
        .map(|category| category.map_err(|error| error.into()))
        .collect()
}

/// Overwrite the name and kind of the category with `category_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the category does not exist or belongs to another user,
/// - [Error::SqlError] if there is some other SQL error.
pub fn update_category(
    category_id: CategoryId,
    user_id: UserID,
    name: &str,
    kind: CategoryKind,
    connection: &Connection,
) -> Result<Category, Error> {
    connection
        .prepare(
            "UPDATE category SET name = ?1, kind = ?2
             WHERE id = ?3 AND user_id = ?4
             RETURNING id, user_id, name, kind",
        )?
        .query_row((name, kind, category_id, user_id.as_i64()), map_category_row)
        .map_err(|error| error.into())
}

/// Delete the category with `category_id` belonging to `user_id`.
///
/// Deletion is refused while any transaction still references the category.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the category does not exist or belongs to another user,
/// - [Error::CategoryHasTransactions] if transactions still reference the category,
/// - [Error::SqlError] if there is some other SQL error.
pub fn delete_category(
    category_id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let tx = connection.unchecked_transaction()?;

    get_category(category_id, user_id, &tx)?;

    let transaction_count: i64 = tx.query_row(
        "SELECT COUNT(id) FROM txn WHERE category_id = :category_id",
        &[(":category_id", &category_id)],
        |row| row.get(0),
    )?;

    if transaction_count > 0 {
        return Err(Error::CategoryHasTransactions);
    }

    tx.execute("DELETE FROM category WHERE id = ?1", (category_id,))?;
    tx.commit()?;

    Ok(())
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The state needed by the category route handlers.
#[derive(Debug, Clone)]
pub struct CategoryState {
    /// The database connection for managing categories.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The JSON payload for creating or updating a category.
#[derive(Debug, Deserialize)]
pub struct CategoryData {
    /// The display name of the category.
    pub name: String,
    /// Whether the category labels income or expenses.
    pub kind: CategoryKind,
}

/// A category as serialized in API responses.
#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    /// The ID of the category as a decimal string.
    pub id: String,
    /// The display name of the category.
    pub name: String,
    /// Whether the category labels income or expenses.
    pub kind: CategoryKind,
}

impl From<Category> for CategoryResponse {
    fn from(category: Category) -> Self {
        Self {
            id: category.id.to_string(),
            name: category.name,
            kind: category.kind,
        }
    }
}

/// A route handler for listing the user's categories.
pub async fn get_categories_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let categories: Vec<CategoryResponse> = get_categories(user_id, &connection)?
        .into_iter()
        .map(CategoryResponse::from)
        .collect();

    Ok(Json(json!({ "categories": categories })).into_response())
}

/// A route handler for creating a new category.
pub async fn create_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Json(data): Json<CategoryData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = create_category(user_id, &data.name, data.kind, &connection)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Category created.",
            "category": CategoryResponse::from(category),
        })),
    )
        .into_response())
}

/// A route handler for updating a category.
pub async fn update_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Path(category_id): Path<CategoryId>,
    Json(data): Json<CategoryData>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = update_category(category_id, user_id, &data.name, data.kind, &connection)?;

    Ok(Json(json!({
        "message": "Category updated.",
        "category": CategoryResponse::from(category),
    }))
    .into_response())
}

/// A route handler for deleting a category.
///
/// Responds with a 409 when transactions still reference the category.
pub async fn delete_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    Path(category_id): Path<CategoryId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_category(category_id, user_id, &connection)?;

    Ok(Json(json!({ "message": "Category deleted." })).into_response())
}

#[cfg(test)]
mod category_tests {
    use std::str::FromStr;

    use email_address::EmailAddress;
    use rusqlite::Connection;

    use crate::{
        Error, PasswordHash, initialize_db,
        user::{User, create_user},
    };

    use super::{
        CategoryKind, create_category, delete_category, get_categories, get_category,
        update_category,
    };

    fn get_test_connection() -> (Connection, User) {
        let connection = Connection::open_in_memory().unwrap();
        initialize_db(&connection).unwrap();

        let user = create_user(
            "Test User",
            &EmailAddress::from_str("foo@bar.baz").unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            &connection,
        )
        .unwrap();

        (connection, user)
    }

    #[test]
    fn create_category_succeeds() {
        let (connection, user) = get_test_connection();

        let category =
            create_category(user.id, "Groceries", CategoryKind::Expense, &connection).unwrap();

        assert!(category.id > 0);
        assert_eq!(category.user_id, user.id);
        assert_eq!(category.name, "Groceries");
        assert_eq!(category.kind, CategoryKind::Expense);
    }

    #[test]
    fn get_categories_is_sorted_and_scoped_to_user() {
        let (connection, user) = get_test_connection();
        let other_user = create_user(
            "Other User",
            &EmailAddress::from_str("other@bar.baz").unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            &connection,
        )
        .unwrap();
        let salary = create_category(user.id, "Salary", CategoryKind::Income, &connection).unwrap();
        let groceries =
            create_category(user.id, "Groceries", CategoryKind::Expense, &connection).unwrap();
        create_category(other_user.id, "Foreign", CategoryKind::Expense, &connection).unwrap();

        let categories = get_categories(user.id, &connection).unwrap();

        assert_eq!(categories, vec![groceries, salary]);
    }

    #[test]
    fn update_category_overwrites_fields() {
        let (connection, user) = get_test_connection();
        let category =
            create_category(user.id, "Groceries", CategoryKind::Expense, &connection).unwrap();

        let updated = update_category(
            category.id,
            user.id,
            "Food",
            CategoryKind::Expense,
            &connection,
        )
        .unwrap();

        assert_eq!(updated.name, "Food");
    }

    #[test]
    fn update_category_fails_for_other_users_category() {
        let (connection, user) = get_test_connection();
        let other_user = create_user(
            "Other User",
            &EmailAddress::from_str("other@bar.baz").unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            &connection,
        )
        .unwrap();
        let category =
            create_category(user.id, "Groceries", CategoryKind::Expense, &connection).unwrap();

        let result = update_category(
            category.id,
            other_user.id,
            "Food",
            CategoryKind::Expense,
            &connection,
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn delete_category_succeeds_without_transactions() {
        let (connection, user) = get_test_connection();
        let category =
            create_category(user.id, "Groceries", CategoryKind::Expense, &connection).unwrap();

        delete_category(category.id, user.id, &connection).unwrap();

        assert_eq!(
            get_category(category.id, user.id, &connection),
            Err(Error::NotFound)
        );
    }
}
