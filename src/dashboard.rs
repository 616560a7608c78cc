//! Dashboard statistics for the landing view.
//!
//! This is a pure read-side aggregation over already-consistent data: total
//! assets across active wallets, income and expense sums for the current
//! calendar month, the savings rate, and the five most recent transactions.
//! Reading it twice without intervening mutations yields identical results.

use std::{
    ops::RangeInclusive,
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::Serialize;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::{
    AppState, Error,
    timezone::get_local_offset,
    transaction::{TransactionResponse, get_transaction_listings},
    user::{UserID, get_user_by_id},
    wallet::get_total_assets,
};

/// How many transactions the dashboard's recent activity list holds.
const RECENT_TRANSACTION_COUNT: u64 = 5;

/// The state needed for computing the dashboard statistics.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The database connection for reading wallets and transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// The dashboard statistics as serialized in the API response.
#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    /// The display name of the user, for the greeting.
    pub user_name: String,
    /// The name of the current month, e.g. "June".
    pub month_name: String,
    /// The sum of the balances of the user's active wallets.
    pub total_assets: f64,
    /// The sum of income transactions in the current month.
    pub monthly_income: f64,
    /// The sum of expense transactions in the current month.
    pub monthly_expense: f64,
    /// `(monthly income - monthly expense) / monthly income` as a rounded
    /// percentage, or zero when there is no income.
    pub savings_rate: i64,
    /// The five most recent transactions, newest first.
    pub recent_transactions: Vec<TransactionResponse>,
}

/// Gets the date range for the monthly sums (first of the month to today).
fn current_month_range(local_timezone: UtcOffset) -> Result<RangeInclusive<Date>, Error> {
    let today = OffsetDateTime::now_utc().to_offset(local_timezone).date();
    let month_start = today
        .replace_day(1)
        .map_err(|error| Error::DateError(error.to_string()))?;

    Ok(month_start..=today)
}

/// Sum the user's income and expense transactions within `date_range`
/// (inclusive).
///
/// Returns `(income, expense)`, both as non-negative sums.
///
/// # Errors
/// Returns an [Error::SqlError] if an SQL related error occurred.
pub fn get_monthly_totals(
    user_id: UserID,
    date_range: RangeInclusive<Date>,
    connection: &Connection,
) -> Result<(f64, f64), Error> {
    let totals = connection.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN kind = 'income' THEN amount ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount ELSE 0 END), 0)
         FROM txn
         WHERE user_id = :user_id AND date BETWEEN :start AND :end",
        rusqlite::named_params! {
            ":user_id": user_id.as_i64(),
            ":start": date_range.start(),
            ":end": date_range.end(),
        },
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(totals)
}

/// Compute the savings rate as a rounded percentage.
///
/// Zero income yields a zero rate rather than a division by zero; spending
/// more than the income yields a negative rate.
fn savings_rate(monthly_income: f64, monthly_expense: f64) -> i64 {
    if monthly_income <= 0.0 {
        return 0;
    }

    ((monthly_income - monthly_expense) / monthly_income * 100.0).round() as i64
}

/// Build the full dashboard summary for `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidTimezoneError] if `local_timezone_name` is not a canonical timezone,
/// - [Error::NotFound] if `user_id` does not belong to a registered user,
/// - [Error::SqlError] if an SQL related error occurred.
pub fn build_dashboard_summary(
    user_id: UserID,
    local_timezone_name: &str,
    connection: &Connection,
) -> Result<DashboardSummary, Error> {
    let local_timezone = get_local_offset(local_timezone_name).ok_or_else(|| {
        tracing::error!("Invalid timezone {}", local_timezone_name);
        Error::InvalidTimezoneError(local_timezone_name.to_owned())
    })?;

    let user = get_user_by_id(user_id, connection)?;
    let total_assets = get_total_assets(user_id, connection)?;

    let date_range = current_month_range(local_timezone)?;
    let month_name = date_range.end().month().to_string();
    let (monthly_income, monthly_expense) = get_monthly_totals(user_id, date_range, connection)?;

    let recent_transactions =
        get_transaction_listings(user_id, Some(RECENT_TRANSACTION_COUNT), connection)?
            .into_iter()
            .map(TransactionResponse::from)
            .collect();

    Ok(DashboardSummary {
        user_name: user.name,
        month_name,
        total_assets,
        monthly_income,
        monthly_expense,
        savings_rate: savings_rate(monthly_income, monthly_expense),
        recent_transactions,
    })
}

/// A route handler returning the dashboard statistics for the logged in user.
pub async fn get_dashboard_endpoint(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let summary = build_dashboard_summary(user_id, &state.local_timezone, &connection)?;

    Ok(Json(summary).into_response())
}

#[cfg(test)]
mod savings_rate_tests {
    use super::savings_rate;

    #[test]
    fn rate_is_zero_without_income() {
        assert_eq!(savings_rate(0.0, 500.0), 0);
    }

    #[test]
    fn rate_is_rounded_percentage() {
        assert_eq!(savings_rate(3_000.0, 2_000.0), 33);
        assert_eq!(savings_rate(3_000.0, 1_000.0), 67);
        assert_eq!(savings_rate(1_000.0, 0.0), 100);
    }

    #[test]
    fn rate_is_negative_when_spending_exceeds_income() {
        assert_eq!(savings_rate(1_000.0, 1_500.0), -50);
    }
}
