//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde_json::json;

use crate::{
    AppState,
    auth::auth_guard,
    category::{
        create_category_endpoint, delete_category_endpoint, get_categories_endpoint,
        update_category_endpoint,
    },
    dashboard::get_dashboard_endpoint,
    endpoints,
    log_in::post_log_in,
    log_out::get_log_out,
    profile::{change_password_endpoint, get_profile_endpoint, update_profile_endpoint},
    register_user::register_user,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_transactions_endpoint,
        update_transaction_endpoint,
    },
    transfer::transfer_endpoint,
    wallet::{
        create_wallet_endpoint, delete_wallet_endpoint, get_wallets_endpoint,
        update_wallet_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::COFFEE, get(get_coffee))
        .route(endpoints::USERS, post(register_user))
        .route(endpoints::LOG_IN, post(post_log_in))
        .route(endpoints::LOG_OUT, get(get_log_out));

    let protected_routes = Router::new()
        .route(
            endpoints::WALLETS,
            get(get_wallets_endpoint).post(create_wallet_endpoint),
        )
        .route(endpoints::TRANSFER, post(transfer_endpoint))
        .route(
            endpoints::WALLET,
            put(update_wallet_endpoint).delete(delete_wallet_endpoint),
        )
        .route(
            endpoints::CATEGORIES,
            get(get_categories_endpoint).post(create_category_endpoint),
        )
        .route(
            endpoints::CATEGORY,
            put(update_category_endpoint).delete(delete_category_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            put(update_transaction_endpoint).delete(delete_transaction_endpoint),
        )
        .route(endpoints::DASHBOARD, get(get_dashboard_endpoint))
        .route(
            endpoints::PROFILE,
            get(get_profile_endpoint).put(update_profile_endpoint),
        )
        .route(endpoints::PROFILE_PASSWORD, put(change_password_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .with_state(state)
}

/// Attempt to get a cup of coffee from the server.
async fn get_coffee() -> Response {
    (
        StatusCode::IM_A_TEAPOT,
        Json(json!({ "message": "I'm a teapot" })),
    )
        .into_response()
}

/// The fallback for requests that match no route.
async fn get_404_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Not found." })),
    )
        .into_response()
}

#[cfg(test)]
mod routing_tests {
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{AppState, OverdraftPolicy, endpoints, endpoints::format_endpoint};

    use super::build_router;

    const TEST_PASSWORD: &str = "averystrongandsecurepassword";

    fn get_test_server() -> TestServer {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        let state = AppState::new(connection, "42", "Etc/UTC", OverdraftPolicy::Deny)
            .expect("Could not create app state");

        let mut server =
            TestServer::try_new(build_router(state)).expect("Could not create test server.");
        server.save_cookies();

        server
    }

    async fn register_and_log_in(server: &TestServer) {
        server
            .post(endpoints::USERS)
            .json(&json!({
                "name": "Test User",
                "email": "foo@bar.baz",
                "password": TEST_PASSWORD,
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        server
            .post(endpoints::LOG_IN)
            .json(&json!({ "email": "foo@bar.baz", "password": TEST_PASSWORD }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn protected_routes_require_authentication() {
        let server = get_test_server();

        for route in [
            endpoints::WALLETS,
            endpoints::CATEGORIES,
            endpoints::TRANSACTIONS,
            endpoints::DASHBOARD,
            endpoints::PROFILE,
        ] {
            server.get(route).await.assert_status_unauthorized();
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = get_test_server();

        server.get("/api/teapots").await.assert_status_not_found();
    }

    #[tokio::test]
    async fn coffee_is_a_teapot() {
        let server = get_test_server();

        let response = server.get(endpoints::COFFEE).await;

        assert_eq!(
            response.status_code(),
            axum::http::StatusCode::IM_A_TEAPOT
        );
    }

    /// Walks the whole API surface once: register, log in, create a wallet
    /// and category, record and rework a transaction, transfer between
    /// wallets, and read the dashboard.
    #[tokio::test]
    async fn full_user_journey() {
        let server = get_test_server();
        register_and_log_in(&server).await;

        // Two wallets to transfer between.
        let response = server
            .post(endpoints::WALLETS)
            .json(&json!({ "name": "Bank", "kind": "bank", "balance": 100000.0 }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        let bank_id: i64 = body["wallet"]["id"].as_str().unwrap().parse().unwrap();

        let response = server
            .post(endpoints::WALLETS)
            .json(&json!({ "name": "Cash", "kind": "cash" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        let cash_id: i64 = body["wallet"]["id"].as_str().unwrap().parse().unwrap();

        let response = server
            .post(endpoints::CATEGORIES)
            .json(&json!({ "name": "Groceries", "kind": "expense" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        let category_id: i64 = body["category"]["id"].as_str().unwrap().parse().unwrap();

        // Record an expense, then grow it, then delete it.
        let response = server
            .post(endpoints::TRANSACTIONS)
            .json(&json!({
                "wallet_id": bank_id,
                "category_id": category_id,
                "kind": "expense",
                "amount": 20000.0,
                "date": "2025-06-15",
                "description": "Weekly groceries",
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        let transaction_id: i64 = body["transaction_id"].as_str().unwrap().parse().unwrap();

        server
            .put(&format_endpoint(endpoints::TRANSACTION, transaction_id))
            .json(&json!({
                "wallet_id": bank_id,
                "category_id": category_id,
                "kind": "expense",
                "amount": 50000.0,
                "date": "2025-06-15",
                "description": "Weekly groceries",
            }))
            .await
            .assert_status_ok();

        server
            .delete(&format_endpoint(endpoints::TRANSACTION, transaction_id))
            .await
            .assert_status_ok();

        // Transfer 30k from the bank wallet to the cash wallet.
        let response = server
            .post(endpoints::TRANSFER)
            .json(&json!({
                "from_wallet_id": bank_id,
                "to_wallet_id": cash_id,
                "amount": 30000.0,
                "date": "2025-06-16",
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["from_wallet"]["balance"], 70000.0);
        assert_eq!(body["to_wallet"]["balance"], 30000.0);

        // Total assets must be unchanged by the round trip and the transfer.
        let response = server.get(endpoints::DASHBOARD).await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_assets"], 100000.0);
        assert_eq!(body["user_name"], "Test User");

        // The wallet with the transfer leg cannot be deleted.
        server
            .delete(&format_endpoint(endpoints::WALLET, bank_id))
            .await
            .assert_status(axum::http::StatusCode::CONFLICT);
    }
}
