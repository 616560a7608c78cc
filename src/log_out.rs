//! The log-out route, which invalidates the auth cookie.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::PrivateCookieJar;
use serde_json::json;

use crate::auth::{AuthState, invalidate_auth_cookie};

/// A route handler that logs out the current user by invalidating the auth
/// cookie.
///
/// Logging out without being logged in is not an error; the response is the
/// same either way.
pub async fn get_log_out(State(_state): State<AuthState>, jar: PrivateCookieJar) -> Response {
    let jar = invalidate_auth_cookie(jar);

    (jar, Json(json!({ "message": "Logged out." }))).into_response()
}

#[cfg(test)]
mod log_out_tests {
    use axum::{Router, routing::get};
    use axum_extra::extract::cookie::Key;
    use axum_test::TestServer;
    use sha2::{Digest, Sha512};
    use time::{Duration, OffsetDateTime};

    use crate::{
        auth::{AuthState, COOKIE_TOKEN, DEFAULT_COOKIE_DURATION},
        endpoints,
    };

    use super::get_log_out;

    #[tokio::test]
    async fn log_out_invalidates_cookie() {
        let hash = Sha512::digest("nafstenoas");
        let state = AuthState {
            cookie_key: Key::from(&hash),
            cookie_duration: DEFAULT_COOKIE_DURATION,
        };
        let app = Router::new()
            .route(endpoints::LOG_OUT, get(get_log_out))
            .with_state(state);
        let server = TestServer::try_new(app).expect("Could not create test server.");

        let response = server.get(endpoints::LOG_OUT).await;

        response.assert_status_ok();
        let cookie = response.cookie(COOKIE_TOKEN);
        assert_eq!(cookie.value(), "deleted");
        assert_eq!(cookie.expires_datetime(), Some(OffsetDateTime::UNIX_EPOCH));
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }
}
