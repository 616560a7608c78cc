//! Cookie based authentication for the JSON API.
//!
//! A logged in user holds a single private (encrypted and signed) cookie
//! containing a serialized [Token]. The [auth_guard] middleware validates the
//! token on every protected route, makes the user ID available to handlers
//! via `Extension<UserID>`, and slides the cookie's expiry window forward.

mod cookie;
mod middleware;
mod token;

pub use cookie::{
    COOKIE_TOKEN, DEFAULT_COOKIE_DURATION, get_token_from_cookies, invalidate_auth_cookie,
    set_auth_cookie,
};
pub use middleware::{AuthState, auth_guard};
pub use token::Token;
