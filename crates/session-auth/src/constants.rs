//! Backend auth endpoint paths, relative to the API base URL.

/// Mints a new access token from `{ "token": <refresh token> }`.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Exchanges `{ "email", "password" }` for an access/refresh token pair.
pub const LOGIN_PATH: &str = "/auth/login";

/// Join a base URL and an absolute path without doubling the slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
