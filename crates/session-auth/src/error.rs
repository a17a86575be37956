//! Error types for session authentication

/// Errors from credential storage and the auth endpoints.
///
/// `Clone` because a single refresh failure is handed to every request that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("refresh token rejected: {0}")]
    InvalidCredentials(String),

    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("login failed: {0}")]
    Login(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;
