//! Failures surfaced to callers of `ApiClient`

use request_envelope::EnvelopeError;

/// A recovered first-attempt 401 never shows up here; every other failure does.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Non-2xx answer other than 401. The backend body is passed through.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// 401 on an attempt that was already replayed after a refresh.
    #[error("unauthorized after token refresh: {body}")]
    Unauthorized { body: String },

    /// The refresh this request waited on failed; the session has ended.
    #[error("session expired: {0}")]
    SessionExpired(session_auth::Error),

    /// The login endpoint refused or garbled the exchange.
    #[error("login failed: {0}")]
    Login(session_auth::Error),

    /// No response was received. Safe for the caller to retry.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl Error {
    /// Status code of the backend answer, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    /// Whether this failure ended the session.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Error::Unauthorized { .. } | Error::SessionExpired(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
