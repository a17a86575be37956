//! Errors raised while building a request envelope

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("failed to encode request body: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;
