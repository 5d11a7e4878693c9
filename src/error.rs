use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of everything that can go wrong in the session layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Unauthenticated,
    /// Transport-level failure; the caller may retry.
    Unavailable,
    /// A payload (push frame or gateway body) could not be decoded.
    Malformed,
    Internal,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Malformed => "malformed",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Error returned by every fallible operation in this crate.
///
/// The value is cheap to clone so a single failed fetch can be handed to every
/// caller that was waiting on it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}: {message}", code.as_str())]
pub struct DomofonError {
    pub code: ErrorCode,
    pub message: String,
}

impl DomofonError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true when retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.code == ErrorCode::Unavailable
    }
}

pub type SessionResult<T> = Result<T, DomofonError>;

pub(crate) fn invalid_argument(message: impl Into<String>) -> DomofonError {
    DomofonError::new(ErrorCode::InvalidInput, message)
}

pub(crate) fn not_found(message: impl Into<String>) -> DomofonError {
    DomofonError::new(ErrorCode::NotFound, message)
}

pub(crate) fn unauthenticated(message: impl Into<String>) -> DomofonError {
    DomofonError::new(ErrorCode::Unauthenticated, message)
}

pub(crate) fn unavailable(message: impl Into<String>) -> DomofonError {
    DomofonError::new(ErrorCode::Unavailable, message)
}

pub(crate) fn malformed(message: impl Into<String>) -> DomofonError {
    DomofonError::new(ErrorCode::Malformed, message)
}

pub(crate) fn serde_error(err: serde_json::Error) -> DomofonError {
    malformed(err.to_string())
}

#[cfg(feature = "http")]
pub(crate) fn http_error(err: reqwest::Error) -> DomofonError {
    if err.is_decode() {
        malformed(err.to_string())
    } else {
        unavailable(err.to_string())
    }
}

#[cfg(feature = "ws")]
pub(crate) fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> DomofonError {
    unavailable(err.to_string())
}
