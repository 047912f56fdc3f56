//! Error handling module for the image push client

use crate::reference::ParseError;
use reqwest::header::InvalidHeaderValue;
use thiserror::Error;

/// Boxed error returned by privilege functions and transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PushError {
    /// The image identifier could not be normalized.
    #[error(transparent)]
    InvalidReference(#[from] ParseError),

    #[error("cannot push a digest reference")]
    DigestReference,

    /// The privilege function failed to produce new credentials.
    #[error(transparent)]
    Privilege(BoxError),

    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("registry auth is not a valid header value: {0}")]
    InvalidAuthHeader(#[from] InvalidHeaderValue),

    /// An error message reported inside the push progress stream.
    #[error("{message}")]
    Remote { code: i64, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PushError {
    /// True for errors raised by the push context rather than the remote side.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PushError::Cancelled | PushError::DeadlineExceeded)
    }

    /// Process exit status for a failed push: 130 when interrupted, 124
    /// when the deadline passed, 1 otherwise.
    pub fn exit_status(&self) -> u8 {
        match self {
            PushError::Cancelled => 130,
            PushError::DeadlineExceeded => 124,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        PushError::Transport(Box::new(err))
    }
}

impl From<url::ParseError> for PushError {
    fn from(err: url::ParseError) -> Self {
        PushError::Config(err.to_string())
    }
}

/// Failure while serializing trace context into a header carrier.
///
/// Never returned from a push; injection is best effort.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("invalid header name {0:?}")]
    InvalidName(String),

    #[error("invalid value for header {0:?}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, PushError>;
