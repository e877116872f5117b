//! Exchange error types.

use qrdrop_blobstore::StoreError;
use thiserror::Error;

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Why a scanned or typed code could not be turned into a token.
///
/// Every variant displays with an "invalid code" prefix, which is what the
/// user is shown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid code: not a valid token ({0})")]
    Malformed(String),

    #[error("invalid code: missing `{0}`")]
    MissingField(&'static str),

    #[error("invalid code: `{0}` is not valid")]
    InvalidField(&'static str),
}

/// Errors that can occur while exchanging a file.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Parse(#[from] TokenError),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid key for file {0}")]
    Forbidden(String),

    #[error("file could not be decrypted: {0}")]
    Decryption(String),

    #[error("storage unavailable: {0}")]
    Io(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("capture cancelled")]
    Cancelled,

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl ExchangeError {
    /// Short message suitable for showing next to a failed retrieval.
    pub fn user_message(&self) -> String {
        match self {
            Self::Parse(e) => e.to_string(),
            Self::NotFound(_) => "File not found. It may have been deleted or expired.".into(),
            Self::Forbidden(_) => "Invalid decryption key.".into(),
            Self::Decryption(_) => "The file could not be decrypted.".into(),
            Self::Io(_) | Self::Http(_) => "Could not reach storage. Please try again.".into(),
            Self::Api { message, .. } => message.clone(),
            Self::InvalidTransition { .. } => self.to_string(),
            Self::Cancelled => "Scan cancelled.".into(),
            Self::DeviceUnavailable(_) => {
                "Camera not available. Please grant camera permission.".into()
            }
        }
    }
}

impl From<StoreError> for ExchangeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) | StoreError::MissingPayload(id) => Self::NotFound(id),
            StoreError::Forbidden(id) => Self::Forbidden(id),
            StoreError::Decryption(e) => Self::Decryption(e.to_string()),
            other => Self::Io(other.to_string()),
        }
    }
}
