//! HTTP error responses.
//!
//! Every failure is answered with `{"error": "<message>"}`. Internal
//! problems are logged here and reported with a generic message only.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use qrdrop_blobstore::StoreError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Invalid key")]
    Forbidden,

    #[error("File too large. Maximum size: {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    /// Maps a store failure. `action` is the generic message used when the
    /// failure is on our side ("Upload failed", "Download failed", ...).
    pub fn from_store(err: StoreError, action: &'static str) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound("File not found"),
            StoreError::MissingPayload(id) => {
                error!(id = %id, "index row has no payload");
                Self::NotFound("File not found on disk")
            }
            StoreError::Forbidden(_) => Self::Forbidden,
            other => {
                error!(error = %other, "{action}");
                Self::Internal(action)
            }
        }
    }

    /// For `web::block` failures (worker pool gone or panicked).
    pub fn blocking(err: actix_web::error::BlockingError, action: &'static str) -> Self {
        error!(error = %err, "{action}");
        Self::Internal(action)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}
