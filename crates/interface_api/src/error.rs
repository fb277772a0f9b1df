//! API error handling
//!
//! Every failure is answered with `{"success": false, "error": {kind, message}}`.
//! Rejections (a document in the wrong state, an unsupported type, a malformed
//! body) are 400s; everything else is a 500.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use domain_posting::PostingError;

use crate::dto::{ErrorBody, ErrorResponse};

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Posting(#[from] PostingError),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Posting(e) if e.is_rejection() => StatusCode::BAD_REQUEST,
            ApiError::Posting(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::Posting(e) => e.kind(),
            ApiError::Unavailable(_) => "unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                kind: self.kind().to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::PortError;

    #[test]
    fn test_rejections_are_bad_requests() {
        let error = ApiError::from(PostingError::invalid_state("shipment SHP-1 is Voided"));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.kind(), "invalid_state");
    }

    #[test]
    fn test_transaction_failures_are_server_errors() {
        let error = ApiError::from(PostingError::from(PortError::internal("connection reset")));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.kind(), "transaction");
    }

    #[test]
    fn test_lookup_failures_are_server_errors() {
        let error = ApiError::from(PostingError::lookup("item cost", "ITM-1"));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.to_string().contains("item cost"));
    }
}
