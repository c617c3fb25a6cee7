use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

// Whether 500 responses carry the underlying error text. Full detail is
// always logged server-side.
static DEBUG_ERRORS: AtomicBool = AtomicBool::new(false);

pub fn set_debug(enabled: bool) {
    DEBUG_ERRORS.store(enabled, Ordering::Relaxed);
}

fn debug_enabled() -> bool {
    DEBUG_ERRORS.load(Ordering::Relaxed)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("payment for the slot's month is required before booking")]
    PaymentRequired,
    #[error("payment overdue: bookings for this month are blocked until the debt is settled")]
    PaymentOverdue,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Store(StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmailTaken => ApiError::Conflict("email already exists".to_string()),
            other => ApiError::Store(other),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::PaymentRequired | ApiError::PaymentOverdue => {
                StatusCode::FORBIDDEN
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Store(e) => {
                error!("storage failure: {e}");
                if debug_enabled() {
                    self.to_string()
                } else {
                    "internal server error".to_string()
                }
            }
            ApiError::Internal(detail) => {
                error!("internal error: {detail}");
                if debug_enabled() {
                    self.to_string()
                } else {
                    "internal server error".to_string()
                }
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}
