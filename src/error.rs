use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::repository::RepositoryError;

/// Message returned for any storage-level integrity failure on create.
pub const CREATE_FAILED_MESSAGE: &str = "An error occurred while adding the advertisement";

/// AppError
///
/// Every failure a handler can report. Rendered as
/// `{"error": <message>, "status": <code>}`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized { realm: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("advertisement {0} not found")]
    NotFound(i64),

    // Caller is not the creator. Rendered exactly like `NotFound`.
    #[error("advertisement {0} is owned by another user")]
    Forbidden(i64),

    #[error("no advertisements")]
    EmptyListing,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => AppError::NotFound(id),
            RepositoryError::Validation(msg) => AppError::Validation(msg),
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            RepositoryError::Storage(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::BadRequest(format!("invalid JSON body: {e}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut challenge = None;
        let (status, message) = match self {
            AppError::Unauthorized { realm } => {
                tracing::warn!("rejected request without valid credentials");
                challenge = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")).ok();
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::NotFound(id) => {
                tracing::warn!("Not found: advertisement {}", id);
                (StatusCode::NOT_FOUND, not_found_message(id))
            }
            AppError::Forbidden(id) => {
                tracing::warn!("Ownership check failed for advertisement {}", id);
                (StatusCode::NOT_FOUND, not_found_message(id))
            }
            AppError::EmptyListing => (StatusCode::NOT_FOUND, "No advertisements".to_string()),
            AppError::Validation(msg) => {
                tracing::warn!("Validation error: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            AppError::Conflict(detail) => {
                // Storage detail stays in the log.
                tracing::error!("Integrity violation on create: {}", detail);
                (StatusCode::CONFLICT, CREATE_FAILED_MESSAGE.to_string())
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        if let Some(value) = challenge {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

fn not_found_message(id: i64) -> String {
    format!("Advertisement #{id} not found")
}
