//! Error types for Shelfmark server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes returned alongside the HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    NotAuthorized = 3,
    DbFailure = 4,
    NotFound = 5,
    BadValue = 6,
    Conflict = 7,
    InvalidState = 8,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not valid for the current lifecycle state of a record
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) => ErrorCode::NotAuthenticated,
            AppError::Authorization(_) => ErrorCode::NotAuthorized,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::InvalidState(_) => ErrorCode::InvalidState,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("Invalid value for {}", field),
                })
            })
            .collect::<Vec<_>>()
            .join("; ");
        AppError::Validation(message)
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidState(msg) => msg.clone(),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidState("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Authentication("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Authorization("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
