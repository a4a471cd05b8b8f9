//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to one HTTP status code:
///
/// - **Validation** (`InvalidRequest`, `Multipart`, `Workbook`): 400
/// - **Missing rows** (`NotFound`): 404
/// - **Conflicts** (`Conflict`): 409
/// - **Everything else**: 500, with the cause logged and hidden from the client
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// The String contains details about what was invalid.
    #[error("{0}")]
    InvalidRequest(String),

    /// Requested row does not exist. The String names what was looked up.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The request clashes with existing state (duplicate name, repeated import,
    /// illegal status change).
    #[error("{0}")]
    Conflict(String),

    /// Malformed multipart upload.
    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    /// Uploaded workbook could not be read.
    #[error("Unreadable workbook: {0}")]
    Workbook(String),

    /// Reading or writing stored files failed.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Excel export could not be produced.
    #[error("Export failed: {0}")]
    Export(String),

    /// A bounded operation ran past its deadline.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidRequest(msg.into())
    }

    /// Map a unique-key violation to a 409 with `msg`; pass anything else through.
    pub fn conflict_on_duplicate(err: sqlx::Error, msg: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(msg.into())
            }
            _ => AppError::Database(err),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::Multipart(_) | AppError::Workbook(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Export(_)
            | AppError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Convert AppError into an HTTP response.
///
/// All errors return JSON in this format:
/// ```json
/// { "error": "Human-readable error message" }
/// ```
///
/// Server-side failures are logged with their cause and answered with a
/// generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            if matches!(self, AppError::Timeout(_)) {
                self.to_string()
            } else {
                "An internal error occurred".to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_errors_are_400_with_their_message() {
        let response = AppError::invalid("from must not be after to").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "from must not be after to" })
        );
    }

    #[tokio::test]
    async fn not_found_names_the_resource() {
        let response = AppError::NotFound("Vehicle").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Vehicle not found");
    }

    #[tokio::test]
    async fn conflicts_are_409() {
        let response = AppError::Conflict("File already imported".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn database_details_are_hidden() {
        let response = AppError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "An internal error occurred"
        );
    }

    #[test]
    fn non_database_errors_pass_through_duplicate_mapping() {
        let err = AppError::conflict_on_duplicate(sqlx::Error::RowNotFound, "duplicate");
        assert!(matches!(err, AppError::Database(sqlx::Error::RowNotFound)));
    }
}
