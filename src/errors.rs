//! Application error type — every handler returns `AppResult<T>`.
//!
//! Errors render as `{ "status": "error", "message": ... }`. Internal errors are
//! logged and replaced with a generic message so nothing from the store leaks
//! to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sqlx::error::ErrorKind;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Not found")]
    NotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Constraint violations the store reports on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreViolation {
    Unique,
    ForeignKey,
    Check,
}

impl StoreViolation {
    pub fn of(err: &sqlx::Error) -> Option<Self> {
        let sqlx::Error::Database(db_err) = err else {
            return None;
        };
        match db_err.kind() {
            ErrorKind::UniqueViolation     => Some(Self::Unique),
            ErrorKind::ForeignKeyViolation => Some(Self::ForeignKey),
            ErrorKind::CheckViolation      => Some(Self::Check),
            _                              => None,
        }
    }
}

impl AppError {
    /// Re-map a failed write: constraint violations become client errors via
    /// `classify`, anything else stays internal.
    pub fn from_store(
        err: sqlx::Error,
        classify: impl FnOnce(StoreViolation) -> AppError,
    ) -> Self {
        match StoreViolation::of(&err) {
            Some(violation) => classify(violation),
            None            => AppError::from(err),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_)   => StatusCode::CONFLICT,
            AppError::NotFound      => StatusCode::NOT_FOUND,
            AppError::Unauthorized  => StatusCode::UNAUTHORIZED,
            AppError::Internal(_)   => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other                    => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(format!("Invalid input: {errors}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "Internal server error");
                "Internal server error".to_owned()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(serde_json::json!({ "status": "error", "message": message })),
        )
            .into_response()
    }
}
