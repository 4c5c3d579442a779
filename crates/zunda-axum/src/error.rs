//! HTTP error type and mappings from domain errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use zunda_core::{ProjectError, TimelineError};

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with what is running (e.g. a second run).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<TimelineError> for HttpError {
    fn from(err: TimelineError) -> Self {
        match err {
            TimelineError::NotLoaded => Self::NotFound(err.to_string()),
            TimelineError::AlreadyRunning => Self::Conflict(err.to_string()),
            TimelineError::Io(e) => Self::Internal(format!("Timeline I/O: {e}")),
            invalid @ (TimelineError::Empty
            | TimelineError::Invalid { .. }
            | TimelineError::Parse(_)) => Self::BadRequest(invalid.to_string()),
        }
    }
}

impl From<ProjectError> for HttpError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::InvalidName(_) => Self::BadRequest(err.to_string()),
            ProjectError::NotFound(_) | ProjectError::NoProjects(_) => {
                Self::NotFound(err.to_string())
            }
            ProjectError::Io(e) => Self::Internal(format!("Project I/O: {e}")),
            ProjectError::Timeline(e) => e.into(),
        }
    }
}
