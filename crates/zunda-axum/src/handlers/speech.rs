//! Ad-hoc speech and comment endpoints.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use zunda_core::{SpeechOutcome, SpeechRequest};
use zunda_runtime::{Comment, CommentReport};
use zunda_voice::SpeechStatus;

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// `POST /api/speak`
///
/// Waits for the line to finish and reports how it ended.
pub async fn speak(
    State(state): State<AppState>,
    Json(req): Json<SpeechRequest>,
) -> Result<Json<SpeechOutcome>, HttpError> {
    if req.text.trim().is_empty() {
        return Err(HttpError::BadRequest("'text' must not be empty".to_string()));
    }
    Ok(Json(state.coordinator.speak(req).await))
}

/// `POST /api/comments`
///
/// Runs the full comment interrupt and returns its report.
pub async fn comment(State(state): State<AppState>, Json(comment): Json<Comment>) -> Json<CommentReport> {
    Json(state.comments.on_comment(comment).await)
}

/// `GET /api/speech/status`
pub async fn status(State(state): State<AppState>) -> Json<SpeechStatus> {
    Json(state.coordinator.status())
}

/// `POST /api/speech/cancel`
pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.coordinator.cancel_active(),
    })
}
