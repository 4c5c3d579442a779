//! Timeline control endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use zunda_core::{Timeline, TimelineError, latest_project, load_project};
use zunda_runtime::{SchedulerState, TimelineStatus};

use crate::error::HttpError;
use crate::state::AppState;

/// Body of `POST /api/timeline/load`. Exactly one source must be given.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoadTimelineRequest {
    /// Project directory name under `<import_dir>/timeline_projects`.
    pub project: Option<String>,
    /// Load the most recently modified project.
    pub latest: bool,
    /// Inline timeline: a document object or a bare entry array.
    pub timeline: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct LoadTimelineResponse {
    pub total: usize,
    pub project: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    /// Whether the call changed anything.
    pub changed: bool,
    pub status: TimelineStatus,
}

/// `POST /api/timeline/load`
pub async fn load(
    State(state): State<AppState>,
    Json(req): Json<LoadTimelineRequest>,
) -> Result<Json<LoadTimelineResponse>, HttpError> {
    let import_dir = &state.settings.timeline.import_dir;
    let (timeline, project) = match (req.project, req.latest, req.timeline) {
        (Some(name), false, None) => (load_project(import_dir, &name)?, Some(name)),
        (None, true, None) => {
            let latest = latest_project(import_dir)?;
            (load_project(import_dir, &latest.name)?, Some(latest.name))
        }
        (None, false, Some(inline)) => (Timeline::from_json_value(inline)?, None),
        _ => {
            return Err(HttpError::BadRequest(
                "Give exactly one of 'project', 'latest' or 'timeline'".to_string(),
            ));
        }
    };

    let total = timeline.len();
    let title = timeline.overlay().title.clone();
    state.scheduler.load_named(timeline, project.clone())?;
    Ok(Json(LoadTimelineResponse {
        total,
        project,
        title,
    }))
}

/// `POST /api/timeline/run`
///
/// Starts the loaded timeline in the background and answers `202`.
pub async fn run(State(state): State<AppState>) -> Result<(StatusCode, Json<TimelineStatus>), HttpError> {
    let status = state.scheduler.status();
    match status.state {
        SchedulerState::Idle => return Err(TimelineError::NotLoaded.into()),
        SchedulerState::Running | SchedulerState::Paused => {
            return Err(TimelineError::AlreadyRunning.into());
        }
        SchedulerState::Loaded => {}
    }

    let scheduler = Arc::clone(&state.scheduler);
    tokio::spawn(async move {
        match scheduler.run().await {
            Ok(summary) => info!(?summary, "Timeline run finished"),
            Err(e) => warn!(error = %e, "Timeline run did not start"),
        }
    });
    Ok((StatusCode::ACCEPTED, Json(status)))
}

/// `POST /api/timeline/pause`
pub async fn pause(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.scheduler.pause();
    respond(&state, changed)
}

/// `POST /api/timeline/resume`
pub async fn resume(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.scheduler.resume();
    respond(&state, changed)
}

/// `POST /api/timeline/stop`
pub async fn stop(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.scheduler.stop();
    respond(&state, changed)
}

/// `GET /api/timeline/status`
pub async fn status(State(state): State<AppState>) -> Json<TimelineStatus> {
    Json(state.scheduler.status())
}

fn respond(state: &AppState, changed: bool) -> Json<ControlResponse> {
    Json(ControlResponse {
        changed,
        status: state.scheduler.status(),
    })
}
