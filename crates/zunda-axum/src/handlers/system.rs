//! Health and project listing.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use zunda_core::{Channel, ProjectSummary, SpeechState, list_projects};
use zunda_runtime::SchedulerState;

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ClientCounts {
    pub presentation: usize,
    pub control: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// `None` when no VOICEVOX engine is configured.
    pub voicevox: Option<bool>,
    pub obs_enabled: bool,
    pub clients: ClientCounts,
    pub timeline: SchedulerState,
    pub speech: SpeechState,
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let voicevox = match &state.voicevox {
        Some(client) => Some(client.check_connection().await),
        None => None,
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime().as_secs(),
        voicevox,
        obs_enabled: state.settings.obs.enabled,
        clients: ClientCounts {
            presentation: state.hub.client_count(Channel::Presentation),
            control: state.hub.client_count(Channel::Control),
        },
        timeline: state.scheduler.status().state,
        speech: state.coordinator.status().state,
    })
}

/// `GET /api/projects`
pub async fn projects(State(state): State<AppState>) -> Result<Json<Vec<ProjectSummary>>, HttpError> {
    Ok(Json(list_projects(&state.settings.timeline.import_dir)?))
}
