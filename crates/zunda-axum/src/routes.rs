//! Route definitions and router construction.
//!
//! Websocket channels live at `/ws/presentation` and `/ws/control`; the
//! HTTP API is nested under `/api`.

use std::path::Path;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::bootstrap::CorsConfig;
use crate::handlers;
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            use axum::http::HeaderValue;
            let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// API routes without the `/api` prefix.
pub(crate) fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::system::health))
        .route("/projects", get(handlers::system::projects))
        // Timeline
        .route("/timeline/load", post(handlers::timeline::load))
        .route("/timeline/run", post(handlers::timeline::run))
        .route("/timeline/pause", post(handlers::timeline::pause))
        .route("/timeline/resume", post(handlers::timeline::resume))
        .route("/timeline/stop", post(handlers::timeline::stop))
        .route("/timeline/status", get(handlers::timeline::status))
        // Speech and comments
        .route("/speak", post(handlers::speech::speak))
        .route("/comments", post(handlers::speech::comment))
        .route("/speech/status", get(handlers::speech::status))
        .route("/speech/cancel", post(handlers::speech::cancel))
}

/// Websocket routes for the two client channels.
pub(crate) fn ws_routes() -> Router<AppState> {
    Router::new()
        .route("/ws/presentation", get(handlers::ws::presentation))
        .route("/ws/control", get(handlers::ws::control))
}

/// Router with the API and websocket channels only.
pub fn create_router(state: AppState, cors_config: &CorsConfig) -> Router {
    let cors = build_cors_layer(cors_config);

    Router::new()
        .merge(ws_routes())
        .nest("/api", api_routes().layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router that also serves the presentation page from `static_dir`.
///
/// Unknown paths outside `/api` and `/ws` fall back to `index.html`.
pub fn create_spa_router<P: AsRef<Path>>(
    state: AppState,
    static_dir: P,
    cors_config: &CorsConfig,
) -> Router {
    let static_path = static_dir.as_ref();
    let index_path = static_path.join("index.html");
    let serve_dir = ServeDir::new(static_path).fallback(ServeFile::new(index_path));

    create_router(state, cors_config).fallback_service(serve_dir)
}
