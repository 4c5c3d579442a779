#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

// Used only by integration tests
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;
#[cfg(test)]
use tokio_tungstenite as _;
#[cfg(test)]
use tower as _;

pub mod bootstrap;
pub mod control;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod routes;
pub mod state;

pub use bootstrap::{
    CorsConfig, ServerConfig, StageContext, bootstrap, build_scene_backend, build_synthesizer, serve,
    start_server,
};
pub use error::HttpError;
pub use hub::{BroadcastError, ClientId, ConnectionHub};
pub use routes::{create_router, create_spa_router};
pub use state::AppState;
