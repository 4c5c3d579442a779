//! Scene backend port (streaming software: scenes, text sources, visibility).
//!
//! Every call is best-effort. Callers log failures and carry on; a scene
//! command never stops a timeline.

use async_trait::async_trait;

use crate::domain::SceneCommand;

/// Failure of a single scene backend command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("Scene backend not connected: {0}")]
    NotConnected(String),

    #[error("Scene request '{request}' failed ({code}): {comment}")]
    Request {
        request: String,
        code: i64,
        comment: String,
    },

    #[error("Scene backend transport error: {0}")]
    Transport(String),

    #[error("Scene backend protocol error: {0}")]
    Protocol(String),
}

/// Commands understood by the presentation surface.
#[async_trait]
pub trait SceneBackend: Send + Sync {
    async fn switch_scene(&self, scene_name: &str) -> Result<(), SceneError>;

    async fn update_text_source(&self, source_name: &str, text: &str) -> Result<(), SceneError>;

    async fn set_visibility(&self, source_name: &str, visible: bool) -> Result<(), SceneError>;
}

/// Dispatch a timeline scene command to the matching backend call.
pub async fn apply_scene_command(
    backend: &dyn SceneBackend,
    command: &SceneCommand,
) -> Result<(), SceneError> {
    match command {
        SceneCommand::SwitchScene { scene_name } => backend.switch_scene(scene_name).await,
        SceneCommand::UpdateText { source_name, text } => {
            backend.update_text_source(source_name, text).await
        }
        SceneCommand::SetSourceVisibility {
            source_name,
            visible,
        } => backend.set_visibility(source_name, *visible).await,
    }
}

/// Backend used when no streaming software is configured: logs and succeeds.
#[derive(Debug, Clone, Default)]
pub struct LoggingSceneBackend;

#[async_trait]
impl SceneBackend for LoggingSceneBackend {
    async fn switch_scene(&self, scene_name: &str) -> Result<(), SceneError> {
        tracing::info!(scene = scene_name, "Scene switch (no scene backend)");
        Ok(())
    }

    async fn update_text_source(&self, source_name: &str, text: &str) -> Result<(), SceneError> {
        tracing::info!(source = source_name, text, "Text update (no scene backend)");
        Ok(())
    }

    async fn set_visibility(&self, source_name: &str, visible: bool) -> Result<(), SceneError> {
        tracing::info!(source = source_name, visible, "Visibility (no scene backend)");
        Ok(())
    }
}
