//! Port definitions (trait abstractions) for external collaborators.
//!
//! Adapters implement these; the engine only ever sees the traits.

pub mod event_emitter;
pub mod hooks;
pub mod scene;
pub mod synthesis;

pub use event_emitter::{ChannelEmitter, NoopEmitter, StageEventEmitter};
pub use hooks::{Hook, HookEvent, HookRegistry, builtin_hook};
pub use scene::{LoggingSceneBackend, SceneBackend, SceneError, apply_scene_command};
pub use synthesis::{AudioArtifact, SpeechSynthesizer, SynthesisError};
