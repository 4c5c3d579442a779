#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod events;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    Action, ActionKind, Character, OverlayText, ProjectError, ProjectSummary, RunStatus,
    SceneCommand, SpeechAction, SpeechOutcome, SpeechPriority, SpeechRequest, SpeechState,
    Timeline, TimelineDocument, TimelineError, VoiceTable, latest_project, list_projects,
    load_project,
};
pub use events::{Channel, ControlCommand, ControlEvent, PresentationEvent, StageEvent};
pub use ports::{
    AudioArtifact, ChannelEmitter, HookEvent, HookRegistry, LoggingSceneBackend, NoopEmitter,
    SceneBackend, SceneError, SpeechSynthesizer, StageEventEmitter, SynthesisError,
};
pub use settings::{
    DEFAULT_HTTP_PORT, PlaybackMode, Settings, SettingsError, default_config_path,
    validate_settings,
};
