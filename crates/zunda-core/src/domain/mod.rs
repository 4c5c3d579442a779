//! Domain types for timelines, characters, and speech.

pub mod character;
pub mod project;
pub mod speech;
pub mod timeline;

pub use character::{Character, UnknownCharacter, VoiceTable};
pub use project::{
    PROJECTS_DIR, ProjectError, ProjectSummary, SCENE_TIMELINE_FILE, SPEECH_TIMELINE_FILE,
    latest_project, list_projects, load_project,
};
pub use speech::{SpeechOutcome, SpeechPriority, SpeechRequest, SpeechState};
pub use timeline::{
    Action, ActionKind, OverlayText, RunStatus, SceneCommand, SpeechAction, Timeline,
    TimelineDocument, TimelineError, sort_actions,
};
