//! Timeline domain types: actions, scene commands, documents.
//!
//! A timeline is a list of time-stamped [`Action`]s. On disk it is described
//! by one speech document (`timeline.json`) and an optional scene document
//! (`obs_timeline.json`). Both use the same entry shape:
//!
//! ```json
//! { "time": 1.5, "type": "zundamon", "character": "metan", "text": "..." }
//! { "time": 3.0, "type": "obs", "action": "switch_scene", "scene_name": "Outro" }
//! ```
//!
//! Entries in a speech document default to `"zundamon"`, entries in a scene
//! document default to `"obs"`. Actions are sorted by `time`; at equal times
//! speech runs before scene commands, and otherwise input order is kept.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::character::Character;

/// Entry type tag for speech entries.
pub const SPEECH_ENTRY_TYPE: &str = "zundamon";

/// Entry type tag for scene entries.
pub const SCENE_ENTRY_TYPE: &str = "obs";

/// Errors raised while building or driving a timeline.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// The action list is empty.
    #[error("Timeline has no actions")]
    Empty,

    /// One entry could not be turned into an action.
    #[error("Invalid timeline entry #{index}: {reason}")]
    Invalid { index: usize, reason: String },

    /// `run()` was called with nothing loaded.
    #[error("No timeline loaded")]
    NotLoaded,

    /// `load()` or `run()` was called while a run is in progress.
    #[error("Timeline is already running")]
    AlreadyRunning,

    /// Reading a timeline file failed.
    #[error("Failed to read timeline: {0}")]
    Io(#[from] std::io::Error),

    /// The timeline file is not valid JSON.
    #[error("Failed to parse timeline JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl TimelineError {
    /// Whether this error means the action list itself is unusable.
    pub const fn is_invalid_timeline(&self) -> bool {
        matches!(self, Self::Empty | Self::Invalid { .. } | Self::Parse(_))
    }
}

/// A command for the scene backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SceneCommand {
    SwitchScene {
        scene_name: String,
    },
    UpdateText {
        source_name: String,
        text: String,
    },
    SetSourceVisibility {
        source_name: String,
        visible: bool,
    },
}

impl SceneCommand {
    /// Short human-readable label for logs and status snapshots.
    pub fn describe(&self) -> String {
        match self {
            Self::SwitchScene { scene_name } => format!("switch_scene({scene_name})"),
            Self::UpdateText { source_name, .. } => format!("update_text({source_name})"),
            Self::SetSourceVisibility {
                source_name,
                visible,
            } => format!("set_source_visibility({source_name}, {visible})"),
        }
    }
}

/// A line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechAction {
    pub character: Character,
    pub text: String,
}

/// What an action does when it comes due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    Speech(SpeechAction),
    Scene(SceneCommand),
}

/// A single time-stamped timeline action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Offset from timeline start, in seconds.
    pub time: f64,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn speech(time: f64, character: Character, text: impl Into<String>) -> Self {
        Self {
            time,
            kind: ActionKind::Speech(SpeechAction {
                character,
                text: text.into(),
            }),
        }
    }

    pub const fn scene(time: f64, command: SceneCommand) -> Self {
        Self {
            time,
            kind: ActionKind::Scene(command),
        }
    }

    pub const fn is_speech(&self) -> bool {
        matches!(self.kind, ActionKind::Speech(_))
    }

    /// Short label used for `current_action` in status snapshots.
    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::Speech(speech) => {
                let preview: String = speech.text.chars().take(24).collect();
                format!("{}@{:.1}s: {preview}", speech.character, self.time)
            }
            ActionKind::Scene(command) => format!("obs@{:.1}s: {}", self.time, command.describe()),
        }
    }
}

/// Stable sort by `time`, speech before scene on equal times. Input order
/// is kept among actions of the same kind at the same time.
pub fn sort_actions(actions: &mut [Action]) {
    actions.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then_with(|| b.is_speech().cmp(&a.is_speech()))
    });
}

/// Overlay texts pushed to the scene backend when a run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayText {
    pub title: Option<String>,
    pub listener_name: Option<String>,
    pub nickname: Option<String>,
    pub other_text: Option<String>,
}

impl OverlayText {
    /// Non-empty `(text source, text)` pairs.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("title_text", &self.title),
            ("listener_text", &self.listener_name),
            ("nickname_text", &self.nickname),
            ("other_text", &self.other_text),
        ]
        .into_iter()
        .filter_map(|(source, text)| {
            text.as_deref()
                .filter(|t| !t.trim().is_empty())
                .map(|t| (source, t))
        })
        .collect()
    }
}

/// A timeline file as written by the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineDocument {
    pub title: Option<String>,
    pub listener_name: Option<String>,
    pub nickname: Option<String>,
    pub other_text: Option<String>,
    pub timeline: Vec<Value>,
}

impl TimelineDocument {
    fn overlay(&self) -> OverlayText {
        OverlayText {
            title: self.title.clone(),
            listener_name: self.listener_name.clone(),
            nickname: self.nickname.clone(),
            other_text: self.other_text.clone(),
        }
    }
}

/// A validated, time-ordered action list plus its overlay texts.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    actions: Vec<Action>,
    overlay: OverlayText,
}

impl Timeline {
    /// Build a timeline from actions in any order.
    pub fn from_actions(mut actions: Vec<Action>) -> Result<Self, TimelineError> {
        if actions.is_empty() {
            return Err(TimelineError::Empty);
        }
        for (index, action) in actions.iter().enumerate() {
            check_time(index, action.time)?;
        }
        sort_actions(&mut actions);
        Ok(Self {
            actions,
            overlay: OverlayText::default(),
        })
    }

    /// Merge a speech document and an optional scene document.
    pub fn from_documents(
        speech: &TimelineDocument,
        scene: Option<&TimelineDocument>,
    ) -> Result<Self, TimelineError> {
        let mut actions = parse_entries(&speech.timeline, SPEECH_ENTRY_TYPE, 0)?;
        if let Some(scene) = scene {
            actions.extend(parse_entries(
                &scene.timeline,
                SCENE_ENTRY_TYPE,
                speech.timeline.len(),
            )?);
        }
        let mut timeline = Self::from_actions(actions)?;
        timeline.overlay = speech.overlay();
        Ok(timeline)
    }

    /// Parse JSON that is either a timeline document or a bare entry array.
    pub fn from_json_str(json: &str) -> Result<Self, TimelineError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<Self, TimelineError> {
        let document = match value {
            Value::Array(entries) => TimelineDocument {
                timeline: entries,
                ..TimelineDocument::default()
            },
            other => serde_json::from_value(other)?,
        };
        Self::from_documents(&document, None)
    }

    /// Read a single timeline file.
    pub fn from_path(path: &Path) -> Result<Self, TimelineError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub const fn overlay(&self) -> &OverlayText {
        &self.overlay
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Action>, OverlayText) {
        (self.actions, self.overlay)
    }
}

/// Offsets must be representable as a [`Duration`](std::time::Duration).
fn check_time(index: usize, time: f64) -> Result<(), TimelineError> {
    match std::time::Duration::try_from_secs_f64(time) {
        Ok(_) => Ok(()),
        Err(_) => Err(invalid(
            index,
            format!("time must be a non-negative number of seconds, got {time}"),
        )),
    }
}

fn invalid(index: usize, reason: impl Into<String>) -> TimelineError {
    TimelineError::Invalid {
        index,
        reason: reason.into(),
    }
}

/// Raw entry shape shared by both document kinds.
#[derive(Debug, Deserialize)]
struct RawEntry {
    time: Option<f64>,
    #[serde(rename = "type")]
    entry_type: Option<String>,
    character: Option<String>,
    text: Option<String>,
    action: Option<String>,
    scene_name: Option<String>,
    source_name: Option<String>,
    visible: Option<bool>,
}

fn parse_entries(
    entries: &[Value],
    default_type: &str,
    index_offset: usize,
) -> Result<Vec<Action>, TimelineError> {
    entries
        .iter()
        .enumerate()
        .map(|(i, value)| parse_entry(index_offset + i, value, default_type))
        .collect()
}

fn parse_entry(index: usize, value: &Value, default_type: &str) -> Result<Action, TimelineError> {
    let raw: RawEntry =
        serde_json::from_value(value.clone()).map_err(|e| invalid(index, e.to_string()))?;

    let time = raw.time.ok_or_else(|| invalid(index, "missing 'time'"))?;
    check_time(index, time)?;

    let entry_type = raw.entry_type.as_deref().unwrap_or(default_type);
    let kind = match entry_type {
        SPEECH_ENTRY_TYPE => {
            let character = match raw.character.as_deref() {
                Some(name) => name
                    .parse::<Character>()
                    .map_err(|e| invalid(index, e.to_string()))?,
                None => Character::default(),
            };
            ActionKind::Speech(SpeechAction {
                character,
                text: raw.text.unwrap_or_default(),
            })
        }
        SCENE_ENTRY_TYPE => ActionKind::Scene(parse_scene_command(index, raw)?),
        other => return Err(invalid(index, format!("unknown entry type '{other}'"))),
    };

    Ok(Action { time, kind })
}

fn parse_scene_command(index: usize, raw: RawEntry) -> Result<SceneCommand, TimelineError> {
    let require = |field: Option<String>, name: &str| {
        field.ok_or_else(|| invalid(index, format!("missing '{name}'")))
    };

    match raw.action.as_deref() {
        Some("switch_scene") => Ok(SceneCommand::SwitchScene {
            scene_name: require(raw.scene_name, "scene_name")?,
        }),
        Some("update_text") => Ok(SceneCommand::UpdateText {
            source_name: require(raw.source_name, "source_name")?,
            text: require(raw.text, "text")?,
        }),
        Some("set_source_visibility") => Ok(SceneCommand::SetSourceVisibility {
            source_name: require(raw.source_name, "source_name")?,
            visible: raw.visible.unwrap_or(true),
        }),
        Some(other) => Err(invalid(index, format!("unknown scene action '{other}'"))),
        None => Err(invalid(index, "missing 'action'")),
    }
}

/// How a timeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Stopped,
}
