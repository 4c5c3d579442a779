//! Messages sent to presentation clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::Character;

/// Visual and audio state changes for the character renderer.
///
/// Appearance changes carry free-form preset fields that are forwarded
/// untouched, so new presets need no server change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PresentationEvent {
    SpeechStart {
        text: String,
        character: Character,
    },
    /// Normalised mouth-opening level in `[0, 1]`.
    VolumeLevel {
        level: f32,
        character: Character,
    },
    SpeechEnd {
        character: Character,
    },
    SpeechInterrupted,
    SpeechError {
        text: String,
        error: String,
    },
    ChangeExpression {
        #[serde(flatten)]
        preset: Map<String, Value>,
    },
    ChangePose {
        #[serde(flatten)]
        preset: Map<String, Value>,
    },
    ChangeOutfit {
        #[serde(flatten)]
        preset: Map<String, Value>,
    },
    Blink,
}

impl PresentationEvent {
    /// The `action` tag this event serializes with.
    pub const fn action(&self) -> &'static str {
        match self {
            Self::SpeechStart { .. } => "speech_start",
            Self::VolumeLevel { .. } => "volume_level",
            Self::SpeechEnd { .. } => "speech_end",
            Self::SpeechInterrupted => "speech_interrupted",
            Self::SpeechError { .. } => "speech_error",
            Self::ChangeExpression { .. } => "change_expression",
            Self::ChangePose { .. } => "change_pose",
            Self::ChangeOutfit { .. } => "change_outfit",
            Self::Blink => "blink",
        }
    }
}
