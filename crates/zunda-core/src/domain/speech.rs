//! Speech request and outcome types.

use serde::{Deserialize, Serialize};

use super::character::Character;

/// Whether a request may preempt the speech currently being rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechPriority {
    #[default]
    Normal,
    /// Cancels any in-flight render before taking the speaking slot.
    Interrupt,
}

/// One line to be synthesized and rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub character: Character,
    #[serde(default)]
    pub priority: SpeechPriority,
}

impl SpeechRequest {
    pub fn normal(character: Character, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            character,
            priority: SpeechPriority::Normal,
        }
    }

    pub fn interrupt(character: Character, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            character,
            priority: SpeechPriority::Interrupt,
        }
    }
}

/// How a `speak()` call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum SpeechOutcome {
    Completed,
    /// Cancelled by an interrupt-priority request or an explicit cancel.
    Interrupted,
    /// Synthesis or rendering failed.
    Failed(String),
}

impl SpeechOutcome {
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Lifecycle of the single speaking slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechState {
    #[default]
    Idle,
    Synthesizing,
    Rendering,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_to_zundamon_normal() {
        let request: SpeechRequest = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(request, SpeechRequest::normal(Character::Zundamon, "hi"));
    }

    #[test]
    fn outcome_wire_format() {
        let failed = serde_json::to_value(SpeechOutcome::Failed("boom".into())).unwrap();
        assert_eq!(failed, serde_json::json!({"outcome": "failed", "reason": "boom"}));

        let done = serde_json::to_value(SpeechOutcome::Completed).unwrap();
        assert_eq!(done, serde_json::json!({"outcome": "completed"}));
    }
}
