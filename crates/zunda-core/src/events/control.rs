//! Control channel protocol: inbound commands and outbound notifications.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Character, RunStatus, SpeechOutcome, SpeechPriority};

/// Username used when a comment arrives without one.
pub const ANONYMOUS_USERNAME: &str = "名無しさん";

fn anonymous() -> String {
    ANONYMOUS_USERNAME.to_string()
}

/// A command received from a control client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlCommand {
    Speak {
        text: String,
        #[serde(default)]
        character: Character,
        #[serde(default)]
        priority: SpeechPriority,
    },
    CommentInterrupt {
        #[serde(default = "anonymous")]
        username: String,
        #[serde(default)]
        text: String,
    },
    SceneChange {
        scene_name: String,
    },
    /// Opaque payload forwarded to presentation clients.
    ZundamonControl {
        control_data: Value,
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
    TimelinePause,
    TimelineResume,
    TimelineStop,
}

impl ControlCommand {
    /// The `action` tag, used in acknowledgements.
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Speak { .. } => "speak",
            Self::CommentInterrupt { .. } => "comment_interrupt",
            Self::SceneChange { .. } => "scene_change",
            Self::ZundamonControl { .. } => "zundamon_control",
            Self::ChangeExpression { .. } => "change_expression",
            Self::ChangePose { .. } => "change_pose",
            Self::ChangeOutfit { .. } => "change_outfit",
            Self::Blink => "blink",
            Self::TimelinePause => "timeline_pause",
            Self::TimelineResume => "timeline_resume",
            Self::TimelineStop => "timeline_stop",
        }
    }
}

/// A notification sent to control clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlEvent {
    Ack {
        command: String,
    },
    Error {
        message: String,
    },
    CommentResponseStart {
        username: String,
        text: String,
    },
    CommentResponseEnd {
        username: String,
        outcomes: Vec<SpeechOutcome>,
    },
    TimelineStarted {
        title: Option<String>,
        total: usize,
    },
    TimelineCompleted {
        /// Seconds, excluding time spent paused.
        duration: f64,
        actions_executed: usize,
        status: RunStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_speak_with_defaults() {
        let cmd: ControlCommand =
            serde_json::from_value(json!({"action": "speak", "text": "hello"})).unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Speak {
                text: "hello".into(),
                character: Character::Zundamon,
                priority: SpeechPriority::Normal,
            }
        );
    }

    #[test]
    fn comment_without_username_is_anonymous() {
        let cmd: ControlCommand =
            serde_json::from_value(json!({"action": "comment_interrupt", "text": "hi"})).unwrap();
        match cmd {
            ControlCommand::CommentInterrupt { username, .. } => {
                assert_eq!(username, ANONYMOUS_USERNAME);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_action_does_not_parse() {
        let parsed = serde_json::from_value::<ControlCommand>(json!({"action": "dance"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn completion_event_wire_format() {
        let event = ControlEvent::TimelineCompleted {
            duration: 1.5,
            actions_executed: 2,
            status: RunStatus::Completed,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "action": "timeline_completed",
                "duration": 1.5,
                "actions_executed": 2,
                "status": "completed"
            })
        );
    }
}
