//! Inbound websocket message handling.
//!
//! Control clients send [`ControlCommand`]s. Every accepted command is
//! acknowledged to the sender; unparseable input gets an `error` reply.
//! Objects whose `action` is not a known command are forwarded verbatim to
//! presentation clients, so renderer-specific actions need no server
//! change.
//!
//! Presentation clients may send `speak_text` and the appearance actions.
//!
//! Speech and comment handling run in their own tasks: a socket's read
//! loop never waits for a render.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use zunda_core::{
    Channel, Character, ControlCommand, ControlEvent, PresentationEvent, SpeechOutcome,
    SpeechRequest, StageEventEmitter,
};
use zunda_runtime::Comment;

use crate::hub::ClientId;
use crate::state::AppState;

/// Actions with a typed [`ControlCommand`]. Anything else passes through.
const COMMAND_ACTIONS: &[&str] = &[
    "speak",
    "comment_interrupt",
    "scene_change",
    "zundamon_control",
    "change_expression",
    "change_pose",
    "change_outfit",
    "blink",
    "timeline_pause",
    "timeline_resume",
    "timeline_stop",
];

/// A parsed control-channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(ControlCommand),
    /// Unknown action, forwarded to presentation clients as-is.
    PassThrough {
        action: String,
        message: Map<String, Value>,
    },
}

/// Parse one control-channel text frame.
pub fn parse_control(text: &str) -> Result<Inbound, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {e}"))?;
    let Value::Object(message) = value else {
        return Err("Expected a JSON object".to_string());
    };
    let Some(action) = message.get("action").and_then(Value::as_str) else {
        return Err("Missing 'action'".to_string());
    };

    if COMMAND_ACTIONS.contains(&action) {
        let action = action.to_string();
        serde_json::from_value(Value::Object(message))
            .map(Inbound::Command)
            .map_err(|e| format!("Invalid '{action}' command: {e}"))
    } else {
        Ok(Inbound::PassThrough {
            action: action.to_string(),
            message,
        })
    }
}

/// Handle a frame from a control client.
pub fn handle_control_message(state: &AppState, client: ClientId, text: &str) {
    let reply = match parse_control(text) {
        Ok(Inbound::Command(command)) => {
            let action = command.action();
            debug!(client = %client, action, "Control command");
            execute(state, command);
            ControlEvent::Ack {
                command: action.to_string(),
            }
        }
        Ok(Inbound::PassThrough { action, message }) => {
            debug!(client = %client, %action, "Passing control message through");
            state.hub.broadcast_json(Channel::Presentation, &message);
            ControlEvent::Ack { command: action }
        }
        Err(message) => {
            warn!(client = %client, %message, "Rejected control message");
            ControlEvent::Error { message }
        }
    };
    // A failed reply means the sender is gone; the hub has already pruned it.
    let _ = state.hub.send_json(client, &reply);
}

/// Run a control command.
pub fn execute(state: &AppState, command: ControlCommand) {
    match command {
        ControlCommand::Speak {
            text,
            character,
            priority,
        } => spawn_speech(
            state,
            SpeechRequest {
                text,
                character,
                priority,
            },
        ),
        ControlCommand::CommentInterrupt { username, text } => {
            let comments = Arc::clone(&state.comments);
            tokio::spawn(async move {
                let report = comments.on_comment(Comment::new(username, text)).await;
                debug!(?report, "Comment handled");
            });
        }
        ControlCommand::SceneChange { scene_name } => {
            let scene = Arc::clone(&state.scene);
            tokio::spawn(async move {
                if let Err(e) = scene.switch_scene(&scene_name).await {
                    warn!(scene = %scene_name, error = %e, "Scene change failed");
                }
            });
        }
        ControlCommand::ZundamonControl { control_data } => {
            let mut message = Map::new();
            message.insert("action".into(), Value::from("zundamon_control"));
            message.insert("control_data".into(), control_data);
            state.hub.broadcast_json(Channel::Presentation, &message);
        }
        ControlCommand::ChangeExpression { preset } => {
            state.hub.present(PresentationEvent::ChangeExpression { preset });
        }
        ControlCommand::ChangePose { preset } => {
            state.hub.present(PresentationEvent::ChangePose { preset });
        }
        ControlCommand::ChangeOutfit { preset } => {
            state.hub.present(PresentationEvent::ChangeOutfit { preset });
        }
        ControlCommand::Blink => state.hub.present(PresentationEvent::Blink),
        ControlCommand::TimelinePause => {
            state.scheduler.pause();
        }
        ControlCommand::TimelineResume => {
            state.scheduler.resume();
        }
        ControlCommand::TimelineStop => {
            state.scheduler.stop();
        }
    }
}

fn spawn_speech(state: &AppState, request: SpeechRequest) {
    if request.text.trim().is_empty() {
        debug!("Ignoring empty speech request");
        return;
    }
    let coordinator = Arc::clone(&state.coordinator);
    tokio::spawn(async move {
        let character = request.character;
        match coordinator.speak(request).await {
            SpeechOutcome::Completed => {}
            SpeechOutcome::Interrupted => info!(%character, "Requested speech was interrupted"),
            SpeechOutcome::Failed(reason) => warn!(%character, %reason, "Requested speech failed"),
        }
    });
}

/// Messages a presentation client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum PresentationCommand {
    SpeakText {
        text: String,
        #[serde(default)]
        character: Character,
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
}

/// Handle a frame from a presentation client.
pub fn handle_presentation_message(state: &AppState, client: ClientId, text: &str) {
    let command = match serde_json::from_str::<PresentationCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(client = %client, error = %e, "Ignoring presentation message");
            return;
        }
    };
    match command {
        PresentationCommand::SpeakText { text, character } => {
            spawn_speech(state, SpeechRequest::normal(character, text));
        }
        PresentationCommand::ChangeExpression { preset } => {
            state.hub.present(PresentationEvent::ChangeExpression { preset });
        }
        PresentationCommand::ChangePose { preset } => {
            state.hub.present(PresentationEvent::ChangePose { preset });
        }
        PresentationCommand::ChangeOutfit { preset } => {
            state.hub.present(PresentationEvent::ChangeOutfit { preset });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_actions_parse_as_commands() {
        assert_eq!(
            parse_control(r#"{"action": "scene_change", "scene_name": "Outro"}"#),
            Ok(Inbound::Command(ControlCommand::SceneChange {
                scene_name: "Outro".into()
            }))
        );
        assert_eq!(
            parse_control(r#"{"action": "timeline_pause"}"#),
            Ok(Inbound::Command(ControlCommand::TimelinePause))
        );
    }

    #[test]
    fn unknown_actions_pass_through_untouched() {
        let parsed = parse_control(r#"{"action": "wave", "hand": "left"}"#).unwrap();
        let Inbound::PassThrough { action, message } = parsed else {
            panic!("expected pass-through, got {parsed:?}");
        };
        assert_eq!(action, "wave");
        assert_eq!(Value::Object(message), json!({"action": "wave", "hand": "left"}));
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert!(parse_control("not json").unwrap_err().starts_with("Invalid JSON"));
        assert_eq!(parse_control("[1, 2]"), Err("Expected a JSON object".to_string()));
        assert_eq!(parse_control(r#"{"text": "hi"}"#), Err("Missing 'action'".to_string()));
        // A known action with missing fields is an error, not a pass-through.
        assert!(parse_control(r#"{"action": "speak"}"#)
            .unwrap_err()
            .starts_with("Invalid 'speak' command"));
    }

    #[test]
    fn every_command_action_is_listed() {
        let commands = [
            json!({"action": "speak", "text": "x"}),
            json!({"action": "comment_interrupt", "text": "x"}),
            json!({"action": "scene_change", "scene_name": "x"}),
            json!({"action": "zundamon_control", "control_data": {}}),
            json!({"action": "change_expression"}),
            json!({"action": "change_pose"}),
            json!({"action": "change_outfit"}),
            json!({"action": "blink"}),
            json!({"action": "timeline_pause"}),
            json!({"action": "timeline_resume"}),
            json!({"action": "timeline_stop"}),
        ];
        for raw in commands {
            let command: ControlCommand = serde_json::from_value(raw).unwrap();
            assert!(COMMAND_ACTIONS.contains(&command.action()));
        }
        assert_eq!(COMMAND_ACTIONS.len(), 11);
    }
}
