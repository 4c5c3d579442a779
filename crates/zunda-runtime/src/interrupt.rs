//! Viewer comment interrupts.
//!
//! A comment cuts into the show: the timeline is paused, any timeline line
//! still playing is cancelled by interrupt-priority speech, the character
//! acknowledges the commenter and answers, and the timeline resumes. The
//! resume runs from a drop guard, so a failed or timed-out response (or a
//! dropped handler future) can never leave the timeline paused.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use zunda_core::events::ANONYMOUS_USERNAME;
use zunda_core::{
    Character, ControlEvent, HookEvent, HookRegistry, SceneBackend, SpeechOutcome, SpeechRequest,
    StageEventEmitter,
};
use zunda_voice::SpeechCoordinator;

use crate::responder::{CommentResponder, acknowledgement};
use crate::scheduler::TimelineScheduler;

/// Text sources showing the comment being answered.
pub const COMMENT_USERNAME_SOURCE: &str = "comment_username";
pub const COMMENT_TEXT_SOURCE: &str = "comment_text";
pub const COMMENT_TIMESTAMP_SOURCE: &str = "comment_timestamp";

fn anonymous() -> String {
    ANONYMOUS_USERNAME.to_string()
}

/// A viewer comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default = "anonymous")]
    pub username: String,
    #[serde(default)]
    pub text: String,
}

impl Comment {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
        }
    }
}

/// What happened while handling one comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentReport {
    pub username: String,
    pub response: String,
    /// Acknowledgement first, then the response.
    pub outcomes: Vec<SpeechOutcome>,
    /// Whether the timeline was paused for this comment.
    pub paused_timeline: bool,
}

/// Handles comments one at a time.
pub struct CommentInterruptHandler {
    scheduler: Arc<TimelineScheduler>,
    coordinator: Arc<SpeechCoordinator>,
    scene: Arc<dyn SceneBackend>,
    emitter: Arc<dyn StageEventEmitter>,
    hooks: Arc<HookRegistry>,
    responder: CommentResponder,
    character: Character,
    deadline: Option<Duration>,
    /// Serialises comments so pause/resume pairs never interleave.
    gate: Mutex<()>,
}

impl std::fmt::Debug for CommentInterruptHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentInterruptHandler")
            .field("character", &self.character)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl CommentInterruptHandler {
    pub fn new(
        scheduler: Arc<TimelineScheduler>,
        coordinator: Arc<SpeechCoordinator>,
        scene: Arc<dyn SceneBackend>,
        emitter: Arc<dyn StageEventEmitter>,
    ) -> Self {
        Self {
            scheduler,
            coordinator,
            scene,
            emitter,
            hooks: Arc::new(HookRegistry::new()),
            responder: CommentResponder::new(),
            character: Character::default(),
            deadline: None,
            gate: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Deadline for each spoken line.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_character(mut self, character: Character) -> Self {
        self.character = character;
        self
    }

    pub const fn responder(&self) -> &CommentResponder {
        &self.responder
    }

    /// Respond to a comment, preempting timeline speech.
    pub async fn on_comment(&self, comment: Comment) -> CommentReport {
        let _gate = self.gate.lock().await;

        let username = match comment.username.trim() {
            "" => ANONYMOUS_USERNAME.to_string(),
            name => name.to_string(),
        };
        let text = comment.text;
        info!(%username, %text, "Comment interrupt");

        self.emitter.notify(ControlEvent::CommentResponseStart {
            username: username.clone(),
            text: text.clone(),
        });
        self.hooks.dispatch(&HookEvent::CommentReceived {
            username: username.clone(),
            text: text.clone(),
        });

        let resume = ResumeGuard::pause(&self.scheduler);
        self.show_comment(&username, &text).await;

        let response = self.responder.respond(&username, &text);
        let mut outcomes = Vec::with_capacity(2);
        for line in [acknowledgement(&username), response.clone()] {
            let request = SpeechRequest::interrupt(self.character, line);
            let outcome = self
                .coordinator
                .speak_with_deadline(request, self.deadline)
                .await;
            if let SpeechOutcome::Failed(reason) = &outcome {
                warn!(%username, %reason, "Comment response line failed");
            }
            outcomes.push(outcome);
        }

        self.hooks.dispatch(&HookEvent::CommentResponded {
            username: username.clone(),
            response: response.clone(),
        });
        self.clear_comment().await;

        self.emitter.notify(ControlEvent::CommentResponseEnd {
            username: username.clone(),
            outcomes: outcomes.clone(),
        });

        let paused_timeline = resume.paused();
        drop(resume);

        CommentReport {
            username,
            response,
            outcomes,
            paused_timeline,
        }
    }

    async fn show_comment(&self, username: &str, text: &str) {
        let timestamp = chrono::Local::now().format("%H:%M").to_string();
        self.set_text(COMMENT_USERNAME_SOURCE, username).await;
        self.set_text(COMMENT_TEXT_SOURCE, text).await;
        self.set_text(COMMENT_TIMESTAMP_SOURCE, &timestamp).await;
    }

    async fn clear_comment(&self) {
        for source in [
            COMMENT_USERNAME_SOURCE,
            COMMENT_TEXT_SOURCE,
            COMMENT_TIMESTAMP_SOURCE,
        ] {
            self.set_text(source, "").await;
        }
    }

    async fn set_text(&self, source: &str, text: &str) {
        if let Err(e) = self.scene.update_text_source(source, text).await {
            warn!(source, error = %e, "Comment display update failed");
        }
    }
}

/// Resumes the timeline on drop, but only if this guard paused it. An
/// operator's earlier pause is left alone.
struct ResumeGuard<'a> {
    scheduler: &'a TimelineScheduler,
    paused: bool,
}

impl<'a> ResumeGuard<'a> {
    fn pause(scheduler: &'a TimelineScheduler) -> Self {
        let paused = scheduler.pause();
        Self { scheduler, paused }
    }

    const fn paused(&self) -> bool {
        self.paused
    }
}

impl Drop for ResumeGuard<'_> {
    fn drop(&mut self) {
        if self.paused {
            self.scheduler.resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_defaults_to_anonymous() {
        let comment: Comment = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(comment.username, ANONYMOUS_USERNAME);
        assert_eq!(comment, Comment::new(ANONYMOUS_USERNAME, "hi"));
    }
}
