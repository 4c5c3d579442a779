//! Ordered lifecycle hooks.
//!
//! Hooks are plain callbacks run in registration order. They observe the
//! engine; they cannot change what it does. Built-in hooks are enabled by
//! name from settings (`plugins.enabled`).

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::domain::{Character, SpeechOutcome};

/// Lifecycle points hooks can observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum HookEvent {
    SpeechStarted {
        text: String,
        character: Character,
    },
    SpeechEnded {
        character: Character,
        outcome: SpeechOutcome,
    },
    CommentReceived {
        username: String,
        text: String,
    },
    CommentResponded {
        username: String,
        response: String,
    },
}

/// A hook callback.
pub type Hook = Arc<dyn Fn(&HookEvent) + Send + Sync>;

/// Registry of named hooks.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<(String, Hook)>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.names())
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the enabled built-in hooks. Unknown names are skipped.
    pub fn with_builtins(enabled: &[String]) -> Self {
        let registry = Self::new();
        for name in enabled {
            match builtin_hook(name) {
                Some(hook) => registry.register(name.clone(), hook),
                None => tracing::warn!(hook = %name, "Unknown hook, skipping"),
            }
        }
        registry
    }

    /// Append a hook. A hook with the same name is replaced in place.
    pub fn register(&self, name: impl Into<String>, hook: Hook) {
        let name = name.into();
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = hooks.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = hook;
        } else {
            hooks.push((name, hook));
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|(n, _)| n != name);
        hooks.len() != before
    }

    pub fn names(&self) -> Vec<String> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Run every hook in registration order.
    pub fn dispatch(&self, event: &HookEvent) {
        // Snapshot so hooks may register/unregister without deadlocking.
        let hooks: Vec<Hook> = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for hook in hooks {
            hook(event);
        }
    }
}

/// Look up a built-in hook by name.
pub fn builtin_hook(name: &str) -> Option<Hook> {
    match name {
        "speech_logger" => Some(Arc::new(|event: &HookEvent| match event {
            HookEvent::SpeechStarted { text, character } => {
                tracing::info!(target: "zunda.hooks", %character, text, "Speech started");
            }
            HookEvent::SpeechEnded { character, outcome } => {
                tracing::info!(target: "zunda.hooks", %character, ?outcome, "Speech ended");
            }
            _ => {}
        })),
        "comment_logger" => Some(Arc::new(|event: &HookEvent| match event {
            HookEvent::CommentReceived { username, text } => {
                tracing::info!(target: "zunda.hooks", username, text, "Comment received");
            }
            HookEvent::CommentResponded { username, response } => {
                tracing::info!(target: "zunda.hooks", username, response, "Comment answered");
            }
            _ => {}
        })),
        _ => None,
    }
}
