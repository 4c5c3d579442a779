//! Wire protocol for the two client channels.
//!
//! # Structure
//!
//! - `presentation` - character state and volume events for renderers
//! - `control` - commands from and notifications to operator tools
//!
//! # Wire Format
//!
//! Every message is a JSON object tagged by `action`:
//!
//! ```json
//! { "action": "volume_level", "level": 0.42, "character": "zundamon" }
//! ```

mod control;
mod presentation;

use serde::{Deserialize, Serialize};

pub use control::{ANONYMOUS_USERNAME, ControlCommand, ControlEvent};
pub use presentation::PresentationEvent;

/// The two independent client channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Character renderers: speech, volume, and appearance events.
    Presentation,
    /// Operator tools: commands in, acknowledgements and notifications out.
    Control,
}

impl Channel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Presentation => "presentation",
            Self::Control => "control",
        }
    }
}

/// Any event emitted by the engine, routed by channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageEvent {
    Presentation(PresentationEvent),
    Control(ControlEvent),
}

impl StageEvent {
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Presentation(_) => Channel::Presentation,
            Self::Control(_) => Channel::Control,
        }
    }
}

impl From<PresentationEvent> for StageEvent {
    fn from(event: PresentationEvent) -> Self {
        Self::Presentation(event)
    }
}

impl From<ControlEvent> for StageEvent {
    fn from(event: ControlEvent) -> Self {
        Self::Control(event)
    }
}
