//! Event emitter trait for fanning engine events out to clients.
//!
//! Implementations handle transport details (websocket hub, channels, logs).

use tokio::sync::mpsc;

use crate::events::{ControlEvent, PresentationEvent, StageEvent};

/// Trait for emitting engine events.
///
/// `emit` must not block: the speech coordinator calls it for every volume
/// sample while a render is in flight. Events emitted from one task reach
/// each consumer in emission order.
///
/// # Implementations
///
/// - `NoopEmitter` - discards everything
/// - `ChannelEmitter` - forwards into an unbounded channel (CLI runs, tests)
/// - `ConnectionHub` in the axum adapter
pub trait StageEventEmitter: Send + Sync {
    /// Emit an event on its channel.
    fn emit(&self, event: StageEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn StageEventEmitter>;

    /// Emit a presentation-channel event.
    fn present(&self, event: PresentationEvent) {
        self.emit(StageEvent::Presentation(event));
    }

    /// Emit a control-channel event.
    fn notify(&self, event: ControlEvent) {
        self.emit(StageEvent::Control(event));
    }
}

/// A no-op event emitter.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl StageEventEmitter for NoopEmitter {
    fn emit(&self, _event: StageEvent) {}

    fn clone_box(&self) -> Box<dyn StageEventEmitter> {
        Box::new(self.clone())
    }
}

/// Emitter that forwards every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<StageEvent>,
}

impl ChannelEmitter {
    /// Create the emitter and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StageEventEmitter for ChannelEmitter {
    fn emit(&self, event: StageEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }

    fn clone_box(&self) -> Box<dyn StageEventEmitter> {
        Box::new(self.clone())
    }
}
