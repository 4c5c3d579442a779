//! Idle blinking.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use zunda_core::{PresentationEvent, StageEventEmitter};
use zunda_voice::SpeechCoordinator;

/// Broadcast `blink` every `every` while nobody is speaking, until
/// `cancel` fires.
pub async fn run_idle_blink(
    coordinator: Arc<SpeechCoordinator>,
    emitter: Arc<dyn StageEventEmitter>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !coordinator.is_busy() {
                    emitter.present(PresentationEvent::Blink);
                }
            }
        }
    }
    debug!("Idle blink loop stopped");
}
