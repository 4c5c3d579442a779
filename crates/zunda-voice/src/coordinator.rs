//! Speech coordinator: the single "currently speaking" slot.
//!
//! Every request runs `Idle → Synthesizing → Rendering → Idle` while holding
//! `render_lock`, a FIFO tokio mutex whose critical section is exactly one
//! synthesize-and-render. Timeline speech and interrupt speech both go
//! through [`SpeechCoordinator::speak`].
//!
//! Preemption never aborts the lock holder's future. An interrupt-priority
//! request cancels the active request's token and then queues on the lock;
//! the holder observes the token, cancels its render, drains the volume
//! stream to the end marker, waits for the render thread to exit, emits
//! `speech_interrupted`, and only then releases the lock. The next render
//! therefore cannot start while samples from the old one are still flowing.
//!
//! While any interrupt is waiting, a normal request that reaches the lock
//! hands it straight back and waits for the interrupt count to drop to zero,
//! so an interrupt never queues behind an ordinary line. Normal requests
//! first take a turn on `normal_queue`, which keeps them in arrival order
//! while they give way. The count is raised and
//! checked under the `active` mutex: a normal request is either admitted
//! before the interrupt (and then cancelled by it) or yields to it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use zunda_core::ports::{HookEvent, HookRegistry, SpeechSynthesizer, StageEventEmitter};
use zunda_core::{
    Character, PresentationEvent, SpeechOutcome, SpeechPriority, SpeechRequest, SpeechState,
    VoiceTable,
};

use crate::bridge::{RenderEnd, VolumeBridge, VolumeFrame};

/// Reason recorded when a request runs past its deadline.
pub const TIMED_OUT: &str = "timed out";

/// The request currently holding the speaking slot.
#[derive(Debug)]
struct ActiveSpeech {
    id: u64,
    character: Character,
    priority: SpeechPriority,
    state: SpeechState,
    cancel: CancellationToken,
}

/// Point-in-time view of the speaking slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechStatus {
    pub state: SpeechState,
    pub character: Option<Character>,
    pub priority: Option<SpeechPriority>,
}

/// Serialises speech and supports cancel-and-preempt.
pub struct SpeechCoordinator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    bridge: VolumeBridge,
    emitter: Arc<dyn StageEventEmitter>,
    hooks: Arc<HookRegistry>,
    voices: VoiceTable,
    /// One synthesize-and-render in flight.
    render_lock: Mutex<()>,
    /// FIFO order among normal requests.
    normal_queue: Mutex<()>,
    /// Never held across an `.await`.
    active: std::sync::Mutex<Option<ActiveSpeech>>,
    /// Interrupt requests not yet admitted to the slot.
    interrupts_waiting: watch::Sender<usize>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SpeechCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechCoordinator")
            .field("synthesizer", &self.synthesizer.name())
            .field("bridge", &self.bridge)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SpeechCoordinator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        bridge: VolumeBridge,
        emitter: Arc<dyn StageEventEmitter>,
        voices: VoiceTable,
    ) -> Self {
        Self {
            synthesizer,
            bridge,
            emitter,
            hooks: Arc::new(HookRegistry::new()),
            voices,
            render_lock: Mutex::new(()),
            normal_queue: Mutex::new(()),
            active: std::sync::Mutex::new(None),
            interrupts_waiting: watch::channel(0).0,
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Speak one request and report how it ended.
    pub async fn speak(&self, request: SpeechRequest) -> SpeechOutcome {
        self.speak_with_deadline(request, None).await
    }

    /// Like [`speak`](Self::speak), but cancels the request once `deadline`
    /// has elapsed (queueing time included) and reports it as failed.
    pub async fn speak_with_deadline(
        &self,
        request: SpeechRequest,
        deadline: Option<Duration>,
    ) -> SpeechOutcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let timed_out = Arc::new(AtomicBool::new(false));
        let _timer = deadline.map(|after| {
            let cancel = cancel.clone();
            let timed_out = Arc::clone(&timed_out);
            AbortOnDrop(tokio::spawn(async move {
                tokio::time::sleep(after).await;
                timed_out.store(true, Ordering::SeqCst);
                cancel.cancel();
            }))
        });

        let waiting = (request.priority == SpeechPriority::Interrupt)
            .then(|| InterruptWaiting::announce(self, id));
        let admission = self.admit(id, &request, &cancel).await;
        drop(waiting);
        let Some(_admission) = admission else {
            // Deadline passed while queued: never started.
            return SpeechOutcome::Failed(TIMED_OUT.to_string());
        };

        let mut outcome = self.run_request(id, &request, &cancel).await;
        if outcome.is_interrupted() && timed_out.load(Ordering::SeqCst) {
            outcome = SpeechOutcome::Failed(TIMED_OUT.to_string());
        }

        self.hooks.dispatch(&HookEvent::SpeechEnded {
            character: request.character,
            outcome: outcome.clone(),
        });
        debug!(request = id, ?outcome, "Speech request finished");
        outcome
    }

    /// Wait for the slot. Normal requests give way to waiting interrupts.
    /// Returns `None` if `cancel` fires first.
    async fn admit(
        &self,
        id: u64,
        request: &SpeechRequest,
        cancel: &CancellationToken,
    ) -> Option<Admission<'_>> {
        let mut waiting = self.interrupts_waiting.subscribe();
        // Normal requests line up here first so yielding never reorders them.
        let _turn = match request.priority {
            SpeechPriority::Normal => Some(tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                turn = self.normal_queue.lock() => turn,
            }),
            SpeechPriority::Interrupt => None,
        };
        loop {
            if request.priority == SpeechPriority::Normal {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return None,
                    () = interrupts_cleared(&mut waiting) => {}
                }
            }
            let slot = tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                slot = self.render_lock.lock() => slot,
            };
            let speech = ActiveSpeech {
                id,
                character: request.character,
                priority: request.priority,
                state: SpeechState::Synthesizing,
                cancel: cancel.clone(),
            };
            if let Some(active) = ActiveGuard::enter(self, speech) {
                return Some(Admission {
                    _active: active,
                    _slot: slot,
                });
            }
            debug!(request = id, "Yielding the slot to a waiting interrupt");
        }
    }

    async fn run_request(
        &self,
        id: u64,
        request: &SpeechRequest,
        cancel: &CancellationToken,
    ) -> SpeechOutcome {
        let character = request.character;
        let Some(voice_id) = self.voices.voice_for(character) else {
            return self.fail(request, format!("no voice configured for {character}"));
        };

        let synthesized = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(request = id, "Cancelled during synthesis");
                return SpeechOutcome::Interrupted;
            }
            result = self.synthesizer.synthesize(&request.text, voice_id) => result,
        };
        let artifact = match synthesized {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(request = id, %character, error = %e, "Speech synthesis failed");
                return self.fail(request, e.to_string());
            }
        };
        if cancel.is_cancelled() {
            return SpeechOutcome::Interrupted;
        }

        let (mut handle, mut stream) = match self.bridge.start(artifact) {
            Ok(pair) => pair,
            Err(e) => return self.fail(request, e.to_string()),
        };
        self.set_state(id, SpeechState::Rendering);

        self.emitter.present(PresentationEvent::SpeechStart {
            text: request.text.clone(),
            character,
        });
        self.hooks.dispatch(&HookEvent::SpeechStarted {
            text: request.text.clone(),
            character,
        });

        let end = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled(), if !handle.is_cancelled() => handle.cancel(),
                frame = stream.recv() => match frame {
                    Some(VolumeFrame::Level(level)) => {
                        self.emitter.present(PresentationEvent::VolumeLevel { level, character });
                    }
                    Some(VolumeFrame::End(end)) => break end,
                    None => break RenderEnd::Failed("render thread exited without an end marker".to_string()),
                },
            }
        };
        handle.wait_exit().await;

        match end {
            RenderEnd::Finished => {
                self.emitter
                    .present(PresentationEvent::SpeechEnd { character });
                SpeechOutcome::Completed
            }
            RenderEnd::Cancelled => {
                info!(request = id, %character, "Speech interrupted");
                self.emitter.present(PresentationEvent::SpeechInterrupted);
                SpeechOutcome::Interrupted
            }
            RenderEnd::Failed(reason) => {
                warn!(request = id, %character, %reason, "Speech render failed");
                let outcome = self.fail(request, reason);
                self.emitter
                    .present(PresentationEvent::SpeechEnd { character });
                outcome
            }
        }
    }

    fn fail(&self, request: &SpeechRequest, reason: String) -> SpeechOutcome {
        self.emitter.present(PresentationEvent::SpeechError {
            text: request.text.clone(),
            error: reason.clone(),
        });
        SpeechOutcome::Failed(reason)
    }

    /// Cancel whichever request holds the slot. Returns whether one did.
    pub fn cancel_active(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_ref() {
            Some(speech) if !speech.cancel.is_cancelled() => {
                speech.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Whether any request holds the slot.
    pub fn is_busy(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Whether audio is being rendered right now.
    pub fn is_rendering(&self) -> bool {
        self.status().state == SpeechState::Rendering
    }

    pub fn status(&self) -> SpeechStatus {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.as_ref().map_or(
            SpeechStatus {
                state: SpeechState::Idle,
                character: None,
                priority: None,
            },
            |speech| SpeechStatus {
                state: speech.state,
                character: Some(speech.character),
                priority: Some(speech.priority),
            },
        )
    }

    fn set_state(&self, id: u64, state: SpeechState) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(speech) = active.as_mut().filter(|s| s.id == id) {
            speech.state = state;
        }
    }
}

/// Occupies the active slot for one request and clears it on drop, even if
/// the `speak` future is dropped mid-flight.
struct ActiveGuard<'a> {
    coordinator: &'a SpeechCoordinator,
    id: u64,
}

impl<'a> ActiveGuard<'a> {
    /// Refuses a normal request while an interrupt is waiting.
    fn enter(coordinator: &'a SpeechCoordinator, speech: ActiveSpeech) -> Option<Self> {
        let mut active = coordinator
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if speech.priority == SpeechPriority::Normal && *coordinator.interrupts_waiting.borrow() > 0 {
            return None;
        }
        let id = speech.id;
        *active = Some(speech);
        Some(Self { coordinator, id })
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = self
            .coordinator
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|s| s.id == self.id) {
            if let Some(speech) = active.take() {
                // Stops a render orphaned by a dropped future.
                speech.cancel.cancel();
            }
        }
    }
}

/// The slot plus its active entry. Fields drop in order, so the entry is
/// cleared before the lock is released.
struct Admission<'a> {
    _active: ActiveGuard<'a>,
    _slot: MutexGuard<'a, ()>,
}

/// Counts one interrupt request as waiting until it is admitted or dropped.
struct InterruptWaiting<'a>(&'a SpeechCoordinator);

impl<'a> InterruptWaiting<'a> {
    fn announce(coordinator: &'a SpeechCoordinator, id: u64) -> Self {
        let active = coordinator
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        coordinator.interrupts_waiting.send_modify(|n| *n += 1);
        if let Some(speech) = active.as_ref().filter(|s| !s.cancel.is_cancelled()) {
            speech.cancel.cancel();
            info!(request = id, preempted = speech.id, "Interrupt request preempting active speech");
        }
        Self(coordinator)
    }
}

impl Drop for InterruptWaiting<'_> {
    fn drop(&mut self) {
        self.0
            .interrupts_waiting
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}

async fn interrupts_cleared(waiting: &mut watch::Receiver<usize>) {
    // The sender lives as long as the coordinator, so this only errors once
    // the coordinator is gone.
    let _ = waiting.wait_for(|n| *n == 0).await;
}

/// Aborts a spawned task when dropped.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
