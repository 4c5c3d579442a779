//! Speech coordinator behaviour across concurrent requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use zunda_core::{
    AudioArtifact, ChannelEmitter, Character, HookEvent, HookRegistry, PlaybackMode,
    PresentationEvent, SpeechOutcome, SpeechRequest, SpeechState, SpeechSynthesizer, StageEvent,
    SynthesisError, VoiceTable,
};
use zunda_voice::{SpeechCoordinator, VolumeBridge};

/// Constant tone whose length depends on the voice: voice 3 talks for
/// 2 s, everyone else for 0.1 s.
struct ToneSynth;

#[async_trait]
impl SpeechSynthesizer for ToneSynth {
    async fn synthesize(&self, text: &str, voice_id: u32) -> Result<AudioArtifact, SynthesisError> {
        if text == "boom" {
            return Err(SynthesisError::Rejected("engine said no".into()));
        }
        let len = if voice_id == 3 { 2_000 } else { 100 };
        Ok(AudioArtifact::pcm(vec![0.2_f32; len], 1_000))
    }

    fn name(&self) -> &'static str {
        "tone"
    }
}

/// Never finishes synthesizing.
struct StuckSynth;

#[async_trait]
impl SpeechSynthesizer for StuckSynth {
    async fn synthesize(&self, _: &str, _: u32) -> Result<AudioArtifact, SynthesisError> {
        std::future::pending().await
    }

    fn name(&self) -> &'static str {
        "stuck"
    }
}

fn coordinator(synth: Arc<dyn SpeechSynthesizer>) -> (Arc<SpeechCoordinator>, mpsc::UnboundedReceiver<StageEvent>) {
    let (emitter, rx) = ChannelEmitter::new();
    let bridge = VolumeBridge::new(Arc::new(PlaybackMode::Paced)).with_chunk(Duration::from_millis(20));
    let coordinator = SpeechCoordinator::new(synth, bridge, Arc::new(emitter), VoiceTable::default());
    (Arc::new(coordinator), rx)
}

fn presentation(rx: &mut mpsc::UnboundedReceiver<StageEvent>) -> Vec<PresentationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let StageEvent::Presentation(event) = event {
            events.push(event);
        }
    }
    events
}

async fn wait_until_rendering(coordinator: &SpeechCoordinator) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while coordinator.status().state != SpeechState::Rendering {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("speech never started rendering");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completes_with_start_levels_end() {
    let (coordinator, mut rx) = coordinator(Arc::new(ToneSynth));

    let outcome = coordinator
        .speak(SpeechRequest::normal(Character::Metan, "short"))
        .await;
    assert_eq!(outcome, SpeechOutcome::Completed);
    assert!(!coordinator.is_busy());

    let events = presentation(&mut rx);
    assert!(matches!(
        events.first(),
        Some(PresentationEvent::SpeechStart { character: Character::Metan, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(PresentationEvent::SpeechEnd { character: Character::Metan })
    ));
    let levels = events
        .iter()
        .filter(|e| matches!(e, PresentationEvent::VolumeLevel { .. }))
        .count();
    // 100 ms in 20 ms chunks plus the closing zero
    assert_eq!(levels, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupt_preempts_and_old_render_goes_quiet() {
    let (coordinator, mut rx) = coordinator(Arc::new(ToneSynth));

    let long = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .speak(SpeechRequest::normal(Character::Zundamon, "long line"))
                .await
        })
    };
    wait_until_rendering(&coordinator).await;

    let started = std::time::Instant::now();
    let interrupt = coordinator
        .speak(SpeechRequest::interrupt(Character::Metan, "sorry to cut in"))
        .await;
    assert_eq!(interrupt, SpeechOutcome::Completed);
    assert_eq!(assert_ok!(long.await), SpeechOutcome::Interrupted);
    // Nowhere near the 2 s the long line would have taken
    assert!(started.elapsed() < Duration::from_millis(1_500));

    let events = presentation(&mut rx);
    let interrupted_at = events
        .iter()
        .position(|e| matches!(e, PresentationEvent::SpeechInterrupted))
        .expect("speech_interrupted emitted");
    let second_start = events
        .iter()
        .position(|e| matches!(e, PresentationEvent::SpeechStart { character: Character::Metan, .. }))
        .expect("second speech started");
    assert!(interrupted_at < second_start);

    // After the second start, every level belongs to the new speaker.
    assert!(events[second_start..].iter().all(|e| !matches!(
        e,
        PresentationEvent::VolumeLevel { character: Character::Zundamon, .. }
    )));
    assert!(events[..interrupted_at].iter().all(|e| !matches!(
        e,
        PresentationEvent::SpeechEnd { character: Character::Zundamon }
    )));
}

fn spawn_speak(
    coordinator: &Arc<SpeechCoordinator>,
    request: SpeechRequest,
) -> tokio::task::JoinHandle<SpeechOutcome> {
    let coordinator = Arc::clone(coordinator);
    tokio::spawn(async move { coordinator.speak(request).await })
}

fn started_texts(events: &[PresentationEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            PresentationEvent::SpeechStart { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupt_jumps_ahead_of_queued_requests() {
    let (coordinator, mut rx) = coordinator(Arc::new(ToneSynth));

    let first = spawn_speak(&coordinator, SpeechRequest::normal(Character::Zundamon, "first"));
    wait_until_rendering(&coordinator).await;
    let second = spawn_speak(&coordinator, SpeechRequest::normal(Character::Tsumugi, "second"));
    let third = spawn_speak(&coordinator, SpeechRequest::normal(Character::Tsumugi, "third"));
    // Let both normal requests park on the slot.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let interrupt = coordinator
        .speak(SpeechRequest::interrupt(Character::Metan, "cut in"))
        .await;
    assert_eq!(interrupt, SpeechOutcome::Completed);
    assert!(started.elapsed() < Duration::from_millis(1_500));

    assert_eq!(assert_ok!(first.await), SpeechOutcome::Interrupted);
    assert_eq!(assert_ok!(second.await), SpeechOutcome::Completed);
    assert_eq!(assert_ok!(third.await), SpeechOutcome::Completed);

    let events = presentation(&mut rx);
    assert_eq!(started_texts(&events), vec!["first", "cut in", "second", "third"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupt_waits_for_nothing_when_slot_is_free() {
    let (coordinator, mut rx) = coordinator(Arc::new(ToneSynth));

    let interrupt = coordinator
        .speak(SpeechRequest::interrupt(Character::Metan, "alone"))
        .await;
    assert_eq!(interrupt, SpeechOutcome::Completed);

    // Nothing left waiting: a normal request goes straight through.
    let normal = tokio::time::timeout(
        Duration::from_secs(2),
        coordinator.speak(SpeechRequest::normal(Character::Tsumugi, "after")),
    )
    .await;
    assert_eq!(assert_ok!(normal), SpeechOutcome::Completed);
    assert_eq!(started_texts(&presentation(&mut rx)), vec!["alone", "after"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn normal_requests_queue_in_order() {
    let (coordinator, mut rx) = coordinator(Arc::new(ToneSynth));

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .speak(SpeechRequest::normal(Character::Metan, "one"))
                .await
        })
    };
    wait_until_rendering(&coordinator).await;
    let second = coordinator
        .speak(SpeechRequest::normal(Character::Tsumugi, "two"))
        .await;

    assert_eq!(assert_ok!(first.await), SpeechOutcome::Completed);
    assert_eq!(second, SpeechOutcome::Completed);

    let order: Vec<Character> = presentation(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            PresentationEvent::SpeechStart { character, .. }
            | PresentationEvent::SpeechEnd { character } => Some(character),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![Character::Metan, Character::Metan, Character::Tsumugi, Character::Tsumugi]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn synthesis_failure_is_reported_without_speech_start() {
    let (coordinator, mut rx) = coordinator(Arc::new(ToneSynth));

    let outcome = coordinator
        .speak(SpeechRequest::normal(Character::Metan, "boom"))
        .await;
    assert!(matches!(outcome, SpeechOutcome::Failed(ref reason) if reason.contains("engine said no")));

    let events = presentation(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], PresentationEvent::SpeechError { text, .. } if text == "boom"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupt_during_synthesis_emits_nothing() {
    let (coordinator, mut rx) = coordinator(Arc::new(StuckSynth));

    let stuck = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .speak(SpeechRequest::normal(Character::Metan, "never"))
                .await
        })
    };
    tokio::time::timeout(Duration::from_secs(2), async {
        while coordinator.status().state != SpeechState::Synthesizing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(coordinator.cancel_active());
    assert_eq!(assert_ok!(stuck.await), SpeechOutcome::Interrupted);
    assert!(presentation(&mut rx).is_empty());
    assert!(!coordinator.cancel_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_turns_into_failure() {
    let (coordinator, _rx) = coordinator(Arc::new(ToneSynth));

    let outcome = coordinator
        .speak_with_deadline(
            SpeechRequest::normal(Character::Zundamon, "too long"),
            Some(Duration::from_millis(200)),
        )
        .await;
    assert_eq!(outcome, SpeechOutcome::Failed("timed out".to_string()));
    assert!(!coordinator.is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hooks_see_start_and_end() {
    let (emitter, _rx) = ChannelEmitter::new();
    let hooks = Arc::new(HookRegistry::new());
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    hooks.register(
        "recorder",
        Arc::new(move |event: &HookEvent| {
            let _ = seen_tx.send(event.clone());
        }),
    );
    let bridge = VolumeBridge::new(Arc::new(PlaybackMode::Instant));
    let coordinator = SpeechCoordinator::new(Arc::new(ToneSynth), bridge, Arc::new(emitter), VoiceTable::default())
        .with_hooks(hooks);

    coordinator
        .speak(SpeechRequest::normal(Character::Tsumugi, "hello"))
        .await;

    assert!(matches!(
        seen_rx.try_recv(),
        Ok(HookEvent::SpeechStarted { character: Character::Tsumugi, .. })
    ));
    assert_eq!(
        seen_rx.try_recv().ok(),
        Some(HookEvent::SpeechEnded {
            character: Character::Tsumugi,
            outcome: SpeechOutcome::Completed,
        })
    );
}
