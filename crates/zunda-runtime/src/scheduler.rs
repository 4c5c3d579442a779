//! Timeline scheduler.
//!
//! One dispatch loop walks the loaded actions in time order. Before each
//! action it waits until the action's offset on the run clock has been
//! reached, then hands speech to the [`SpeechCoordinator`] (and waits for
//! it to finish) or a scene command to the [`SceneBackend`].
//!
//! Pause, resume and stop are published on a `watch` channel, so the loop
//! reacts to them as soon as they happen rather than on a polling tick.
//! The run clock stops while paused: an action is never dispatched earlier
//! than it would have been without the pause, and `elapsed` never includes
//! paused time. Pausing does not interrupt a speech that is already
//! playing; it holds the *next* action.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use zunda_core::ports::apply_scene_command;
use zunda_core::{
    Action, ActionKind, ControlEvent, OverlayText, RunStatus, SceneBackend, SpeechOutcome,
    SpeechRequest, StageEventEmitter, Timeline, TimelineError,
};
use zunda_voice::SpeechCoordinator;

// ── Run clock ───────────────────────────────────────────────────────────────

/// Monotonic clock for one run that leaves paused intervals out.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunClock {
    started: Instant,
    paused_since: Option<Instant>,
    paused_total: Duration,
}

impl RunClock {
    pub(crate) const fn start(now: Instant) -> Self {
        Self {
            started: now,
            paused_since: None,
            paused_total: Duration::ZERO,
        }
    }

    pub(crate) fn elapsed_at(&self, now: Instant) -> Duration {
        let until = self.paused_since.unwrap_or(now);
        until
            .saturating_duration_since(self.started)
            .saturating_sub(self.paused_total)
    }

    pub(crate) const fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    /// Returns `false` if already paused.
    pub(crate) fn pause(&mut self, now: Instant) -> bool {
        if self.paused_since.is_some() {
            return false;
        }
        self.paused_since = Some(now);
        true
    }

    /// Returns `false` if not paused.
    pub(crate) fn resume(&mut self, now: Instant) -> bool {
        match self.paused_since.take() {
            Some(since) => {
                self.paused_total += now.saturating_duration_since(since);
                true
            }
            None => false,
        }
    }
}

// ── Public types ────────────────────────────────────────────────────────────

/// Lifecycle of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Loaded,
    Running,
    Paused,
}

/// Point-in-time view for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineStatus {
    pub state: SchedulerState,
    /// Index of the next action to dispatch.
    pub cursor: usize,
    pub total: usize,
    /// Seconds on the run clock.
    pub elapsed: f64,
    pub current_action: Option<String>,
    pub project: Option<String>,
    pub title: Option<String>,
}

impl TimelineStatus {
    const fn idle() -> Self {
        Self {
            state: SchedulerState::Idle,
            cursor: 0,
            total: 0,
            elapsed: 0.0,
            current_action: None,
            project: None,
            title: None,
        }
    }
}

/// How a run went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineSummary {
    /// Run clock at the end, paused time excluded.
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub actions_executed: usize,
    pub status: RunStatus,
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

// ── Scheduler ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Control {
    paused: bool,
    stopped: bool,
}

#[derive(Debug)]
struct Loaded {
    timeline: Timeline,
    project: Option<String>,
}

#[derive(Debug)]
struct RunState {
    cursor: usize,
    total: usize,
    current_action: Option<String>,
    clock: RunClock,
    project: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    loaded: Option<Loaded>,
    run: Option<RunState>,
}

/// Drives one timeline at a time.
pub struct TimelineScheduler {
    coordinator: Arc<SpeechCoordinator>,
    scene: Arc<dyn SceneBackend>,
    emitter: Arc<dyn StageEventEmitter>,
    speech_end_wait: Option<Duration>,
    /// Never held across an `.await`.
    inner: Mutex<Inner>,
    control: watch::Sender<Control>,
}

impl std::fmt::Debug for TimelineScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineScheduler")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl TimelineScheduler {
    pub fn new(
        coordinator: Arc<SpeechCoordinator>,
        scene: Arc<dyn SceneBackend>,
        emitter: Arc<dyn StageEventEmitter>,
    ) -> Self {
        let (control, _) = watch::channel(Control::default());
        Self {
            coordinator,
            scene,
            emitter,
            speech_end_wait: None,
            inner: Mutex::new(Inner::default()),
            control,
        }
    }

    /// Extra pause after each spoken line.
    #[must_use]
    pub fn with_speech_end_wait(mut self, wait: Option<Duration>) -> Self {
        self.speech_end_wait = wait;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the loaded timeline. Fails while a run is in progress.
    pub fn load(&self, timeline: Timeline) -> Result<(), TimelineError> {
        self.load_named(timeline, None)
    }

    /// Validate, sort and load a raw action list.
    pub fn load_actions(&self, actions: Vec<Action>) -> Result<usize, TimelineError> {
        let timeline = Timeline::from_actions(actions)?;
        let total = timeline.len();
        self.load(timeline)?;
        Ok(total)
    }

    /// Load a timeline and remember which project it came from.
    pub fn load_named(&self, timeline: Timeline, project: Option<String>) -> Result<(), TimelineError> {
        let mut inner = self.lock();
        if inner.run.is_some() {
            return Err(TimelineError::AlreadyRunning);
        }
        info!(
            actions = timeline.len(),
            project = project.as_deref().unwrap_or("-"),
            "Timeline loaded"
        );
        inner.loaded = Some(Loaded { timeline, project });
        Ok(())
    }

    /// Dispatch the loaded timeline until it is exhausted or stopped.
    ///
    /// The loaded timeline is consumed; load again to run it twice.
    pub async fn run(&self) -> Result<TimelineSummary, TimelineError> {
        let (actions, overlay, total) = self.begin_run()?;
        let _run = RunGuard(self);

        self.emitter.notify(ControlEvent::TimelineStarted {
            title: overlay.title.clone().filter(|t| !t.trim().is_empty()),
            total,
        });
        info!(total, "Timeline started");
        self.push_overlay(&overlay).await;

        let mut control = self.control.subscribe();
        let mut executed = 0;
        let mut status = RunStatus::Completed;

        for (index, action) in actions.iter().enumerate() {
            if !self.wait_until_due(action.time, &mut control).await {
                status = RunStatus::Stopped;
                break;
            }
            self.with_run(|run| {
                run.cursor = index;
                run.current_action = Some(action.describe());
            });
            debug!(index, time = action.time, action = %action.describe(), "Dispatching action");

            self.execute(action).await;
            executed += 1;
            self.with_run(|run| {
                run.cursor = index + 1;
                run.current_action = None;
            });
        }

        let elapsed = self.elapsed();
        self.emitter.notify(ControlEvent::TimelineCompleted {
            duration: elapsed.as_secs_f64(),
            actions_executed: executed,
            status,
        });
        info!(
            elapsed_ms = elapsed.as_millis(),
            actions_executed = executed,
            ?status,
            "Timeline finished"
        );

        Ok(TimelineSummary {
            elapsed,
            actions_executed: executed,
            status,
        })
    }

    fn begin_run(&self) -> Result<(Vec<Action>, OverlayText, usize), TimelineError> {
        let mut inner = self.lock();
        if inner.run.is_some() {
            return Err(TimelineError::AlreadyRunning);
        }
        let loaded = inner.loaded.take().ok_or(TimelineError::NotLoaded)?;
        let (actions, overlay) = loaded.timeline.into_parts();
        let total = actions.len();

        self.control.send_replace(Control::default());
        inner.run = Some(RunState {
            cursor: 0,
            total,
            current_action: None,
            clock: RunClock::start(Instant::now()),
            project: loaded.project,
            title: overlay.title.clone(),
        });
        Ok((actions, overlay, total))
    }

    async fn push_overlay(&self, overlay: &OverlayText) {
        for (source, text) in overlay.entries() {
            if let Err(e) = self.scene.update_text_source(source, text).await {
                warn!(source, error = %e, "Overlay text update failed");
            }
        }
    }

    /// Wait until `offset` seconds on the run clock. `false` if stopped.
    async fn wait_until_due(&self, offset: f64, control: &mut watch::Receiver<Control>) -> bool {
        // Loaded offsets always fit; saturate rather than panic if one doesn't.
        let due = Duration::try_from_secs_f64(offset.max(0.0)).unwrap_or(Duration::MAX);
        loop {
            let flags = *control.borrow_and_update();
            if flags.stopped {
                return false;
            }
            if flags.paused {
                if control.changed().await.is_err() {
                    return false;
                }
                continue;
            }
            let remaining = due.saturating_sub(self.elapsed());
            if remaining.is_zero() {
                return true;
            }
            tokio::select! {
                () = tokio::time::sleep(remaining) => {}
                changed = control.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    async fn execute(&self, action: &Action) {
        match &action.kind {
            ActionKind::Speech(speech) => {
                if speech.text.trim().is_empty() {
                    debug!(character = %speech.character, "Skipping empty speech action");
                    return;
                }
                let request = SpeechRequest::normal(speech.character, speech.text.clone());
                match self.coordinator.speak(request).await {
                    SpeechOutcome::Completed => {}
                    SpeechOutcome::Interrupted => {
                        info!(character = %speech.character, "Timeline speech was interrupted");
                    }
                    SpeechOutcome::Failed(reason) => {
                        warn!(character = %speech.character, %reason, "Timeline speech failed, continuing");
                    }
                }
                if let Some(wait) = self.speech_end_wait {
                    tokio::time::sleep(wait).await;
                }
            }
            ActionKind::Scene(command) => {
                if let Err(e) = apply_scene_command(self.scene.as_ref(), command).await {
                    warn!(command = %command.describe(), error = %e, "Scene command failed, continuing");
                }
            }
        }
    }

    fn with_run(&self, update: impl FnOnce(&mut RunState)) {
        if let Some(run) = self.lock().run.as_mut() {
            update(run);
        }
    }

    fn elapsed(&self) -> Duration {
        self.lock()
            .run
            .as_ref()
            .map_or(Duration::ZERO, |run| run.clock.elapsed_at(Instant::now()))
    }

    /// Hold the next action. Returns whether this call paused the run.
    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        let Some(run) = inner.run.as_mut() else {
            return false;
        };
        if !run.clock.pause(Instant::now()) {
            return false;
        }
        self.control.send_modify(|c| c.paused = true);
        info!(cursor = run.cursor, "Timeline paused");
        true
    }

    /// Let the run continue. Returns whether this call resumed it.
    pub fn resume(&self) -> bool {
        let mut inner = self.lock();
        let Some(run) = inner.run.as_mut() else {
            return false;
        };
        if !run.clock.resume(Instant::now()) {
            return false;
        }
        self.control.send_modify(|c| c.paused = false);
        info!(cursor = run.cursor, "Timeline resumed");
        true
    }

    /// Stop after the in-flight action. With nothing running, discards
    /// the loaded timeline instead.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        if inner.run.is_some() {
            self.control.send_modify(|c| c.stopped = true);
            info!("Timeline stop requested");
            return true;
        }
        inner.loaded.take().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.lock().run.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.lock()
            .run
            .as_ref()
            .is_some_and(|run| run.clock.is_paused())
    }

    pub fn status(&self) -> TimelineStatus {
        let inner = self.lock();
        if let Some(run) = &inner.run {
            return TimelineStatus {
                state: if run.clock.is_paused() {
                    SchedulerState::Paused
                } else {
                    SchedulerState::Running
                },
                cursor: run.cursor,
                total: run.total,
                elapsed: run.clock.elapsed_at(Instant::now()).as_secs_f64(),
                current_action: run.current_action.clone(),
                project: run.project.clone(),
                title: run.title.clone(),
            };
        }
        inner
            .loaded
            .as_ref()
            .map_or_else(TimelineStatus::idle, |loaded| TimelineStatus {
                state: SchedulerState::Loaded,
                total: loaded.timeline.len(),
                project: loaded.project.clone(),
                title: loaded.timeline.overlay().title.clone(),
                ..TimelineStatus::idle()
            })
    }
}

/// Clears the run state when `run()` returns or its future is dropped.
struct RunGuard<'a>(&'a TimelineScheduler);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().run = None;
        self.0.control.send_replace(Control::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn clock_excludes_paused_time() {
        let t0 = Instant::now();
        let mut clock = RunClock::start(t0);
        assert_eq!(clock.elapsed_at(t0 + 100 * MS), 100 * MS);

        assert!(clock.pause(t0 + 100 * MS));
        // Frozen while paused
        assert_eq!(clock.elapsed_at(t0 + 400 * MS), 100 * MS);

        assert!(clock.resume(t0 + 500 * MS));
        assert_eq!(clock.elapsed_at(t0 + 600 * MS), 200 * MS);
    }

    #[test]
    fn repeated_pause_and_resume_do_not_double_count() {
        let t0 = Instant::now();
        let mut clock = RunClock::start(t0);

        assert!(clock.pause(t0 + 10 * MS));
        assert!(!clock.pause(t0 + 50 * MS));
        assert!(clock.resume(t0 + 110 * MS));
        assert!(!clock.resume(t0 + 200 * MS));

        assert_eq!(clock.elapsed_at(t0 + 310 * MS), 210 * MS);
        assert!(!clock.is_paused());
    }

    #[test]
    fn summary_serializes_elapsed_as_seconds() {
        let summary = TimelineSummary {
            elapsed: Duration::from_millis(2_500),
            actions_executed: 3,
            status: RunStatus::Completed,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["elapsed"], 2.5);
        assert_eq!(json["status"], "completed");
    }

    #[test]
    fn idle_status_is_empty() {
        let status = TimelineStatus::idle();
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.total, 0);
    }
}
