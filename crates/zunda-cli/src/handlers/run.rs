//! Run command handler: play one timeline without a server.
//!
//! Presentation and control events go to the log instead of websocket
//! clients. Ctrl-C stops the run after the current action, the same way
//! `timeline_stop` does on a server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use zunda_axum::{build_scene_backend, build_synthesizer};
use zunda_core::{
    ChannelEmitter, HookRegistry, PresentationEvent, RunStatus, SceneBackend, Settings,
    SpeechSynthesizer, StageEvent, StageEventEmitter, Timeline, latest_project, load_project,
};
use zunda_runtime::{TimelineScheduler, TimelineSummary};
use zunda_voice::{SpeechCoordinator, VolumeBridge};

use crate::bootstrap::CliContext;
use crate::commands::TimelineSource;

/// Load the timeline, play it, and print the summary.
pub async fn execute(ctx: &CliContext, source: &TimelineSource, obs: bool) -> Result<()> {
    let mut settings = ctx.settings.clone();
    if obs {
        settings.obs.enabled = true;
    }

    let (timeline, project) = resolve_source(&settings, source)?;
    let total = timeline.len();
    println!(
        "Playing {} ({total} actions)",
        project.as_deref().unwrap_or("timeline")
    );

    let (_voicevox, synthesizer) = build_synthesizer(&settings)?;
    let scene = build_scene_backend(&settings);
    let stage = HeadlessStage::assemble(&settings, synthesizer, scene);

    let summary = stage.play(timeline, project).await?;
    println!("{}", format_summary(&summary, total));
    Ok(())
}

/// Read the timeline a [`TimelineSource`] points at, with its project name.
pub fn resolve_source(
    settings: &Settings,
    source: &TimelineSource,
) -> Result<(Timeline, Option<String>)> {
    let import_dir = &settings.timeline.import_dir;
    if let Some(file) = &source.file {
        let timeline = Timeline::from_path(file)
            .with_context(|| format!("Failed to load timeline {}", file.display()))?;
        return Ok((timeline, None));
    }

    let name = match &source.project {
        Some(name) => name.clone(),
        None => latest_project(import_dir)?.name,
    };
    let timeline = load_project(import_dir, &name)?;
    Ok((timeline, Some(name)))
}

/// Coordinator and scheduler wired to a logging event sink.
pub struct HeadlessStage {
    coordinator: Arc<SpeechCoordinator>,
    scheduler: Arc<TimelineScheduler>,
    events: JoinHandle<usize>,
}

impl HeadlessStage {
    pub fn assemble(
        settings: &Settings,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        scene: Arc<dyn SceneBackend>,
    ) -> Self {
        let (emitter, events) = ChannelEmitter::new();
        let emitter: Arc<dyn StageEventEmitter> = Arc::new(emitter);
        let hooks = Arc::new(HookRegistry::with_builtins(&settings.plugins.enabled));

        let bridge = VolumeBridge::new(Arc::new(settings.playback.mode))
            .with_chunk(settings.chunk_duration());
        let coordinator = Arc::new(
            SpeechCoordinator::new(synthesizer, bridge, Arc::clone(&emitter), settings.voice_table())
                .with_hooks(hooks),
        );
        let scheduler = Arc::new(
            TimelineScheduler::new(Arc::clone(&coordinator), scene, emitter)
                .with_speech_end_wait(settings.speech_end_wait()),
        );

        Self {
            coordinator,
            scheduler,
            events: tokio::spawn(log_events(events)),
        }
    }

    /// Run `timeline` to the end or until Ctrl-C.
    ///
    /// Returns once every emitted event has been logged.
    pub async fn play(self, timeline: Timeline, project: Option<String>) -> Result<TimelineSummary> {
        let Self {
            coordinator,
            scheduler,
            events,
        } = self;
        scheduler.load_named(timeline, project)?;

        let stopper = Arc::clone(&scheduler);
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after the current action");
                stopper.stop();
            }
        });

        let result = scheduler.run().await;

        signal.abort();
        // Join so the task's scheduler handle is released before draining.
        let _ = signal.await;
        drop(scheduler);
        drop(coordinator);
        match events.await {
            Ok(count) => debug!(events = count, "Event log drained"),
            Err(e) => warn!(error = %e, "Event logger failed"),
        }

        Ok(result?)
    }
}

/// Log every event until all emitters are gone. Returns how many were seen.
async fn log_events(mut events: UnboundedReceiver<StageEvent>) -> usize {
    let mut count = 0;
    while let Some(event) = events.recv().await {
        count += 1;
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Unserializable event");
                continue;
            }
        };
        let channel = event.channel().as_str();
        match event {
            StageEvent::Presentation(PresentationEvent::VolumeLevel { .. }) => {
                trace!(target: "zunda.events", channel, "{json}");
            }
            _ => info!(target: "zunda.events", channel, "{json}"),
        }
    }
    count
}

pub fn format_summary(summary: &TimelineSummary, total: usize) -> String {
    let status = match summary.status {
        RunStatus::Completed => "completed",
        RunStatus::Stopped => "stopped",
    };
    format!(
        "Timeline {status}: {}/{total} actions in {:.1}s",
        summary.actions_executed,
        summary.elapsed.as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use zunda_core::{LoggingSceneBackend, PlaybackMode};
    use tokio_test::{assert_err, assert_ok};
    use zunda_voice::SimulatedSynthesizer;

    fn settings(import_dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.playback.mode = PlaybackMode::Instant;
        settings.timeline.import_dir = import_dir.to_path_buf();
        settings.plugins.enabled.clear();
        settings
    }

    fn write_project(import_dir: &std::path::Path, name: &str, json: &str) {
        let dir = import_dir.join("timeline_projects").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("timeline.json"), json).unwrap();
    }

    fn source(file: Option<PathBuf>, project: Option<&str>, latest: bool) -> TimelineSource {
        TimelineSource {
            file,
            project: project.map(str::to_string),
            latest,
        }
    }

    #[test]
    fn file_source_has_no_project_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("show.json");
        std::fs::write(&file, r#"[{"time": 0, "text": "hi"}]"#).unwrap();

        let (timeline, project) =
            resolve_source(&settings(dir.path()), &source(Some(file), None, false)).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(project, None);
    }

    #[test]
    fn project_and_latest_sources_resolve_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path(), "ep1", r#"{"timeline": [{"time": 0, "text": "a"}]}"#);
        let settings = settings(dir.path());

        let (_, project) = resolve_source(&settings, &source(None, Some("ep1"), false)).unwrap();
        assert_eq!(project.as_deref(), Some("ep1"));

        let (_, project) = resolve_source(&settings, &source(None, None, true)).unwrap();
        assert_eq!(project.as_deref(), Some("ep1"));
    }

    #[test]
    fn latest_without_projects_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = assert_err!(resolve_source(&settings(dir.path()), &source(None, None, true)));
        assert!(err.to_string().contains("No projects"));
    }

    #[tokio::test]
    async fn headless_run_plays_every_action() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let timeline = Timeline::from_json_str(
            r#"[{"time": 0, "text": "first"}, {"time": 0.05, "text": "second"}]"#,
        )
        .unwrap();

        let stage = HeadlessStage::assemble(
            &settings,
            Arc::new(SimulatedSynthesizer::new()),
            Arc::new(LoggingSceneBackend),
        );
        let played = tokio::time::timeout(Duration::from_secs(5), stage.play(timeline, None)).await;
        let summary = assert_ok!(assert_ok!(played));

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.actions_executed, 2);
    }

    #[test]
    fn summary_reads_naturally() {
        let summary = TimelineSummary {
            elapsed: Duration::from_millis(12_340),
            actions_executed: 3,
            status: RunStatus::Stopped,
        };
        assert_eq!(format_summary(&summary, 5), "Timeline stopped: 3/5 actions in 12.3s");
    }
}
