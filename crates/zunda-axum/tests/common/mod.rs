//! Shared fixtures for zunda-axum integration tests.

use std::path::Path;
use std::sync::Arc;

use zunda_axum::StageContext;
use zunda_core::{LoggingSceneBackend, PlaybackMode, Settings};
use zunda_voice::SimulatedSynthesizer;

/// Blink interval long enough to never fire during a test.
pub const QUIET_BLINK_SECS: f64 = 600.0;

/// Settings for tests: instant playback, no engines, projects under `import_dir`.
pub fn test_settings(import_dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.playback.mode = PlaybackMode::Instant;
    settings.playback.chunk_ms = 20;
    settings.timeline.auto_blink_interval = QUIET_BLINK_SECS;
    settings.timeline.import_dir = import_dir.to_path_buf();
    settings.plugins.enabled.clear();
    settings
}

/// Context with the simulated synthesizer and a logging scene backend.
pub fn test_context(settings: Settings) -> Arc<StageContext> {
    Arc::new(StageContext::assemble(
        settings,
        Arc::new(SimulatedSynthesizer::new()),
        Arc::new(LoggingSceneBackend),
    ))
}

/// Write `<import_dir>/timeline_projects/<name>/timeline.json`.
#[allow(dead_code)]
pub fn write_project(import_dir: &Path, name: &str, timeline: &str) {
    let dir = import_dir.join("timeline_projects").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("timeline.json"), timeline).unwrap();
}
