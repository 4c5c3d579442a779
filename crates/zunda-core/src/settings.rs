//! Settings domain types, loading, and validation.
//!
//! Settings are a single JSON file. Every section has defaults, so a partial
//! file (or no file at all) is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Character, VoiceTable};

/// Default HTTP/websocket port.
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Default VOICEVOX engine URL.
pub const DEFAULT_VOICEVOX_URL: &str = "http://localhost:50021";

/// Default obs-websocket port.
pub const DEFAULT_OBS_PORT: u16 = 4455;

/// Environment variable overriding the settings path.
pub const CONFIG_ENV_VAR: &str = "ZUNDA_CONFIG";

/// Upper bound for every interval setting: one day.
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;

/// Application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub voicevox: VoicevoxSettings,
    pub obs: ObsSettings,
    pub characters: BTreeMap<Character, CharacterSettings>,
    pub timeline: TimelineSettings,
    pub playback: PlaybackSettings,
    pub plugins: PluginSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub http_port: u16,
    /// Directory with the presentation page, served at `/`.
    pub static_dir: Option<PathBuf>,
    /// Outbound message queue per websocket client.
    pub client_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            static_dir: None,
            client_queue: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicevoxSettings {
    pub url: String,
    pub speed_scale: f64,
    pub pitch_scale: f64,
    pub intonation_scale: f64,
    pub audio_temp_dir: PathBuf,
    /// Fall back to simulated speech when the engine is unreachable.
    pub fallback_simulated: bool,
}

impl Default for VoicevoxSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_VOICEVOX_URL.to_string(),
            speed_scale: 1.0,
            pitch_scale: 0.0,
            intonation_scale: 1.0,
            audio_temp_dir: std::env::temp_dir().join("zunda-stage").join("audio"),
            fallback_simulated: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl ObsSettings {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: DEFAULT_OBS_PORT,
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSettings {
    pub voice_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// Seconds between idle blinks.
    pub auto_blink_interval: f64,
    /// Extra pause after each timeline speech action, in seconds.
    pub speech_end_wait: f64,
    /// Deadline for each comment response line, in seconds. `0` disables it.
    pub comment_response_timeout: f64,
    pub import_dir: PathBuf,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            auto_blink_interval: 5.0,
            speech_end_wait: 0.0,
            comment_response_timeout: 30.0,
            import_dir: PathBuf::from("import"),
        }
    }
}

/// Where rendered audio goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Real-time pacing without an output device.
    #[default]
    Paced,
    /// No pacing at all.
    Instant,
    /// Local speakers.
    Speakers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub mode: PlaybackMode,
    /// Render chunk length in milliseconds.
    pub chunk_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::default(),
            chunk_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub enabled: Vec<String>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: vec!["speech_logger".to_string(), "comment_logger".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Settings loading or validation error.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Port must be non-zero")]
    InvalidPort,

    #[error("Chunk length must be between 10 and 1000 ms, got {0}")]
    InvalidChunk(u64),

    #[error("'{name}' must be a finite, non-negative number of seconds, got {value}")]
    InvalidInterval { name: &'static str, value: f64 },

    #[error("'{name}' must be at most 86400 seconds, got {value}")]
    IntervalTooLong { name: &'static str, value: f64 },

    #[error("Blink interval must be at least 0.5 seconds, got {0}")]
    BlinkTooFast(f64),

    #[error("Client queue must hold at least one message")]
    InvalidClientQueue,
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let settings: Self = serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Voice table: configured characters override the built-in defaults.
    pub fn voice_table(&self) -> VoiceTable {
        let defaults = VoiceTable::default();
        VoiceTable::new(Character::ALL.into_iter().filter_map(|c| {
            self.characters
                .get(&c)
                .map(|s| s.voice_id)
                .or_else(|| defaults.voice_for(c))
                .map(|id| (c, id))
        }))
    }

    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.playback.chunk_ms)
    }

    /// Clamped to `0.5..=MAX_INTERVAL_SECS`, so unvalidated settings still
    /// yield a usable period.
    pub fn blink_interval(&self) -> Duration {
        clamped_secs(self.timeline.auto_blink_interval, 0.5)
    }

    /// `None` when no pause is configured.
    pub fn speech_end_wait(&self) -> Option<Duration> {
        positive_secs(self.timeline.speech_end_wait)
    }

    /// `None` when comment responses have no deadline.
    pub fn comment_response_timeout(&self) -> Option<Duration> {
        positive_secs(self.timeline.comment_response_timeout)
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs > 0.0).then(|| clamped_secs(secs, 0.0))
}

fn clamped_secs(secs: f64, min: f64) -> Duration {
    let secs = if secs.is_nan() { min } else { secs.clamp(min, MAX_INTERVAL_SECS) };
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// Default settings path: `<config dir>/zunda-stage/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zunda-stage")
        .join("config.json")
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if settings.server.http_port == 0 || settings.obs.port == 0 {
        return Err(SettingsError::InvalidPort);
    }
    if settings.server.client_queue == 0 {
        return Err(SettingsError::InvalidClientQueue);
    }
    if !(10..=1000).contains(&settings.playback.chunk_ms) {
        return Err(SettingsError::InvalidChunk(settings.playback.chunk_ms));
    }

    let intervals = [
        ("auto_blink_interval", settings.timeline.auto_blink_interval),
        ("speech_end_wait", settings.timeline.speech_end_wait),
        (
            "comment_response_timeout",
            settings.timeline.comment_response_timeout,
        ),
    ];
    for (name, value) in intervals {
        if !value.is_finite() || value < 0.0 {
            return Err(SettingsError::InvalidInterval { name, value });
        }
        if value > MAX_INTERVAL_SECS {
            return Err(SettingsError::IntervalTooLong { name, value });
        }
    }
    if settings.timeline.auto_blink_interval < 0.5 {
        return Err(SettingsError::BlinkTooFast(
            settings.timeline.auto_blink_interval,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(validate_settings(&settings).is_ok());
        assert_eq!(settings.server.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(settings.obs.url(), "ws://localhost:4455");
        assert_eq!(settings.comment_response_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(settings.speech_end_wait(), None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&tmp.path().join("config.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"server": {"http_port": 6000}, "characters": {"metan": {"voice_id": 6}}}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.server.http_port, 6000);
        assert_eq!(settings.server.host, "127.0.0.1");

        let voices = settings.voice_table();
        assert_eq!(voices.voice_for(Character::Metan), Some(6));
        assert_eq!(voices.voice_for(Character::Zundamon), Some(3));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.playback.chunk_ms = 5;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidChunk(5))
        ));

        let mut settings = Settings::default();
        settings.timeline.speech_end_wait = -1.0;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidInterval {
                name: "speech_end_wait",
                ..
            })
        ));

        let mut settings = Settings::default();
        settings.timeline.auto_blink_interval = 0.1;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::BlinkTooFast(_))
        ));

        let mut settings = Settings::default();
        settings.server.http_port = 0;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidPort)
        ));
    }

    #[test]
    fn huge_intervals_are_rejected_and_clamped() {
        let mut settings = Settings::default();
        settings.timeline.auto_blink_interval = 1e20;
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::IntervalTooLong {
                name: "auto_blink_interval",
                ..
            })
        ));
        assert_eq!(settings.blink_interval(), Duration::from_secs(86_400));

        settings.timeline.auto_blink_interval = f64::NAN;
        assert_eq!(settings.blink_interval(), Duration::from_millis(500));

        settings.timeline.comment_response_timeout = 1e20;
        assert_eq!(
            settings.comment_response_timeout(),
            Some(Duration::from_secs(86_400))
        );
    }
}
