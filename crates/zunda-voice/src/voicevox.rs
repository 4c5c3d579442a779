//! VOICEVOX engine client.
//!
//! Synthesis is two requests: `POST /audio_query` builds a query for the
//! text, the prosody scales from settings are written into it, and
//! `POST /synthesis` turns it into WAV bytes. Artifacts are cached on disk
//! as `speech_{speaker}_{hash}.wav`, so repeated lines skip the engine.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use zunda_core::settings::VoicevoxSettings;
use zunda_core::{AudioArtifact, SpeechSynthesizer, SynthesisError};

use crate::error::VoiceError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One voice of a VOICEVOX speaker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: u32,
}

/// A VOICEVOX speaker as listed by `GET /speakers`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct Speaker {
    pub name: String,
    #[serde(default)]
    pub speaker_uuid: String,
    #[serde(default)]
    pub styles: Vec<SpeakerStyle>,
}

/// HTTP client for a VOICEVOX engine.
#[derive(Debug, Clone)]
pub struct VoicevoxClient {
    http: reqwest::Client,
    base_url: String,
    speed_scale: f64,
    pitch_scale: f64,
    intonation_scale: f64,
    audio_dir: PathBuf,
}

impl VoicevoxClient {
    pub fn new(settings: &VoicevoxSettings) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            speed_scale: settings.speed_scale,
            pitch_scale: settings.pitch_scale,
            intonation_scale: settings.intonation_scale,
            audio_dir: settings.audio_temp_dir.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Engine version, or an error if it cannot be reached.
    pub async fn version(&self) -> Result<String, VoiceError> {
        let version = self
            .http
            .get(format!("{}/version", self.base_url))
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<String>()
            .await?;
        Ok(version)
    }

    /// Whether the engine answers `GET /version`.
    pub async fn check_connection(&self) -> bool {
        match self.version().await {
            Ok(version) => {
                info!(url = %self.base_url, %version, "VOICEVOX engine reachable");
                true
            }
            Err(e) => {
                warn!(url = %self.base_url, error = %e, "VOICEVOX engine unreachable");
                false
            }
        }
    }

    pub async fn speakers(&self) -> Result<Vec<Speaker>, VoiceError> {
        let speakers = self
            .http
            .get(format!("{}/speakers", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(speakers)
    }

    /// Synthesize `text` and store it as a WAV file. Reuses a cached file.
    pub async fn synthesize_to_file(&self, text: &str, speaker: u32) -> Result<PathBuf, SynthesisError> {
        let path = self.audio_dir.join(artifact_file_name(text, speaker));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "Reusing cached speech artifact");
            return Ok(path);
        }

        let speaker_param = speaker.to_string();
        let mut query: serde_json::Value = self
            .http
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker_param.as_str())])
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(rejected)?
            .json()
            .await
            .map_err(rejected)?;

        if let Some(fields) = query.as_object_mut() {
            fields.insert("speedScale".into(), self.speed_scale.into());
            fields.insert("pitchScale".into(), self.pitch_scale.into());
            fields.insert("intonationScale".into(), self.intonation_scale.into());
        }

        let wav = self
            .http
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", speaker)])
            .json(&query)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(rejected)?
            .bytes()
            .await
            .map_err(unavailable)?;

        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .map_err(|e| SynthesisError::Storage(e.to_string()))?;
        tokio::fs::write(&path, &wav)
            .await
            .map_err(|e| SynthesisError::Storage(e.to_string()))?;

        info!(path = %path.display(), bytes = wav.len(), "Speech artifact written");
        Ok(path)
    }

    /// Delete cached artifacts older than `max_age`. Returns how many went.
    pub async fn cleanup_old_files(&self, max_age: Duration) -> Result<usize, VoiceError> {
        let mut entries = match tokio::fs::read_dir(&self.audio_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "wav") {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age {
                tokio::fs::remove_file(&path).await?;
                debug!(path = %path.display(), "Removed old speech artifact");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl SpeechSynthesizer for VoicevoxClient {
    async fn synthesize(&self, text: &str, voice_id: u32) -> Result<AudioArtifact, SynthesisError> {
        self.synthesize_to_file(text, voice_id)
            .await
            .map(AudioArtifact::WavFile)
    }

    fn name(&self) -> &'static str {
        "voicevox"
    }
}

/// `speech_{speaker}_{first 8 hex of sha256("speaker:text")}.wav`
pub fn artifact_file_name(text: &str, speaker: u32) -> String {
    let digest = Sha256::digest(format!("{speaker}:{text}").as_bytes());
    let hex = format!("{digest:x}");
    format!("speech_{speaker}_{}.wav", &hex[..8])
}

fn unavailable(e: reqwest::Error) -> SynthesisError {
    SynthesisError::Unavailable(e.to_string())
}

fn rejected(e: reqwest::Error) -> SynthesisError {
    // Connection-level failures stay "unavailable" so callers can fall back.
    if e.is_connect() || e.is_timeout() {
        SynthesisError::Unavailable(e.to_string())
    } else {
        SynthesisError::Rejected(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str, dir: &Path) -> VoicevoxSettings {
        VoicevoxSettings {
            url: url.to_string(),
            audio_temp_dir: dir.to_path_buf(),
            ..VoicevoxSettings::default()
        }
    }

    #[test]
    fn artifact_names_are_stable_and_speaker_scoped() {
        let a = artifact_file_name("こんにちは", 3);
        assert_eq!(a, artifact_file_name("こんにちは", 3));
        assert_ne!(a, artifact_file_name("こんにちは", 2));
        assert!(a.starts_with("speech_3_"));
        assert_eq!(a.len(), "speech_3_".len() + 8 + ".wav".len());
    }

    #[test]
    fn base_url_is_normalised() {
        let tmp = tempfile::tempdir().unwrap();
        let client = VoicevoxClient::new(&settings("http://localhost:50021/", tmp.path())).unwrap();
        assert_eq!(client.base_url(), "http://localhost:50021");
    }

    #[tokio::test]
    async fn cached_artifact_skips_the_engine() {
        let tmp = tempfile::tempdir().unwrap();
        // Nothing listens on port 9; a request would fail.
        let client = VoicevoxClient::new(&settings("http://127.0.0.1:9", tmp.path())).unwrap();
        let cached = tmp.path().join(artifact_file_name("hi", 3));
        std::fs::write(&cached, b"RIFF").unwrap();

        let artifact = client.synthesize("hi", 3).await.unwrap();
        assert_eq!(artifact, AudioArtifact::WavFile(cached));
    }

    #[tokio::test]
    async fn unreachable_engine_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let client = VoicevoxClient::new(&settings("http://127.0.0.1:9", tmp.path())).unwrap();
        assert!(!client.check_connection().await);
        let err = client.synthesize("hi", 3).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Unavailable(_)));
    }

    #[tokio::test]
    async fn cleanup_only_touches_old_wavs() {
        let tmp = tempfile::tempdir().unwrap();
        let client = VoicevoxClient::new(&settings("http://127.0.0.1:9", tmp.path())).unwrap();
        std::fs::write(tmp.path().join("a.wav"), b"x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        assert_eq!(client.cleanup_old_files(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(client.cleanup_old_files(Duration::ZERO).await.unwrap(), 1);
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn cleanup_of_missing_dir_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let client =
            VoicevoxClient::new(&settings("http://127.0.0.1:9", &tmp.path().join("gone"))).unwrap();
        assert_eq!(client.cleanup_old_files(Duration::ZERO).await.unwrap(), 0);
    }
}
