//! Speech synthesis port.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

/// Synthesized audio ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioArtifact {
    /// A WAV file on disk.
    WavFile(PathBuf),
    /// Mono PCM samples in `[-1, 1]`.
    Pcm {
        samples: Arc<[f32]>,
        sample_rate: u32,
    },
}

impl AudioArtifact {
    pub fn pcm(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self::Pcm {
            samples: samples.into(),
            sample_rate,
        }
    }
}

/// Errors reported by a synthesis backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// The backend could not be reached.
    #[error("Synthesis backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request (bad text, unknown voice).
    #[error("Synthesis rejected: {0}")]
    Rejected(String),

    /// The artifact could not be stored.
    #[error("Failed to store synthesized audio: {0}")]
    Storage(String),
}

/// Text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with the given voice.
    async fn synthesize(&self, text: &str, voice_id: u32) -> Result<AudioArtifact, SynthesisError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}
