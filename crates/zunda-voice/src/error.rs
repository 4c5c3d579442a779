//! Speech error types.

use zunda_core::SynthesisError;

/// Errors that can occur while synthesizing or rendering speech.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The synthesis backend failed.
    #[error("Speech synthesis failed: {0}")]
    SynthesisError(#[from] SynthesisError),

    /// Synthesized audio could not be decoded.
    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    /// Failed to open audio output stream.
    #[error("Failed to open audio output stream: {0}")]
    OutputStreamError(String),

    /// Rendering failed mid-stream.
    #[error("Audio render failed: {0}")]
    RenderError(String),

    /// The render thread could not be started.
    #[error("Failed to start render thread: {0}")]
    RenderThreadSpawn(String),

    /// VOICEVOX HTTP request failed.
    #[error("VOICEVOX request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (artifact directory, WAV files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        Self::DecodeError(err.to_string())
    }
}
