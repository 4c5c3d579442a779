//! Offline synthesis: a deterministic speech-like envelope.
//!
//! Used when no VOICEVOX engine is reachable, so a show can still be
//! rehearsed end to end with lip-sync levels flowing.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use zunda_core::{AudioArtifact, SpeechSynthesizer, SynthesisError};

const DEFAULT_SAMPLE_RATE: u32 = 24_000;
const SECONDS_PER_CHAR: f64 = 0.15;
const MIN_SECONDS: f64 = 1.0;
const MAX_SECONDS: f64 = 10.0;

/// Produces PCM whose length follows the text: 0.15 s per character,
/// clamped to 1–10 s.
#[derive(Debug, Clone)]
pub struct SimulatedSynthesizer {
    sample_rate: u32,
}

impl Default for SimulatedSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl SimulatedSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate.max(1);
        self
    }

    /// Speaking time for `text`.
    pub fn duration_for(text: &str) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let chars = text.chars().count() as f64;
        (chars * SECONDS_PER_CHAR).clamp(MIN_SECONDS, MAX_SECONDS)
    }

    /// Syllable-rate amplitude envelope over a voiced carrier.
    fn render(&self, text: &str, voice_id: u32) -> Vec<f32> {
        let rate = f64::from(self.sample_rate);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let len = (Self::duration_for(text) * rate) as usize;
        let carrier = 110.0 + f64::from(voice_id % 8) * 15.0;

        (0..len)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64 / rate;
                // ~6 syllables per second
                let syllable = (std::f64::consts::PI * 6.0 * t).sin().abs();
                let voiced = (std::f64::consts::TAU * carrier * t).sin();
                #[allow(clippy::cast_possible_truncation)]
                let sample = (0.3 * syllable * voiced) as f32;
                sample
            })
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for SimulatedSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: u32) -> Result<AudioArtifact, SynthesisError> {
        let samples = self.render(text, voice_id);
        debug!(voice_id, samples = samples.len(), "Simulated speech rendered");
        Ok(AudioArtifact::pcm(samples, self.sample_rate))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Tries `primary`, switching to `fallback` when the primary is unavailable.
///
/// Rejections are passed through: a fallback voice would hide a bad request.
pub struct FallbackSynthesizer {
    primary: Arc<dyn SpeechSynthesizer>,
    fallback: Arc<dyn SpeechSynthesizer>,
}

impl std::fmt::Debug for FallbackSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackSynthesizer")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl FallbackSynthesizer {
    pub fn new(primary: Arc<dyn SpeechSynthesizer>, fallback: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl SpeechSynthesizer for FallbackSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: u32) -> Result<AudioArtifact, SynthesisError> {
        match self.primary.synthesize(text, voice_id).await {
            Err(SynthesisError::Unavailable(reason)) => {
                warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    %reason,
                    "Synthesis backend unavailable, falling back"
                );
                self.fallback.synthesize(text, voice_id).await
            }
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        self.primary.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Down;

    #[async_trait]
    impl SpeechSynthesizer for Down {
        async fn synthesize(&self, _: &str, _: u32) -> Result<AudioArtifact, SynthesisError> {
            Err(SynthesisError::Unavailable("connection refused".into()))
        }
        fn name(&self) -> &'static str {
            "down"
        }
    }

    struct Picky;

    #[async_trait]
    impl SpeechSynthesizer for Picky {
        async fn synthesize(&self, _: &str, _: u32) -> Result<AudioArtifact, SynthesisError> {
            Err(SynthesisError::Rejected("unknown speaker".into()))
        }
        fn name(&self) -> &'static str {
            "picky"
        }
    }

    #[test]
    fn duration_is_clamped() {
        assert!((SimulatedSynthesizer::duration_for("") - 1.0).abs() < f64::EPSILON);
        assert!((SimulatedSynthesizer::duration_for("あいうえおかきくけこ") - 1.5).abs() < 1e-9);
        assert!((SimulatedSynthesizer::duration_for(&"あ".repeat(500)) - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn simulated_pcm_matches_duration() {
        let synth = SimulatedSynthesizer::new().with_sample_rate(1_000);
        let AudioArtifact::Pcm { samples, sample_rate } = synth.synthesize("hi", 3).await.unwrap() else {
            panic!("expected PCM");
        };
        assert_eq!(sample_rate, 1_000);
        assert_eq!(samples.len(), 1_000);
        assert!(samples.iter().all(|s| s.abs() <= 0.3 + f32::EPSILON));
        assert!(samples.iter().any(|s| s.abs() > 0.01));
    }

    #[tokio::test]
    async fn fallback_only_on_unavailable() {
        let simulated: Arc<dyn SpeechSynthesizer> = Arc::new(SimulatedSynthesizer::new().with_sample_rate(100));

        let falls_back = FallbackSynthesizer::new(Arc::new(Down), Arc::clone(&simulated));
        assert!(matches!(
            falls_back.synthesize("x", 3).await,
            Ok(AudioArtifact::Pcm { .. })
        ));

        let passes_through = FallbackSynthesizer::new(Arc::new(Picky), simulated);
        assert!(matches!(
            passes_through.synthesize("x", 3).await,
            Err(SynthesisError::Rejected(_))
        ));
    }
}
