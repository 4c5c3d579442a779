//! Decoding synthesized artifacts into mono PCM.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use zunda_core::AudioArtifact;

use crate::error::VoiceError;

/// Mono PCM in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Decode any artifact. WAV files are read from disk.
pub fn decode_artifact(artifact: &AudioArtifact) -> Result<DecodedAudio, VoiceError> {
    match artifact {
        AudioArtifact::WavFile(path) => decode_wav_file(path),
        AudioArtifact::Pcm {
            samples,
            sample_rate,
        } => {
            if *sample_rate == 0 {
                return Err(VoiceError::DecodeError("sample rate is zero".to_string()));
            }
            Ok(DecodedAudio {
                samples: Arc::clone(samples),
                sample_rate: *sample_rate,
            })
        }
    }
}

pub fn decode_wav_file(path: &Path) -> Result<DecodedAudio, VoiceError> {
    let reader = hound::WavReader::open(path)?;
    decode_wav(reader)
}

/// Decode a WAV stream, downmixing to mono.
pub fn decode_wav<R: Read>(reader: hound::WavReader<R>) -> Result<DecodedAudio, VoiceError> {
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(VoiceError::DecodeError(format!(
            "unsupported WAV layout: {} channels at {} Hz",
            spec.channels, spec.sample_rate
        )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            if !(1..=32).contains(&spec.bits_per_sample) {
                return Err(VoiceError::DecodeError(format!(
                    "unsupported bit depth {}",
                    spec.bits_per_sample
                )));
            }
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = usize::from(spec.channels);
    let samples: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        #[allow(clippy::cast_precision_loss)]
        let divisor = channels as f32;
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / divisor)
            .collect()
    };

    Ok(DecodedAudio {
        samples: samples.into(),
        sample_rate: spec.sample_rate,
    })
}
