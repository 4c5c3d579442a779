//! Playback devices used by the render thread.
//!
//! A device is opened *on* the render thread and never leaves it, so it
//! does not need to be `Send` (`rodio::OutputStream` is not, on some
//! platforms). Only the [`DeviceFactory`] crosses threads.

use std::thread;
use std::time::{Duration, Instant};

use zunda_core::PlaybackMode;

use crate::error::VoiceError;

/// Sink for one render's PCM chunks.
///
/// `play` blocks for roughly the real-time length of the chunk (except for
/// devices that deliberately do not pace).
pub trait PlaybackDevice {
    fn play(&mut self, chunk: &[f32], sample_rate: u32) -> Result<(), VoiceError>;

    /// Silence any audio still queued. Called on cancellation.
    fn stop(&mut self) {}
}

/// Opens a fresh device for each render.
pub trait DeviceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn PlaybackDevice>, VoiceError>;
}

impl DeviceFactory for PlaybackMode {
    fn open(&self) -> Result<Box<dyn PlaybackDevice>, VoiceError> {
        match self {
            Self::Paced => Ok(Box::new(PacedDevice::new())),
            Self::Instant => Ok(Box::new(InstantDevice)),
            #[cfg(feature = "speakers")]
            Self::Speakers => Ok(Box::new(SpeakerDevice::open()?)),
            #[cfg(not(feature = "speakers"))]
            Self::Speakers => Err(VoiceError::OutputStreamError(
                "built without the `speakers` feature".to_string(),
            )),
        }
    }
}

fn chunk_duration(len: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    #[allow(clippy::cast_precision_loss)]
    Duration::from_secs_f64(len as f64 / f64::from(sample_rate))
}

/// Keeps a render on the wall clock without producing sound.
///
/// Sleeps against the render's start instant rather than per chunk, so
/// rounding never accumulates into drift.
#[derive(Debug)]
pub struct PacedDevice {
    started: Option<Instant>,
    played: Duration,
}

impl PacedDevice {
    pub const fn new() -> Self {
        Self {
            started: None,
            played: Duration::ZERO,
        }
    }
}

impl Default for PacedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackDevice for PacedDevice {
    fn play(&mut self, chunk: &[f32], sample_rate: u32) -> Result<(), VoiceError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.played += chunk_duration(chunk.len(), sample_rate);
        if let Some(remaining) = (started + self.played).checked_duration_since(Instant::now()) {
            thread::sleep(remaining);
        }
        Ok(())
    }
}

/// Renders as fast as the consumer drains levels.
#[derive(Debug, Default)]
pub struct InstantDevice;

impl PlaybackDevice for InstantDevice {
    fn play(&mut self, _chunk: &[f32], _sample_rate: u32) -> Result<(), VoiceError> {
        Ok(())
    }
}

/// Local speakers via `rodio`, paced like [`PacedDevice`] so volume levels
/// stay in step with what is audible.
#[cfg(feature = "speakers")]
pub struct SpeakerDevice {
    _stream: rodio::OutputStream,
    sink: rodio::Sink,
    pacer: PacedDevice,
}

#[cfg(feature = "speakers")]
impl SpeakerDevice {
    pub fn open() -> Result<Self, VoiceError> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        let sink = rodio::Sink::try_new(&handle)
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            sink,
            pacer: PacedDevice::new(),
        })
    }
}

#[cfg(feature = "speakers")]
impl PlaybackDevice for SpeakerDevice {
    fn play(&mut self, chunk: &[f32], sample_rate: u32) -> Result<(), VoiceError> {
        self.sink
            .append(rodio::buffer::SamplesBuffer::new(1, sample_rate, chunk.to_vec()));
        self.pacer.play(chunk, sample_rate)
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}
