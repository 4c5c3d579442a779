#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

// Used only by integration tests
#[cfg(test)]
use tokio_test as _;

mod activity;
pub mod bridge;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod simulated;
pub mod voicevox;
pub mod wav;

pub use activity::RenderActivity;
pub use bridge::{RenderEnd, RenderHandle, VolumeBridge, VolumeFrame, VolumeStream, chunk_level};
pub use coordinator::{SpeechCoordinator, SpeechStatus};
pub use device::{DeviceFactory, InstantDevice, PacedDevice, PlaybackDevice};
pub use error::VoiceError;
pub use simulated::{FallbackSynthesizer, SimulatedSynthesizer};
pub use voicevox::{Speaker, SpeakerStyle, VoicevoxClient};
pub use wav::{DecodedAudio, decode_artifact};
