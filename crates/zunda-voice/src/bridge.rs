//! Volume bridge: runs a blocking render off the runtime and streams levels.
//!
//! Each [`VolumeBridge::start`] spawns one named OS thread that decodes the
//! artifact, opens a playback device, and walks the audio in fixed chunks.
//! For every chunk it sends a [`VolumeFrame::Level`] over a bounded tokio
//! channel (`blocking_send`, so a slow consumer applies backpressure and no
//! level is ever dropped or reordered), then plays the chunk.
//!
//! Every render ends with exactly one [`VolumeFrame::End`]. Cancellation is
//! cooperative: the thread checks its token at each chunk boundary, so it
//! stops within one chunk. Once a render is cancelled, [`VolumeStream`]
//! yields no further levels, only the end marker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zunda_core::AudioArtifact;

use crate::activity::RenderActivity;
use crate::device::DeviceFactory;
use crate::error::VoiceError;
use crate::wav::decode_artifact;

/// Default render chunk length.
pub const DEFAULT_CHUNK: Duration = Duration::from_millis(100);

/// Default number of frames buffered between render thread and consumer.
pub const DEFAULT_QUEUE: usize = 32;

/// Why a render stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEnd {
    Finished,
    Cancelled,
    Failed(String),
}

/// One message from a render thread.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeFrame {
    /// Normalised chunk level in `[0, 1]`.
    Level(f32),
    /// Terminal marker; nothing follows it.
    End(RenderEnd),
}

/// Normalised loudness of a chunk: `min(rms × 3, 1)`.
pub fn chunk_level(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = chunk.iter().map(|s| s * s).sum();
    #[allow(clippy::cast_precision_loss)]
    let rms = (sum_sq / chunk.len() as f32).sqrt();
    (rms * 3.0).min(1.0)
}

/// Starts renders on dedicated threads.
#[derive(Clone)]
pub struct VolumeBridge {
    devices: Arc<dyn DeviceFactory>,
    chunk: Duration,
    queue: usize,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for VolumeBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeBridge")
            .field("chunk", &self.chunk)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl VolumeBridge {
    pub fn new(devices: Arc<dyn DeviceFactory>) -> Self {
        Self {
            devices,
            chunk: DEFAULT_CHUNK,
            queue: DEFAULT_QUEUE,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    #[must_use]
    pub fn with_chunk(mut self, chunk: Duration) -> Self {
        self.chunk = chunk.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: usize) -> Self {
        self.queue = queue.max(1);
        self
    }

    pub const fn chunk(&self) -> Duration {
        self.chunk
    }

    /// Spawn a render thread for `artifact`.
    ///
    /// Decoding and device errors happen on the thread and are reported as
    /// `End(Failed)`; only a failure to spawn the thread is returned here.
    pub fn start(&self, artifact: AudioArtifact) -> Result<(RenderHandle, VolumeStream), VoiceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (frame_tx, frame_rx) = mpsc::channel(self.queue);
        let (exit_tx, exit_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let activity = RenderActivity::new();
        activity.start();

        let job = RenderJob {
            artifact,
            devices: Arc::clone(&self.devices),
            chunk: self.chunk,
            cancel: cancel.clone(),
            frames: frame_tx,
        };
        let thread_activity = activity.clone();

        let thread = thread::Builder::new()
            .name(format!("zunda-render-{id}"))
            .spawn(move || {
                let frames = job.frames.clone();
                let end = job.run();
                debug!(render = id, ?end, "Render finished");
                thread_activity.finish();
                // The consumer may already be gone; nothing else to tell.
                let _ = frames.blocking_send(VolumeFrame::End(end));
                let _ = exit_tx.send(());
            })
            .map_err(|e| {
                activity.finish();
                VoiceError::RenderThreadSpawn(e.to_string())
            })?;

        let handle = RenderHandle {
            id,
            cancel: cancel.clone(),
            activity,
            exit: Some(exit_rx),
            thread: Some(thread),
        };
        let stream = VolumeStream {
            frames: frame_rx,
            cancel,
            ended: false,
        };
        Ok((handle, stream))
    }
}

/// Everything the render thread owns.
struct RenderJob {
    artifact: AudioArtifact,
    devices: Arc<dyn DeviceFactory>,
    chunk: Duration,
    cancel: CancellationToken,
    frames: mpsc::Sender<VolumeFrame>,
}

impl RenderJob {
    fn run(self) -> RenderEnd {
        let audio = match decode_artifact(&self.artifact) {
            Ok(audio) => audio,
            Err(e) => return RenderEnd::Failed(e.to_string()),
        };
        let mut device = match self.devices.open() {
            Ok(device) => device,
            Err(e) => return RenderEnd::Failed(e.to_string()),
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let chunk_len = ((f64::from(audio.sample_rate) * self.chunk.as_secs_f64()).round() as usize)
            .max(1);

        for chunk in audio.samples.chunks(chunk_len) {
            if self.cancel.is_cancelled() {
                device.stop();
                return RenderEnd::Cancelled;
            }
            if self
                .frames
                .blocking_send(VolumeFrame::Level(chunk_level(chunk)))
                .is_err()
            {
                // Consumer dropped the stream: nobody to render for.
                device.stop();
                return RenderEnd::Cancelled;
            }
            if let Err(e) = device.play(chunk, audio.sample_rate) {
                warn!(error = %e, "Playback device failed mid-render");
                device.stop();
                return RenderEnd::Failed(e.to_string());
            }
        }

        if self.cancel.is_cancelled() {
            device.stop();
            return RenderEnd::Cancelled;
        }
        // Close the mouth after the last chunk.
        let _ = self.frames.blocking_send(VolumeFrame::Level(0.0));
        RenderEnd::Finished
    }
}

/// Control side of one render.
#[derive(Debug)]
pub struct RenderHandle {
    id: u64,
    cancel: CancellationToken,
    activity: RenderActivity,
    exit: Option<oneshot::Receiver<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RenderHandle {
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Ask the render to stop at the next chunk boundary. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(render = self.id, "Cancelling render");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the render thread is still producing audio.
    pub fn is_active(&self) -> bool {
        self.activity.is_active()
    }

    /// Wait until the render thread has exited.
    ///
    /// The stream should be drained (or dropped) first, otherwise the thread
    /// may be blocked handing over its end marker.
    pub async fn wait_exit(&mut self) {
        if let Some(exit) = self.exit.take() {
            // Err means the thread died without signalling; join still applies.
            let _ = exit.await;
        }
        if let Some(thread) = self.thread.take() {
            let id = self.id;
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!(render = id, "Render thread panicked");
            }
        }
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        // A handle dropped mid-render must not leave audio playing.
        if self.thread.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Consumer side of one render.
#[derive(Debug)]
pub struct VolumeStream {
    frames: mpsc::Receiver<VolumeFrame>,
    cancel: CancellationToken,
    ended: bool,
}

impl VolumeStream {
    /// Next frame, or `None` once the end marker has been returned.
    ///
    /// `None` without a preceding `End` means the render thread died.
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<VolumeFrame> {
        if self.ended {
            return None;
        }
        loop {
            match self.frames.recv().await? {
                VolumeFrame::Level(_) if self.cancel.is_cancelled() => {}
                VolumeFrame::End(end) => {
                    self.ended = true;
                    return Some(VolumeFrame::End(end));
                }
                level @ VolumeFrame::Level(_) => return Some(level),
            }
        }
    }
}
