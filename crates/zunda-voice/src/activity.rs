//! Render activity flag shared between a render thread and its handle.
//!
//! The render thread raises the flag before its first chunk and lowers it
//! once it stops producing audio. Async callers poll it without touching
//! the thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "is this render still producing audio" flag.
#[derive(Debug, Clone, Default)]
pub struct RenderActivity {
    active: Arc<AtomicBool>,
}

impl RenderActivity {
    /// Create a new flag (initially inactive).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the render as producing audio.
    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Mark the render as finished, cancelled, or failed.
    pub fn finish(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
