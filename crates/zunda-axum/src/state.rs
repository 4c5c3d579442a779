//! Shared application state type.

use std::sync::Arc;

use crate::bootstrap::StageContext;

/// Application state shared across all handlers.
pub type AppState = Arc<StageContext>;
