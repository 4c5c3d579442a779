//! CLI bootstrap: resolve and load the settings every command starts from.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use zunda_core::{Settings, default_config_path};

/// What every command handler receives.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub settings: Settings,
    /// The file the settings came from (it may not exist).
    pub config_path: PathBuf,
}

/// Load settings from `path`, or from the default location.
///
/// A missing file yields defaults; an unreadable or invalid one is an error.
pub fn load_settings(path: Option<&Path>) -> Result<CliContext> {
    let config_path = path.map_or_else(default_config_path, Path::to_path_buf);
    let settings = Settings::load(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;
    Ok(CliContext {
        settings,
        config_path,
    })
}
