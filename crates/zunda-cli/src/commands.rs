//! Available subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the HTTP API and the presentation/control websockets
    Serve {
        /// Interface to bind (overrides `server.host`)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides `server.http_port`)
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory holding the presentation page (`index.html`)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Play one timeline without a server, logging every event
    Run {
        #[command(flatten)]
        source: TimelineSource,
        /// Send scene commands to OBS even if `obs.enabled` is off
        #[arg(long)]
        obs: bool,
    },

    /// Check that VOICEVOX (and OBS, when enabled) can be reached
    Check,

    /// List projects in the import directory
    Projects,
}

/// Where `run` reads its timeline from.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
#[group(required = true, multiple = false)]
pub struct TimelineSource {
    /// Timeline JSON file
    pub file: Option<PathBuf>,
    /// Project name in the import directory
    #[arg(long)]
    pub project: Option<String>,
    /// Most recently modified project
    #[arg(long)]
    pub latest: bool,
}
