//! Root CLI structure with global options.

use std::path::PathBuf;

use clap::Parser;
use zunda_core::settings::CONFIG_ENV_VAR;

use crate::commands::Commands;

/// Drive a virtual-character broadcast from scripted timelines.
#[derive(Debug, Parser)]
#[command(name = "zunda")]
#[command(about = "Run zunda-stage timelines and the presentation server")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}
