#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

// Used only by tests
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use chrono as _;

pub mod bootstrap;
pub mod commands;
pub mod handlers;
pub mod logging;
pub mod parser;

pub use bootstrap::{CliContext, load_settings};
pub use commands::{Commands, TimelineSource};
pub use parser::Cli;
