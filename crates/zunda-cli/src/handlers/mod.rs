//! Command handlers.
//!
//! Each handler takes the loaded [`CliContext`](crate::CliContext) plus its
//! own arguments, does the work, and formats the result for the terminal.

pub mod check;
pub mod projects;
pub mod run;
pub mod serve;
