#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

// Used only by integration tests
#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tokio_test as _;

pub mod blink;
pub mod interrupt;
pub mod obs;
pub mod responder;
pub mod scheduler;

pub use blink::run_idle_blink;
pub use interrupt::{Comment, CommentInterruptHandler, CommentReport};
pub use obs::ObsSceneBackend;
pub use responder::CommentResponder;
pub use scheduler::{SchedulerState, TimelineScheduler, TimelineStatus, TimelineSummary};
