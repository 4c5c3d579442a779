//! HTTP and websocket request handlers.
//!
//! Handlers are thin wrappers over the services in
//! [`StageContext`](crate::bootstrap::StageContext).

pub mod speech;
pub mod system;
pub mod timeline;
pub mod ws;
