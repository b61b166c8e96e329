//! Redis Streams transcode job queue.
//!
//! This crate provides:
//! - Job publishing from the upload side (dispatcher)
//! - Worker consumption via a consumer group with manual commit
//! - Pending-entry claiming so uncommitted jobs get redelivered

pub mod dispatch;
pub mod error;
pub mod queue;

pub use dispatch::JobDispatcher;
pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig};
