//! Transcode worker.
//!
//! Consumes transcode jobs from the queue, fans each one out into
//! bounded-concurrency ffmpeg encode tasks, aggregates results
//! all-or-nothing, writes the master playlist, and commits the queue
//! message only on full success.

pub mod config;
pub mod encode;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod progress;

pub use config::WorkerConfig;
pub use encode::{EncodeBackend, EncodeRequest, FfmpegEncodeBackend};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use orchestrator::{JobPhase, TranscodeOrchestrator};
pub use progress::ProgressTracker;
