//! Worker error types.

use thiserror::Error;

use hlsforge_media::MediaError;
use hlsforge_queue::QueueError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Encode task '{label}' failed: {source}")]
    EncodeFailed {
        label: String,
        #[source]
        source: MediaError,
    },

    #[error("Encode task '{0}' panicked")]
    TaskPanicked(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn encode_failed(label: impl Into<String>, source: MediaError) -> Self {
        Self::EncodeFailed {
            label: label.into(),
            source,
        }
    }

    /// Whether this failure is a cancellation echo rather than a root cause.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            WorkerError::EncodeFailed {
                source: MediaError::Cancelled,
                ..
            } | WorkerError::Media(MediaError::Cancelled)
        )
    }
}
