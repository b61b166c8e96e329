//! Producer side of the queue.

use hlsforge_models::TranscodeJob;

use crate::error::QueueResult;
use crate::queue::JobQueue;

/// Builds job descriptors from upload metadata and publishes them.
///
/// The upload endpoint hands over a stored file path, a display name, and
/// the probed source duration and height; everything downstream of the
/// publish is the worker's concern.
pub struct JobDispatcher {
    queue: JobQueue,
}

impl JobDispatcher {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// Build a job from upload metadata and publish it.
    ///
    /// Returns the published job so the caller can report the video ID back
    /// to the uploader.
    pub async fn dispatch(
        &self,
        file_path: impl Into<String>,
        video_name: impl Into<String>,
        duration: f64,
        max_height: u32,
    ) -> QueueResult<TranscodeJob> {
        let job = TranscodeJob::new(file_path, video_name, duration, max_height);
        self.queue.publish(&job).await?;
        Ok(job)
    }
}
