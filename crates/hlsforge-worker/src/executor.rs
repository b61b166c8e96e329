//! Job executor: the queue-consumption loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use hlsforge_media::write_master_playlist;
use hlsforge_models::{select_profiles, TranscodeJob};
use hlsforge_queue::{JobQueue, QueueResult};

use crate::config::WorkerConfig;
use crate::encode::{EncodeBackend, FfmpegEncodeBackend};
use crate::error::WorkerResult;
use crate::orchestrator::TranscodeOrchestrator;

/// The commit half of the queue contract, split out so the
/// commit-on-full-success policy is testable without Redis.
#[async_trait]
pub trait JobCommitter: Send + Sync {
    async fn commit(&self, message_id: &str) -> QueueResult<()>;
}

#[async_trait]
impl JobCommitter for JobQueue {
    async fn commit(&self, message_id: &str) -> QueueResult<()> {
        self.ack(message_id).await
    }
}

/// Processes transcode jobs from the queue, one at a time.
///
/// Horizontal scaling is more worker processes, not more jobs per worker.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> Self {
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            shutdown,
            consumer_name,
        }
    }

    /// Run the consumption loop until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(consumer = %self.consumer_name, "Starting job executor");

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut last_claim = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.next_batch(&mut last_claim) => {
                    match result {
                        Ok(jobs) => {
                            for (message_id, job) in jobs {
                                self.execute_job(&message_id, &job).await;
                            }
                        }
                        Err(e) => {
                            error!("Error consuming jobs: {}", e);
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Fetch the next jobs: new entries first, idle pending entries
    /// (failed or crashed deliveries) on the claim interval.
    async fn next_batch(
        &self,
        last_claim: &mut Instant,
    ) -> QueueResult<Vec<(String, TranscodeJob)>> {
        let jobs = self.queue.consume(&self.consumer_name, 1000, 1).await?;
        if !jobs.is_empty() {
            return Ok(jobs);
        }

        if last_claim.elapsed() >= self.config.claim_interval {
            *last_claim = Instant::now();
            return self.queue.claim_pending(&self.consumer_name, 1).await;
        }

        Ok(jobs)
    }

    /// Run one job end to end and commit only on full success.
    async fn execute_job(&self, message_id: &str, job: &TranscodeJob) {
        info!(
            video_id = %job.video_id,
            video_name = %job.video_name,
            file = %job.file_path,
            "Processing transcode job"
        );

        let backend = FfmpegEncodeBackend::new(self.config.segment_settle);
        let result = run_job(&self.config, backend, job).await;

        finish_job(self.queue.as_ref(), message_id, job, result).await;
    }
}

/// Select the ladder, run the orchestrator, and build the master playlist.
pub async fn run_job<B: EncodeBackend>(
    config: &WorkerConfig,
    backend: B,
    job: &TranscodeJob,
) -> WorkerResult<PathBuf> {
    let profiles = select_profiles(job.max_height);
    info!(
        video_id = %job.video_id,
        renditions = profiles.len(),
        "Selected rendition ladder"
    );

    let orchestrator = TranscodeOrchestrator::new(backend, config.clone());
    let variants = orchestrator.run(job, &profiles).await?;

    let video_dir = config.output_dir.join(&job.video_name);
    let playlist = write_master_playlist(&video_dir, &variants).await?;

    Ok(playlist)
}

/// Terminal handling for one delivery: commit exactly once on success,
/// otherwise leave the entry pending so the broker redelivers the whole job.
pub async fn finish_job<C: JobCommitter>(
    committer: &C,
    message_id: &str,
    job: &TranscodeJob,
    result: WorkerResult<PathBuf>,
) {
    match result {
        Ok(playlist) => {
            info!(
                video_id = %job.video_id,
                playlist = %playlist.display(),
                "Transcode job finished"
            );
            if let Err(e) = committer.commit(message_id).await {
                // The job itself succeeded; the uncommitted entry will be
                // redelivered and re-encoded in full (at-least-once).
                error!(video_id = %job.video_id, "Failed to commit job: {}", e);
            }
        }
        Err(e) => {
            error!(
                video_id = %job.video_id,
                "Transcode job failed, leaving message uncommitted for redelivery: {}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use hlsforge_media::MediaError;
    use hlsforge_models::VariantResult;
    use hlsforge_queue::QueueError;
    use tempfile::TempDir;
    use tokio::sync::{watch as watch_ch, Semaphore};

    use crate::encode::EncodeRequest;
    use crate::error::WorkerError;
    use crate::progress::ProgressTracker;

    struct CountingCommitter {
        commits: AtomicUsize,
        fail: bool,
    }

    impl CountingCommitter {
        fn new() -> Self {
            Self {
                commits: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl JobCommitter for CountingCommitter {
        async fn commit(&self, _message_id: &str) -> QueueResult<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(QueueError::publish_failed("commit refused"));
            }
            Ok(())
        }
    }

    /// Succeeds without touching ffmpeg; writes nothing.
    struct NoopBackend;

    #[async_trait]
    impl EncodeBackend for NoopBackend {
        async fn encode(
            &self,
            request: EncodeRequest,
            _tracker: Arc<ProgressTracker>,
            slots: Arc<Semaphore>,
            _cancel_rx: watch_ch::Receiver<bool>,
        ) -> Result<VariantResult, MediaError> {
            let _permit = slots
                .acquire_owned()
                .await
                .map_err(|_| MediaError::Cancelled)?;
            Ok(VariantResult {
                label: request.profile.label.clone(),
                target_height: request.profile.target_height,
                width: request.profile.target_height * 16 / 9,
                bandwidth_bps: 2_000_000,
                output_dir: request.output_dir,
            })
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl EncodeBackend for FailingBackend {
        async fn encode(
            &self,
            _request: EncodeRequest,
            _tracker: Arc<ProgressTracker>,
            _slots: Arc<Semaphore>,
            _cancel_rx: watch_ch::Receiver<bool>,
        ) -> Result<VariantResult, MediaError> {
            Err(MediaError::ffmpeg_failed("exit status 1", Some(1)))
        }
    }

    fn job() -> TranscodeJob {
        TranscodeJob::new("uploads/in.mp4", "clip", 60.0, 720)
    }

    fn config(dir: &TempDir) -> WorkerConfig {
        WorkerConfig {
            output_dir: dir.path().to_path_buf(),
            ..WorkerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_successful_job_writes_playlist_and_commits_once() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let job = job();

        let result = run_job(&config, NoopBackend, &job).await;
        let playlist = result.as_ref().unwrap().clone();
        assert!(playlist.ends_with("clip/master.m3u8"));
        assert!(playlist.exists());

        let committer = CountingCommitter::new();
        finish_job(&committer, "1-0", &job, result).await;
        assert_eq!(committer.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_job_commits_zero_times_and_writes_no_playlist() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let job = job();

        let result = run_job(&config, FailingBackend, &job).await;
        assert!(matches!(result, Err(WorkerError::EncodeFailed { .. })));
        assert!(!dir.path().join("clip/master.m3u8").exists());

        let committer = CountingCommitter::new();
        finish_job(&committer, "1-0", &job, result).await;
        assert_eq!(committer.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_does_not_retry_commit() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let job = job();

        let result = run_job(&config, NoopBackend, &job).await;

        let committer = CountingCommitter {
            commits: AtomicUsize::new(0),
            fail: true,
        };
        finish_job(&committer, "1-0", &job, result).await;
        assert_eq!(committer.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_playlist_lists_both_renditions_in_order() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let job = job(); // max_height 720 -> 360p + 720p

        let playlist = run_job(&config, NoopBackend, &job).await.unwrap();
        let contents = tokio::fs::read_to_string(playlist).await.unwrap();

        let pos_360 = contents.find("360p/index.m3u8").unwrap();
        let pos_720 = contents.find("720p/index.m3u8").unwrap();
        assert!(pos_360 < pos_720);
    }
}
