//! Per-job transcode orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hlsforge_media::MediaResult;
use hlsforge_models::{RenditionProfile, TranscodeJob, VariantResult};

use crate::config::WorkerConfig;
use crate::encode::{EncodeBackend, EncodeRequest};
use crate::error::{WorkerError, WorkerResult};
use crate::progress::{spawn_renderer, ProgressTracker};

/// Lifecycle of one job inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Running,
    Aggregating,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Pending => "pending",
            JobPhase::Running => "running",
            JobPhase::Aggregating => "aggregating",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
        }
    }
}

/// Fans one job out into per-rendition encode tasks and aggregates the
/// outcomes all-or-nothing.
///
/// At most `max_encode_processes` encoder subprocesses run at once however
/// many renditions the job has. A single watch channel carries cancellation:
/// the first task failure fires it, every in-flight encoder is killed in
/// response, and the progress renderer does its final redraw off the same
/// signal.
pub struct TranscodeOrchestrator<B: EncodeBackend> {
    backend: Arc<B>,
    tracker: Arc<ProgressTracker>,
    encode_slots: Arc<Semaphore>,
    config: WorkerConfig,
}

impl<B: EncodeBackend> TranscodeOrchestrator<B> {
    pub fn new(backend: B, config: WorkerConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            tracker: Arc::new(ProgressTracker::new()),
            encode_slots: Arc::new(Semaphore::new(config.max_encode_processes)),
            config,
        }
    }

    /// The progress tracker owned by this orchestrator.
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    /// Run every rendition of a job to completion.
    ///
    /// Succeeds only if every task succeeded; a single failure discards all
    /// collected variants and surfaces one aggregated error.
    pub async fn run(
        &self,
        job: &TranscodeJob,
        profiles: &[RenditionProfile],
    ) -> WorkerResult<Vec<VariantResult>> {
        let video_id = job.video_id.to_string();
        let mut phase = JobPhase::Pending;
        let labels: Vec<String> = profiles.iter().map(|p| p.label.clone()).collect();

        self.tracker.reset(&labels);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);

        let renderer = spawn_renderer(
            Arc::clone(&self.tracker),
            labels,
            self.config.render_interval,
            cancel_rx.clone(),
        );

        phase = self.transition(&video_id, phase, JobPhase::Running);

        let video_dir = self.config.output_dir.join(&job.video_name);
        let handles: Vec<JoinHandle<(String, MediaResult<VariantResult>)>> = profiles
            .iter()
            .map(|profile| {
                self.spawn_task(job, profile, &video_dir, &cancel_tx, cancel_rx.clone())
            })
            .collect();

        phase = self.transition(&video_id, phase, JobPhase::Aggregating);

        let mut variants = Vec::with_capacity(handles.len());
        let mut failure: Option<WorkerError> = None;
        for handle in handles {
            match handle.await {
                Ok((_, Ok(variant))) => variants.push(variant),
                Ok((label, Err(e))) => {
                    let err = WorkerError::encode_failed(label, e);
                    record_failure(&mut failure, err);
                }
                Err(join_err) => {
                    error!(video_id = %video_id, "Encode task panicked: {}", join_err);
                    record_failure(&mut failure, WorkerError::TaskPanicked(join_err.to_string()));
                }
            }
        }

        // Terminal transition: stop the renderer and trigger its final
        // redraw (already fired early if a task failed).
        cancel_tx.send(true).ok();
        let _ = renderer.await;

        match failure {
            Some(err) => {
                self.transition(&video_id, phase, JobPhase::Failed);
                warn!(
                    video_id = %video_id,
                    discarded = variants.len(),
                    "Job failed, discarding partial results: {}", err
                );
                Err(err)
            }
            None => {
                self.transition(&video_id, phase, JobPhase::Completed);
                info!(video_id = %video_id, variants = variants.len(), "All renditions encoded");
                Ok(variants)
            }
        }
    }

    fn spawn_task(
        &self,
        job: &TranscodeJob,
        profile: &RenditionProfile,
        video_dir: &Path,
        cancel_tx: &Arc<watch::Sender<bool>>,
        cancel_rx: watch::Receiver<bool>,
    ) -> JoinHandle<(String, MediaResult<VariantResult>)> {
        let request = EncodeRequest {
            input: PathBuf::from(&job.file_path),
            output_dir: video_dir.join(&profile.label),
            profile: profile.clone(),
            total_duration: job.duration,
        };
        let label = profile.label.clone();
        let backend = Arc::clone(&self.backend);
        let tracker = Arc::clone(&self.tracker);
        let slots = Arc::clone(&self.encode_slots);
        let cancel_tx = Arc::clone(cancel_tx);

        tokio::spawn(async move {
            let result = backend.encode(request, tracker, slots, cancel_rx).await;

            if let Err(ref e) = result {
                // A cancelled task is an echo, not a cause; only real
                // failures pull the trigger.
                if !matches!(e, hlsforge_media::MediaError::Cancelled) {
                    warn!(label = %label, "Encode task failed, cancelling job: {}", e);
                    cancel_tx.send(true).ok();
                }
            }

            (label, result)
        })
    }

    fn transition(&self, video_id: &str, from: JobPhase, to: JobPhase) -> JobPhase {
        debug!(video_id = %video_id, from = from.as_str(), to = to.as_str(), "Job phase");
        to
    }
}

fn record_failure(slot: &mut Option<WorkerError>, err: WorkerError) {
    match slot {
        None => *slot = Some(err),
        // Prefer a root cause over a cancellation echo.
        Some(existing) if existing.is_cancellation() && !err.is_cancellation() => {
            *slot = Some(err)
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use hlsforge_media::MediaError;
    use hlsforge_models::select_profiles;

    /// Instrumented in-memory encoder: counts concurrent runs, fails on
    /// demand, and honors cancellation the way the real backend does.
    struct FakeBackend {
        running: AtomicUsize,
        max_running: AtomicUsize,
        fail_labels: Vec<&'static str>,
        encode_duration: Duration,
    }

    impl FakeBackend {
        fn new(encode_duration: Duration) -> Self {
            Self {
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                fail_labels: Vec::new(),
                encode_duration,
            }
        }

        fn failing_on(mut self, labels: Vec<&'static str>) -> Self {
            self.fail_labels = labels;
            self
        }
    }

    #[async_trait]
    impl EncodeBackend for FakeBackend {
        async fn encode(
            &self,
            request: EncodeRequest,
            tracker: Arc<ProgressTracker>,
            slots: Arc<Semaphore>,
            mut cancel_rx: watch::Receiver<bool>,
        ) -> MediaResult<VariantResult> {
            let label = request.profile.label.clone();

            let _permit = slots
                .acquire_owned()
                .await
                .map_err(|_| MediaError::Cancelled)?;
            if *cancel_rx.borrow() {
                return Err(MediaError::Cancelled);
            }

            if self.fail_labels.contains(&label.as_str()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
                return Err(MediaError::ffmpeg_failed("exit status 1", Some(1)));
            }

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(self.encode_duration) => false,
                _ = cancel_rx.wait_for(|c| *c) => true,
            };

            self.running.fetch_sub(1, Ordering::SeqCst);

            if cancelled {
                return Err(MediaError::Cancelled);
            }

            tracker.update(&label, 100.0);
            Ok(VariantResult {
                label,
                target_height: request.profile.target_height,
                width: request.profile.target_height * 16 / 9,
                bandwidth_bps: 1_000_000,
                output_dir: request.output_dir,
            })
        }
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            max_encode_processes: 2,
            render_interval: Duration::from_millis(50),
            ..WorkerConfig::default()
        }
    }

    fn test_job() -> TranscodeJob {
        TranscodeJob::new("uploads/in.mp4", "testvid", 120.0, 2160)
    }

    #[tokio::test]
    async fn test_all_profiles_succeed() {
        let orchestrator = TranscodeOrchestrator::new(
            FakeBackend::new(Duration::from_millis(20)),
            test_config(),
        );
        let job = test_job();
        let profiles = select_profiles(job.max_height);

        let variants = orchestrator.run(&job, &profiles).await.unwrap();

        assert_eq!(variants.len(), 5);
        let mut labels: Vec<String> = variants.into_iter().map(|v| v.label).collect();
        labels.sort();
        assert!(labels.contains(&"2160p".to_string()));
    }

    #[tokio::test]
    async fn test_at_most_two_concurrent_encodes_for_five_profiles() {
        let orchestrator = TranscodeOrchestrator::new(
            FakeBackend::new(Duration::from_millis(50)),
            test_config(),
        );
        let job = test_job();
        let profiles = select_profiles(2160);
        assert_eq!(profiles.len(), 5);

        orchestrator.run(&job, &profiles).await.unwrap();

        let max = orchestrator.backend.max_running.load(Ordering::SeqCst);
        assert!(max <= 2, "observed {max} concurrent encodes");
        assert!(max >= 1);
    }

    #[tokio::test]
    async fn test_single_failure_discards_all_variants() {
        let orchestrator = TranscodeOrchestrator::new(
            FakeBackend::new(Duration::from_millis(20)).failing_on(vec!["1080p"]),
            test_config(),
        );
        let job = test_job();
        let profiles = select_profiles(2160);

        let result = orchestrator.run(&job, &profiles).await;

        match result {
            Err(WorkerError::EncodeFailed { label, .. }) => assert_eq!(label, "1080p"),
            other => panic!("expected aggregated encode failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_cancels_inflight_tasks_quickly() {
        // First profile fails almost immediately; the rest would run for
        // seconds if cancellation did not reach them.
        let orchestrator = TranscodeOrchestrator::new(
            FakeBackend::new(Duration::from_secs(10)).failing_on(vec!["360p"]),
            test_config(),
        );
        let job = test_job();
        let profiles = select_profiles(2160);

        let started = Instant::now();
        let result = orchestrator.run(&job, &profiles).await;

        assert!(result.is_err());
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "cancellation did not propagate, took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_root_cause_preferred_over_cancellation() {
        let orchestrator = TranscodeOrchestrator::new(
            FakeBackend::new(Duration::from_secs(10)).failing_on(vec!["720p"]),
            test_config(),
        );
        let job = test_job();
        let profiles = select_profiles(1080);

        let err = orchestrator.run(&job, &profiles).await.unwrap_err();

        assert!(!err.is_cancellation(), "got cancellation echo: {err}");
    }

    #[tokio::test]
    async fn test_tracker_reset_before_dispatch() {
        let orchestrator = TranscodeOrchestrator::new(
            FakeBackend::new(Duration::from_millis(10)),
            test_config(),
        );
        let tracker = orchestrator.tracker();
        tracker.update("leftover", 80.0);

        let job = test_job();
        orchestrator.run(&job, &select_profiles(720)).await.unwrap();

        let snapshot = tracker.snapshot();
        assert!(!snapshot.contains_key("leftover"));
        assert!(snapshot.contains_key("360p"));
        assert!(snapshot.contains_key("720p"));
    }
}
