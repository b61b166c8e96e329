//! Encode tasks: one external encoder run per rendition.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info};

use hlsforge_media::{
    extract_time, fallback_bandwidth, percent, probe_video, time_to_seconds, FfmpegCommand,
    FfmpegRunner, MediaError, MediaResult,
};
use hlsforge_models::{RenditionProfile, VariantResult};

use crate::progress::ProgressTracker;

/// Everything one encode task needs to know.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Source file
    pub input: PathBuf,
    /// Rendition output directory (`<output>/<video_name>/<label>`)
    pub output_dir: PathBuf,
    /// Target rendition
    pub profile: RenditionProfile,
    /// Source duration in seconds, for percent computation
    pub total_duration: f64,
}

/// The encoder behind an encode task.
///
/// A trait seam so the orchestrator's concurrency and failure semantics are
/// testable without ffmpeg on the machine.
#[async_trait]
pub trait EncodeBackend: Send + Sync + 'static {
    /// Run one rendition to completion.
    ///
    /// `slots` bounds concurrently running encoder subprocesses; it must be
    /// held for the subprocess run only, not for directory setup. The
    /// cancellation signal must be honored at every launch and wait point.
    async fn encode(
        &self,
        request: EncodeRequest,
        tracker: Arc<ProgressTracker>,
        slots: Arc<Semaphore>,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<VariantResult>;
}

/// Real backend: drives ffmpeg and verifies its output with ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegEncodeBackend {
    /// Wait after encoder exit before scanning for segments
    pub segment_settle: Duration,
}

impl FfmpegEncodeBackend {
    pub fn new(segment_settle: Duration) -> Self {
        Self { segment_settle }
    }
}

#[async_trait]
impl EncodeBackend for FfmpegEncodeBackend {
    async fn encode(
        &self,
        request: EncodeRequest,
        tracker: Arc<ProgressTracker>,
        slots: Arc<Semaphore>,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<VariantResult> {
        let label = request.profile.label.clone();
        let target_height = request.profile.target_height;

        fs::create_dir_all(&request.output_dir).await?;

        if *cancel_rx.borrow() {
            return Err(MediaError::Cancelled);
        }

        // Gate the subprocess, not the setup above.
        let permit = slots
            .acquire_owned()
            .await
            .map_err(|_| MediaError::Cancelled)?;

        if *cancel_rx.borrow() {
            return Err(MediaError::Cancelled);
        }

        debug!(label = %label, "Starting encode");

        let cmd = FfmpegCommand::hls_rendition(&request.input, &request.output_dir, target_height);

        let status_label = label.clone();
        let status_tracker = Arc::clone(&tracker);
        let total_duration = request.total_duration;
        FfmpegRunner::new()
            .with_cancel(cancel_rx)
            .run_with_status(&cmd, move |line| {
                if let Some(elapsed) = extract_time(line).and_then(time_to_seconds) {
                    status_tracker.update(&status_label, percent(elapsed, total_duration));
                }
            })
            .await?;

        // The encoder has exited; the settle wait and probe below do not
        // need a slot.
        drop(permit);

        // Give the filesystem a moment to surface the segment files.
        tokio::time::sleep(self.segment_settle).await;

        let first_segment = find_first_segment(&request.output_dir).await?;

        let info = probe_video(&first_segment).await?;
        let bandwidth_bps = if info.bitrate > 0 {
            info.bitrate
        } else {
            fallback_bandwidth(target_height)
        };

        info!(
            label = %label,
            width = info.width,
            bandwidth_bps,
            "Rendition encoded and verified"
        );

        Ok(VariantResult {
            label,
            target_height,
            width: info.width,
            bandwidth_bps,
            output_dir: request.output_dir,
        })
    }
}

/// Locate the lowest-numbered `seg_*.ts` in a rendition directory.
async fn find_first_segment(dir: &Path) -> MediaResult<PathBuf> {
    let mut entries = fs::read_dir(dir).await?;
    let mut segments = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("seg_") && name.ends_with(".ts") {
            segments.push(entry.path());
        }
    }

    segments.sort();
    segments
        .into_iter()
        .next()
        .ok_or_else(|| MediaError::NoSegments(dir.to_path_buf()))
}
