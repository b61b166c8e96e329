//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path (for HLS, the sub-manifest)
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Create the fixed command for one HLS rendition: scale to the target
    /// height preserving aspect ratio (width forced even), libx264/aac,
    /// 10-second VOD segments named `seg_%03d.ts` in `output_dir`.
    pub fn hls_rendition(
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        target_height: u32,
    ) -> Self {
        let output_dir = output_dir.as_ref();
        Self::new(input, output_dir.join("index.m3u8"))
            .video_filter(format!("scale=-2:{target_height}"))
            .video_codec("libx264")
            .audio_codec("aac")
            .hls_time(10)
            .hls_playlist_type("vod")
            .hls_segment_filename(output_dir.join("seg_%03d.ts"))
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-codec:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-codec:a").output_arg(codec)
    }

    /// Set HLS segment duration in seconds.
    pub fn hls_time(self, seconds: u32) -> Self {
        self.output_arg("-hls_time").output_arg(seconds.to_string())
    }

    /// Set HLS playlist type.
    pub fn hls_playlist_type(self, kind: impl Into<String>) -> Self {
        self.output_arg("-hls_playlist_type").output_arg(kind)
    }

    /// Set HLS segment filename pattern.
    pub fn hls_segment_filename(self, pattern: impl AsRef<Path>) -> Self {
        self.output_arg("-hls_segment_filename")
            .output_arg(pattern.as_ref().to_string_lossy().to_string())
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Keep the periodic status line (time=...) even at -v error
        args.push("-stats".to_string());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with status parsing and cancellation.
#[derive(Default)]
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Run an FFmpeg command, feeding each stderr status chunk to `on_status`.
    ///
    /// If the cancellation signal fires while the encoder runs, the
    /// subprocess is killed and `MediaError::Cancelled` is returned.
    pub async fn run_with_status<F>(&self, cmd: &FfmpegCommand, on_status: F) -> MediaResult<()>
    where
        F: Fn(&str) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("stderr not captured", None)
        })?;

        // The status line is terminated with carriage returns, not newlines,
        // so split on \r to see each update.
        let status_task = tokio::spawn(async move {
            let mut chunks = BufReader::new(stderr).split(b'\r');
            while let Ok(Some(chunk)) = chunks.next_segment().await {
                let text = String::from_utf8_lossy(&chunk);
                for line in text.lines() {
                    on_status(line);
                }
            }
        });

        // Poll exit and cancellation together; the kill happens outside the
        // select so the wait future's borrow of the child has ended.
        let wait_result = match self.cancel_rx.clone() {
            Some(cancel_rx) => {
                tokio::select! {
                    status = child.wait() => Some(status),
                    _ = wait_cancelled(cancel_rx) => None,
                }
            }
            None => Some(child.wait().await),
        };

        let status = match wait_result {
            Some(status) => status,
            None => {
                info!("Encode cancelled, killing ffmpeg");
                child.kill().await.ok();
                let _ = child.wait().await;
                let _ = status_task.await;
                return Err(MediaError::Cancelled);
            }
        };

        let _ = status_task.await;

        let status = status?;

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                status.code(),
            ))
        }
    }
}

/// Resolve once the watch value becomes true; pend forever if the sender is
/// gone (a dropped sender must not read as a cancellation).
async fn wait_cancelled(mut cancel_rx: watch::Receiver<bool>) {
    if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
