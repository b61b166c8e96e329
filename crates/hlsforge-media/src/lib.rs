//! FFmpeg CLI wrapper for HLS transcoding.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building for segmented HLS output
//! - Stderr status-line parsing (`time=` token) for progress
//! - Cancellation support via tokio watch channels
//! - FFprobe wrappers for source discovery and rendition verification
//! - Master playlist generation

pub mod command;
pub mod error;
pub mod parse;
pub mod playlist;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use parse::{extract_time, percent, time_to_seconds};
pub use playlist::write_master_playlist;
pub use probe::{fallback_bandwidth, probe_video, VideoInfo};
