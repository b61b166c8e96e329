//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent FFmpeg processes per job
    pub max_encode_processes: usize,
    /// Root directory for transcoded output
    pub output_dir: PathBuf,
    /// How long to wait after encoder exit before scanning for segments
    pub segment_settle: Duration,
    /// Progress bar redraw interval
    pub render_interval: Duration,
    /// How often to scan for orphaned pending jobs
    pub claim_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_encode_processes: 2,
            output_dir: PathBuf::from("output"),
            segment_settle: Duration::from_millis(500),
            render_interval: Duration::from_millis(200),
            claim_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_encode_processes: std::env::var("WORKER_MAX_ENCODES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("output")),
            segment_settle: Duration::from_millis(
                std::env::var("WORKER_SEGMENT_SETTLE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            render_interval: Duration::from_millis(
                std::env::var("WORKER_RENDER_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(200),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}
