//! Transcode job descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job to transcode one uploaded video into an HLS package.
///
/// This is the queue wire format. Field names are the payload contract with
/// the upload endpoint and must stay snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    /// Unique video ID
    pub video_id: VideoId,
    /// Path of the stored source file
    pub file_path: String,
    /// Display name, also the output directory name and partition key
    pub video_name: String,
    /// Source duration in seconds
    pub duration: f64,
    /// Source video height in pixels, caps the rendition ladder
    pub max_height: u32,
    /// When the job was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl TranscodeJob {
    /// Create a new job from upload metadata.
    pub fn new(
        file_path: impl Into<String>,
        video_name: impl Into<String>,
        duration: f64,
        max_height: u32,
    ) -> Self {
        Self {
            video_id: VideoId::new(),
            file_path: file_path.into(),
            video_name: video_name.into(),
            duration,
            max_height,
            created_at: Utc::now(),
        }
    }

    /// Partition key for the queue (messages for one video stay ordered).
    pub fn partition_key(&self) -> &str {
        &self.video_name
    }
}
