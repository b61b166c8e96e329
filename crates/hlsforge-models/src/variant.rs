//! Rendition profiles and encode results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One target resolution to encode.
///
/// Derived from a job by the ladder; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionProfile {
    /// Conventional name, e.g. "720p"; also the output subdirectory
    pub label: String,
    /// Target height in pixels
    pub target_height: u32,
}

impl RenditionProfile {
    pub fn new(label: impl Into<String>, target_height: u32) -> Self {
        Self {
            label: label.into(),
            target_height,
        }
    }
}

/// The verified result of one completed encode task.
///
/// Width and bandwidth come from probing an actual produced segment, not
/// from the requested parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantResult {
    /// Rendition label, e.g. "720p"
    pub label: String,
    /// Requested target height in pixels
    pub target_height: u32,
    /// Actual encoded width in pixels
    pub width: u32,
    /// Measured (or fallback) bit rate in bits per second
    pub bandwidth_bps: u64,
    /// Directory holding the sub-manifest and segments
    pub output_dir: PathBuf,
}
