//! Master playlist generation.

use std::path::{Path, PathBuf};
use tokio::fs;

use hlsforge_models::VariantResult;

use crate::error::{MediaError, MediaResult};

/// Write the HLS master playlist for a completed variant set.
///
/// Variants are listed in ascending target-height order regardless of the
/// order tasks finished in, each as a stream-info line plus the relative
/// path of its sub-manifest. An empty set is an error; a playlist with zero
/// entries is never written.
pub async fn write_master_playlist(
    video_dir: impl AsRef<Path>,
    variants: &[VariantResult],
) -> MediaResult<PathBuf> {
    if variants.is_empty() {
        return Err(MediaError::EmptyPlaylist);
    }

    let video_dir = video_dir.as_ref();
    fs::create_dir_all(video_dir).await?;

    let mut sorted = variants.to_vec();
    sorted.sort_by_key(|v| v.target_height);

    let mut contents = String::from("#EXTM3U\n");
    for variant in &sorted {
        contents.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n",
            variant.bandwidth_bps, variant.width, variant.target_height
        ));
        contents.push_str(&format!("{}/index.m3u8\n", variant.label));
    }

    let path = video_dir.join("master.m3u8");
    fs::write(&path, contents).await?;

    Ok(path)
}
