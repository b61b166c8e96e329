//! The rendition ladder.

use crate::variant::RenditionProfile;

/// Standard ladder rungs, ascending.
pub const LADDER: [u32; 5] = [360, 720, 1080, 1440, 2160];

/// Select the renditions to produce for a source of the given height.
///
/// Returns every ladder rung at or below the source height, labeled by its
/// conventional name ("720p"), ascending. Sources shorter than the smallest
/// rung get a single "original" profile at their own height, so upscaling is
/// never produced.
pub fn select_profiles(source_max_height: u32) -> Vec<RenditionProfile> {
    let profiles: Vec<RenditionProfile> = LADDER
        .iter()
        .filter(|&&rung| rung <= source_max_height)
        .map(|&rung| RenditionProfile::new(format!("{rung}p"), rung))
        .collect();

    if profiles.is_empty() {
        return vec![RenditionProfile::new("original", source_max_height)];
    }

    profiles
}
