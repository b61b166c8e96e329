//! FFmpeg stderr status-line parsing.
//!
//! FFmpeg reports encode position on stderr as `time=HH:MM:SS.ss` inside its
//! periodic status line. These are pure functions so progress math is
//! testable without a subprocess.

use std::sync::LazyLock;

use regex::Regex;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d{2}:\d{2}:\d{2}\.\d{2})").expect("valid time regex"));

/// Extract the `HH:MM:SS.ss` timestamp from a status line, if present.
pub fn extract_time(line: &str) -> Option<&str> {
    TIME_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Convert an `HH:MM:SS.ss` timestamp to seconds.
pub fn time_to_seconds(time_str: &str) -> Option<f64> {
    let mut parts = time_str.splitn(3, ':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// Percent of the total duration covered by `elapsed` seconds.
///
/// Not clamped upward: encoder timestamps can run past the container
/// duration, in which case this reads above 100.
pub fn percent(elapsed: f64, total_duration: f64) -> f64 {
    if total_duration <= 0.0 {
        return 0.0;
    }
    (elapsed / total_duration * 100.0).max(0.0)
}
