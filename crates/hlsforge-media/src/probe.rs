//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bitrate in bits/second, 0 when unreported
    pub bitrate: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
}

/// Probe a media file for stream information.
///
/// Used both for source discovery at upload time and to verify what the
/// encoder actually produced. The bit rate is taken from the video stream
/// when present, else from the container; HLS segments often report it only
/// in one of the two.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("FFprobe failed for {}", path.display()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let bitrate = video_stream
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .filter(|&b| b > 0)
        .or_else(|| {
            probe
                .format
                .bit_rate
                .as_ref()
                .and_then(|b| b.parse::<u64>().ok())
        })
        .unwrap_or(0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        bitrate,
    })
}

/// Estimated bandwidth for a rendition whose probed bit rate came back
/// missing or zero, bracketed by target height. Without it the master
/// playlist would advertise BANDWIDTH=0 and players would never switch up.
pub fn fallback_bandwidth(target_height: u32) -> u64 {
    match target_height {
        0..=360 => 800_000,
        361..=720 => 2_500_000,
        721..=1080 => 5_000_000,
        1081..=1440 => 14_000_000,
        _ => 30_000_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_bandwidth_brackets() {
        assert_eq!(fallback_bandwidth(360), 800_000);
        assert_eq!(fallback_bandwidth(720), 2_500_000);
        assert_eq!(fallback_bandwidth(1080), 5_000_000);
        assert_eq!(fallback_bandwidth(1440), 14_000_000);
        assert_eq!(fallback_bandwidth(2160), 30_000_000);
    }

    #[test]
    fn test_fallback_bandwidth_between_brackets() {
        assert_eq!(fallback_bandwidth(480), 2_500_000);
        assert_eq!(fallback_bandwidth(240), 800_000);
    }

    #[test]
    fn test_ffprobe_json_stream_bitrate_preferred() {
        let raw = r#"{
            "format": {"duration": "12.5", "bit_rate": "900000"},
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1280, "height": 720, "bit_rate": "2400000"}
            ]
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(raw).unwrap();
        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type == "video")
            .unwrap();
        assert_eq!(video.width, Some(1280));
        assert_eq!(video.bit_rate.as_deref(), Some("2400000"));
        assert_eq!(probe.format.bit_rate.as_deref(), Some("900000"));
    }
}
