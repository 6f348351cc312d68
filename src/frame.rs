use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Frame position for a timestamp, using the stream's reported frame rate
pub fn frame_index(second: f64, fps: f64) -> u64 {
    (second * fps) as u64
}

/// Probe the video's frame rate with ffprobe
pub async fn probe_fps(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("failed to execute ffprobe")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe failed with status {:?}", output.status);
    }

    let raw = String::from_utf8(output.stdout).context("ffprobe output is not valid UTF-8")?;

    parse_frame_rate(raw.trim())
}

/// Parse an ffprobe rational frame rate such as "30/1" or "30000/1001"
fn parse_frame_rate(raw: &str) -> Result<f64> {
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num
                .trim()
                .parse()
                .context("failed to parse frame rate numerator")?;
            let den: f64 = den
                .trim()
                .parse()
                .context("failed to parse frame rate denominator")?;
            if den == 0.0 {
                anyhow::bail!("frame rate denominator is zero");
            }
            num / den
        }
        None => raw.trim().parse().context("failed to parse frame rate")?,
    };

    if !fps.is_finite() || fps <= 0.0 {
        anyhow::bail!("unusable frame rate: {raw}");
    }

    Ok(fps)
}

/// Decode the frame at the given index as PNG bytes.
///
/// An unreadable file, a missing video stream, or an index past
/// end-of-stream all surface here as errors the caller can soften.
pub async fn extract_frame_png(path: &Path, index: u64) -> Result<Vec<u8>> {
    debug!(path = %path.display(), index, "extracting frame");

    let select_filter = format!("select=eq(n\\,{index})");

    let output = Command::new("ffmpeg")
        .arg("-i")
        .arg(path)
        .args([
            "-vf",
            select_filter.as_str(),
            "-vframes",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "png",
            "pipe:1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .context("failed to execute ffmpeg")?;

    if !output.status.success() {
        anyhow::bail!("ffmpeg exited with error: {:?}", output.status);
    }

    if output.stdout.is_empty() {
        warn!(path = %path.display(), index, "ffmpeg returned no frame data");
        anyhow::bail!("no frame decoded at index {index}");
    }

    debug!(
        path = %path.display(),
        index,
        size_bytes = output.stdout.len(),
        "frame extracted"
    );

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index_at_30fps() {
        assert_eq!(frame_index(2.0, 30.0), 60);
        assert_eq!(frame_index(4.2, 30.0), 126);
        assert_eq!(frame_index(0.0, 30.0), 0);
    }

    #[test]
    fn test_frame_index_truncates() {
        // 1.9 * 29.97 = 56.94 -> frame 56
        assert_eq!(frame_index(1.9, 29.97), 56);
    }

    #[test]
    fn test_parse_rational_frame_rate() {
        assert_eq!(parse_frame_rate("30/1").unwrap(), 30.0);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_plain_frame_rate() {
        assert_eq!(parse_frame_rate("25").unwrap(), 25.0);
    }

    #[test]
    fn test_parse_frame_rate_rejects_garbage() {
        assert!(parse_frame_rate("").is_err());
        assert!(parse_frame_rate("abc").is_err());
        assert!(parse_frame_rate("30/0").is_err());
        assert!(parse_frame_rate("0/0").is_err());
        assert!(parse_frame_rate("0/1").is_err());
    }
}
