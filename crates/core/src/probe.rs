//! Media probing via ffprobe

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Probe the duration of a media file in seconds
///
/// Best-effort: returns `None` when ffprobe is unavailable or the file has
/// no parsable duration (e.g. a raw elementary stream).
pub async fn media_duration(path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        tracing::debug!(path = %path.display(), "ffprobe exited with failure");
        return None;
    }

    let duration = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .ok()?;

    // Two decimals is plenty for history entries
    Some((duration * 100.0).round() / 100.0)
}
