use crate::foundation::error::{ScenecastError, ScenecastResult};
use std::path::Path;
use std::process::Command;

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    nb_read_frames: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    streams: Vec<ProbeStream>,
}

/// Count the decoded frames of `path` through `ffprobe`.
pub fn count_frames(path: &Path) -> ScenecastResult<u64> {
    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-count_frames",
        ])
        .arg(path)
        .output()
        .map_err(|e| ScenecastError::encoder(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ScenecastError::encoder(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    parse_frame_count(&out.stdout)
        .map_err(|msg| ScenecastError::encoder(format!("'{}': {msg}", path.display())))
}

fn parse_frame_count(json: &[u8]) -> Result<u64, String> {
    let parsed: ProbeOut =
        serde_json::from_slice(json).map_err(|e| format!("ffprobe json parse failed: {e}"))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or("no video stream found")?;
    let count = video
        .nb_read_frames
        .as_deref()
        .ok_or("missing frame count from ffprobe")?;
    count
        .parse::<u64>()
        .map_err(|e| format!("unparseable frame count '{count}': {e}"))
}
