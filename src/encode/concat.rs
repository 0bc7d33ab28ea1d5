use crate::foundation::error::{ScenecastError, ScenecastResult};
use std::path::{Path, PathBuf};
use std::process::Command;

/// File name of the concat descriptor under the temp directory.
pub const CONCAT_DESCRIPTOR: &str = "concat.txt";

/// Render the ffconcat descriptor listing part files in part order.
pub fn concat_descriptor(part_paths: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in part_paths {
        // Single quotes inside a quoted ffconcat path are closed, escaped
        // and reopened.
        let escaped = path.display().to_string().replace('\'', "'\\''");
        out.push_str(&format!("file '{escaped}'\n"));
    }
    out
}

/// Write the concat descriptor into `temp_dir` and return its path.
pub fn write_concat_descriptor(temp_dir: &Path, part_paths: &[PathBuf]) -> ScenecastResult<PathBuf> {
    let path = temp_dir.join(CONCAT_DESCRIPTOR);
    std::fs::write(&path, concat_descriptor(part_paths)).map_err(|e| {
        ScenecastError::encoder(format!(
            "failed to write concat descriptor '{}': {e}",
            path.display()
        ))
    })?;
    Ok(path)
}

/// Argument list for merging the part files into the final output.
///
/// Raw mode stream-copies (remux); otherwise the merge re-encodes to
/// h264/yuv420p with faststart for broad compatibility.
pub fn concat_args(descriptor: &Path, raw_output: bool, out_path: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        descriptor.display().to_string(),
    ];
    if raw_output {
        args.extend(["-c".into(), "copy".into()]);
    } else {
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "+faststart".into(),
        ]);
    }
    args.push(out_path.display().to_string());
    args
}

/// Argument list for the photo path: extract the single frame of a
/// one-frame part into a still image.
pub fn photo_args(part_path: &Path, raw_output: bool, out_path: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        part_path.display().to_string(),
        "-frames:v".into(),
        "1".into(),
    ];
    if raw_output {
        // The stream already holds the requested image codec; copy it out.
        args.extend(["-c:v".into(), "copy".into()]);
    }
    args.push(out_path.display().to_string());
    args
}

/// Merge the part artifacts into the final output file.
///
/// `image_output` selects the photo path (single part, single frame, still
/// image destination). Failure is fatal for the run.
pub fn concatenate(
    temp_dir: &Path,
    part_paths: &[PathBuf],
    raw_output: bool,
    image_output: bool,
    out_path: &Path,
) -> ScenecastResult<()> {
    if part_paths.is_empty() {
        return Err(ScenecastError::encoder("no part artifacts to concatenate"));
    }

    let args = if image_output && part_paths.len() == 1 {
        photo_args(&part_paths[0], raw_output, out_path)
    } else {
        let descriptor = write_concat_descriptor(temp_dir, part_paths)?;
        concat_args(&descriptor, raw_output, out_path)
    };

    tracing::debug!(target: "scenecast::concat", ?args, "invoking ffmpeg");
    let output = Command::new("ffmpeg")
        .args(&args)
        .output()
        .map_err(|e| ScenecastError::encoder(format!("failed to run ffmpeg concat: {e}")))?;
    if !output.status.success() {
        return Err(ScenecastError::encoder(format!(
            "ffmpeg concat exited with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_lists_parts_in_order() {
        let parts = vec![
            PathBuf::from("/t/part 0-0-3.mkv"),
            PathBuf::from("/t/part 1-3-6.mkv"),
        ];
        assert_eq!(
            concat_descriptor(&parts),
            "file '/t/part 0-0-3.mkv'\nfile '/t/part 1-3-6.mkv'\n"
        );
    }

    #[test]
    fn descriptor_escapes_single_quotes() {
        let parts = vec![PathBuf::from("/t/it's/part 0-0-1.mkv")];
        assert_eq!(
            concat_descriptor(&parts),
            "file '/t/it'\\''s/part 0-0-1.mkv'\n"
        );
    }

    #[test]
    fn concat_args_remux_vs_transcode() {
        let raw = concat_args(Path::new("c.txt"), true, Path::new("out.mov")).join(" ");
        assert!(raw.contains("-f concat -safe 0 -i c.txt"));
        assert!(raw.contains("-c copy"));
        assert!(!raw.contains("libx264"));

        let enc = concat_args(Path::new("c.txt"), false, Path::new("out.mp4")).join(" ");
        assert!(enc.contains("-c:v libx264"));
        assert!(enc.contains("-pix_fmt yuv420p"));
        assert!(enc.contains("+faststart"));
    }

    #[test]
    fn photo_args_extract_one_frame() {
        let args = photo_args(Path::new("part 0-0-1.mkv"), true, Path::new("out.jpg")).join(" ");
        assert!(args.contains("-frames:v 1"));
        assert!(args.contains("-c:v copy"));
        assert!(args.ends_with("out.jpg"));

        let args = photo_args(Path::new("part 0-0-1.mkv"), false, Path::new("out.png")).join(" ");
        assert!(!args.contains("-c:v copy"));
    }
}
