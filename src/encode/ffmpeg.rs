use crate::config::ImageFormat;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ScenecastError, ScenecastResult};
use crate::partition::Part;
use crate::encode::sink::{PartSink, SinkFactory};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Options for one per-part encoder subprocess.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Part artifact path (always `.mkv`).
    pub out_path: PathBuf,
    /// Image format of the incoming stream.
    pub image_format: ImageFormat,
    /// Input framerate.
    pub fps: u32,
}

/// Encoder sink that spawns the system `ffmpeg` and streams encoded frame
/// images to its stdin.
///
/// Backpressure is per-write: `write` returns only once `write_all` has
/// been acknowledged by the OS. Draining buffer events was observed to hang
/// on some platforms in the source system and is deliberately not used.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    last: Option<FrameIndex>,
}

impl FfmpegSink {
    /// Create a sink; the subprocess is spawned by [`PartSink::open`].
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            last: None,
        }
    }

    fn drain_stderr(&mut self) -> Vec<u8> {
        match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .ok()
                .and_then(|r| r.ok())
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

/// Argument list for the per-part encoder invocation: an `image2pipe`
/// stream on stdin, stream-copied into a Matroska part file.
pub fn part_stream_args(format: ImageFormat, fps: u32, out_path: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "image2pipe".into(),
        "-vcodec".into(),
        format.pipe_codec().into(),
        "-framerate".into(),
        fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-f".into(),
        "matroska".into(),
        out_path.display().to_string(),
    ]
}

impl PartSink for FfmpegSink {
    fn open(&mut self) -> ScenecastResult<()> {
        ensure_parent_dir(&self.opts.out_path)?;
        if !is_ffmpeg_on_path() {
            return Err(ScenecastError::encoder(
                "ffmpeg is required for encoding, but was not found on PATH",
            ));
        }

        let mut child = Command::new("ffmpeg")
            .args(part_stream_args(
                self.opts.image_format,
                self.opts.fps,
                &self.opts.out_path,
            ))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ScenecastError::encoder(format!("failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ScenecastError::encoder("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ScenecastError::encoder("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.last = None;
        Ok(())
    }

    fn write(&mut self, frame: FrameIndex, bytes: &[u8]) -> ScenecastResult<()> {
        if let Some(last) = self.last {
            if frame.0 <= last.0 {
                return Err(ScenecastError::encoder(format!(
                    "out-of-order frame {} after {}",
                    frame.0, last.0
                )));
            }
        }
        self.last = Some(frame);

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ScenecastError::encoder("encoder sink is not open"))?;
        stdin.write_all(bytes).map_err(|e| {
            ScenecastError::encoder(format!(
                "failed to write frame {} to encoder stdin (encoder may have exited): {e}",
                frame.0
            ))
        })
    }

    fn end(&mut self) -> ScenecastResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ScenecastError::encoder("encoder sink is not open"))?;

        let status = child
            .wait()
            .map_err(|e| ScenecastError::encoder(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = self.drain_stderr();

        if !status.success() {
            return Err(ScenecastError::encoder(format!(
                "ffmpeg exited with status {} for '{}': {}",
                status,
                self.opts.out_path.display(),
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        Ok(())
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let _ = self.drain_stderr();
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // A sink dropped without end() must not leak the subprocess.
        self.kill();
    }
}

/// Factory producing one [`FfmpegSink`] per part under `temp_dir`.
pub struct FfmpegSinkFactory {
    /// Scratch directory receiving part artifacts.
    pub temp_dir: PathBuf,
    /// Image format of the captured frames.
    pub image_format: ImageFormat,
    /// Input framerate.
    pub fps: u32,
}

impl SinkFactory for FfmpegSinkFactory {
    fn create(&self, part: &Part) -> ScenecastResult<Box<dyn PartSink>> {
        Ok(Box::new(FfmpegSink::new(FfmpegSinkOpts {
            out_path: part.artifact_path(&self.temp_dir),
            image_format: self.image_format,
            fps: self.fps,
        })))
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ScenecastResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            use anyhow::Context as _;
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory '{}'", parent.display())
            })?;
        }
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
