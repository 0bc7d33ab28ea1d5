use crate::foundation::error::{ScenecastError, ScenecastResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How frames are captured from the browser page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMethod {
    /// Attach to the DevTools screencast stream; lowest overhead, headless
    /// or headed modes that support it only.
    Screencast,
    /// Ask a pre-loaded browser extension to grab the visible tab.
    /// Incompatible with headless.
    Extension,
    /// Call the page screenshot primitive. Highest overhead, most portable.
    Screenshot,
}

/// Encoded image format produced by the capturer and consumed by the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG frames (mjpeg stream on the encoder side).
    Jpeg,
    /// PNG frames.
    Png,
}

impl ImageFormat {
    /// Still-image file extension for single-frame outputs.
    pub fn image_ext(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Input codec name passed to the encoder's `image2pipe` demuxer.
    pub fn pipe_codec(self) -> &'static str {
        match self {
            Self::Jpeg => "mjpeg",
            Self::Png => "png",
        }
    }

    /// Container extension for raw (remux-only) multi-frame outputs.
    pub fn raw_container_ext(self) -> &'static str {
        match self {
            Self::Jpeg => "mov",
            Self::Png => "mkv",
        }
    }
}

fn default_fps() -> u32 {
    30
}

fn default_concurrency() -> usize {
    1
}

fn default_jpeg_quality() -> u32 {
    100
}

fn default_frame_timeout_ms() -> u64 {
    30_000
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

/// Immutable configuration for one render run.
///
/// Deserializes from a JSON job file; field names are camelCase for parity
/// with the record forwarded to the scene page.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    /// First frame to render (absolute, 0-based).
    #[serde(default)]
    pub start_frame: u64,
    /// Number of frames to render. Must be >= 1.
    pub duration_frames: u64,
    /// Output frames per second. Must be >= 1.
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Requested worker count; clamped to `duration_frames` by [`Self::workers`].
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Frame capture strategy, fixed for the whole run.
    #[serde(default = "default_capture_method")]
    pub capture_method: CaptureMethod,
    /// Captured image format.
    #[serde(default = "default_image_format")]
    pub image_format: ImageFormat,
    /// JPEG quality in [1, 100]; ignored for PNG.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u32,
    /// End-to-end budget for a single frame (render + readiness + capture +
    /// encoder write), in milliseconds.
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_render_timeout_ms: u64,
    /// Network-idle quiet period required before capture, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// When true the concatenator only remuxes; otherwise it re-encodes to a
    /// standard container.
    #[serde(default)]
    pub raw_output: bool,
    /// Treat page-reported render errors as fatal.
    #[serde(default)]
    pub fail_on_page_errors: bool,
    /// Probe the final output and assert its frame count.
    #[serde(default)]
    pub enable_frame_count_check: bool,
    /// Record per-frame digests and reject consecutive duplicates.
    #[serde(default)]
    pub enable_hash_check: bool,
    /// Opaque blob forwarded to the scene page untouched.
    #[serde(default)]
    pub user_data: serde_json::Value,
    /// Scene component the page should mount, when it hosts several.
    #[serde(default)]
    pub video_component_type: Option<String>,
    /// Unpacked capture extension pre-loaded at browser startup; required
    /// by the `extension` capture method.
    #[serde(default)]
    pub extension_dir: Option<PathBuf>,
    /// Pre-built scene page: either the `dist/` directory or its
    /// `index.html` directly.
    pub scene_entry: PathBuf,
    /// Scratch directory for part artifacts and the concat descriptor.
    pub temp_dir: PathBuf,
    /// Final artifact path; derived from the run shape when unset.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    /// Launch the browser headless.
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Forwarded to the page init record; enables page-side diagnostics.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_capture_method() -> CaptureMethod {
    CaptureMethod::Screenshot
}

fn default_image_format() -> ImageFormat {
    ImageFormat::Jpeg
}

impl RenderConfig {
    /// Validate the configuration.
    ///
    /// Runs before any external resource (browser, subprocess, temp file) is
    /// allocated; every rejection here is a [`ScenecastError::Config`].
    pub fn validate(&self) -> ScenecastResult<()> {
        if self.duration_frames == 0 {
            return Err(ScenecastError::config("durationFrames must be >= 1"));
        }
        if self.fps == 0 {
            return Err(ScenecastError::config("fps must be >= 1"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ScenecastError::config("width and height must be non-zero"));
        }
        if self.concurrency == 0 {
            return Err(ScenecastError::config("concurrency must be >= 1"));
        }
        if self.image_format == ImageFormat::Jpeg
            && !(1..=100).contains(&self.jpeg_quality)
        {
            return Err(ScenecastError::config("jpegQuality must be in [1, 100]"));
        }
        if self.capture_method == CaptureMethod::Extension && self.headless {
            return Err(ScenecastError::config(
                "the 'extension' capture method cannot run headless",
            ));
        }
        Ok(())
    }

    /// Effective worker count: `concurrency` clamped to `duration_frames`.
    pub fn workers(&self) -> usize {
        let duration = usize::try_from(self.duration_frames).unwrap_or(usize::MAX);
        self.concurrency.min(duration).max(1)
    }

    /// Per-frame timeout envelope.
    pub fn frame_render_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_render_timeout_ms)
    }

    /// Network-idle quiet period.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Path of the page entry document (`index.html` under a `dist/` entry).
    pub fn entry_document(&self) -> PathBuf {
        if self.scene_entry.is_dir() {
            self.scene_entry.join("index.html")
        } else {
            self.scene_entry.clone()
        }
    }

    /// The final artifact path: `output_path` when set, otherwise derived
    /// from the run shape in the current working directory.
    ///
    /// Single-frame runs default to a still image; raw multi-frame runs to a
    /// container matching the image stream (`.mov` for mjpeg, `.mkv` for
    /// png); transcoded runs to `.mp4`.
    pub fn resolved_output_path(&self) -> PathBuf {
        if let Some(path) = &self.output_path {
            return path.clone();
        }
        let ext = if self.duration_frames == 1 {
            self.image_format.image_ext()
        } else if self.raw_output {
            self.image_format.raw_container_ext()
        } else {
            "mp4"
        };
        PathBuf::from(format!("output.{ext}"))
    }

    /// True when the resolved output is a still image (the photo path).
    pub fn is_image_output(&self) -> bool {
        let out = self.resolved_output_path();
        matches!(
            out.extension().and_then(|e| e.to_str()),
            Some("jpg") | Some("jpeg") | Some("png")
        )
    }

    /// Load a job file.
    pub fn from_path(path: &Path) -> ScenecastResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ScenecastError::config(format!("failed to read job file '{}': {e}", path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ScenecastError::config(format!("invalid job file '{}': {e}", path.display()))
        })
    }
}
