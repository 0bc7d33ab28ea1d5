use crate::config::ImageFormat;
use crate::foundation::error::ScenecastResult;
use std::time::Duration;

/// Initialization record handed to the scene page once per part.
///
/// Serialized camelCase; the page runtime consumes it verbatim.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInit {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Frames per second of the run.
    pub fps: u32,
    /// Local media-service port, when one is attached to the run.
    pub server_port: Option<u16>,
    /// Total frames in the run (not the part).
    pub duration_frames: u64,
    /// Per-worker identifier: the part's first frame. Lets the media
    /// service scope server-side resources per worker.
    pub render_id: u64,
    /// Opaque user payload forwarded untouched.
    pub user_data: serde_json::Value,
    /// Scene component to mount, when the page hosts several.
    pub video_component_type: Option<String>,
    /// Capture format the page should assume.
    pub image_format: ImageFormat,
    /// JPEG quality for capture paths that encode in-page.
    pub jpeg_quality: u32,
    /// Per-run shared secret echoed on every media-service request.
    pub secret: String,
    /// Enables page-side diagnostics.
    pub dev_mode: bool,
}

/// One error descriptor reported by the page's render entry.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct PageRenderError {
    /// Human-readable message.
    pub message: String,
}

/// One browser page bound to one part, driven frame-by-frame.
///
/// The readiness conditions are exposed as individual predicates rather
/// than composite waits so the driver can poll each stage against the
/// frame's shared deadline. Implementations must not block inside the
/// predicates.
pub trait ScenePage: Send {
    /// Navigate to the pre-built scene document and wait for the load to
    /// commit.
    fn navigate(&mut self, url: &str) -> ScenecastResult<()>;

    /// Return `true` when the page exposes the initialization entry point.
    ///
    /// A missing entry means the page never finished loading or the bundle
    /// is broken; the part fails.
    fn has_init_entry(&mut self) -> ScenecastResult<bool>;

    /// Call the page's initialization entry; returns once the scene runtime
    /// is ready.
    fn init(&mut self, init: &PageInit) -> ScenecastResult<()>;

    /// Command the page to render `frame`; returns the error descriptors
    /// gathered during the render.
    fn render_frame(&mut self, frame: u64) -> ScenecastResult<Vec<PageRenderError>>;

    /// Font-readiness predicate.
    fn fonts_ready(&mut self) -> ScenecastResult<bool>;

    /// Return `true` while the DOM marker for `frame` exists.
    fn frame_marker_present(&mut self, frame: u64) -> ScenecastResult<bool>;

    /// Return `true` once all outstanding async rendering work the scene
    /// knows about has drained.
    fn render_settled(&mut self) -> ScenecastResult<bool>;

    /// Return `true` when no network request has been in flight for at
    /// least `quiet`.
    fn network_quiet_for(&mut self, quiet: Duration) -> ScenecastResult<bool>;

    /// Capture the page via its screenshot primitive.
    fn screenshot(&mut self, format: ImageFormat, quality: Option<u32>) -> ScenecastResult<Vec<u8>>;

    /// Await the next frame buffer from the screencast stream.
    fn next_screencast_frame(&mut self, deadline: std::time::Instant) -> ScenecastResult<Vec<u8>>;

    /// Ask the pre-loaded extension to grab the visible tab.
    fn grab_visible_tab(&mut self) -> ScenecastResult<Vec<u8>>;

    /// Close the page. Best-effort; called on every exit path.
    fn close(&mut self);
}

/// Shared browser process; pages are created per part.
pub trait Browser: Sync {
    /// Open a fresh page sized to the run's viewport.
    fn new_page(&self) -> ScenecastResult<Box<dyn ScenePage>>;

    /// Close the browser. Best-effort; called once during cleanup.
    fn close(&mut self);
}

/// Local media service collaborator (probes and stream frames for the scene
/// runtime). Owned by the orchestrator for the duration of the run; the
/// core only forwards its port and stops it during cleanup.
pub trait MediaService: Send {
    /// Port the service listens on; embedded in the page init record.
    fn port(&self) -> u16;

    /// Stop the service. Best-effort; called once during cleanup.
    fn stop(&mut self);
}
