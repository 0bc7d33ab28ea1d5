use crate::capture::capture_frame;
use crate::config::RenderConfig;
use crate::encode::sink::PartSink;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ScenecastError, ScenecastResult};
use crate::page::{PageInit, ScenePage};
use crate::partition::Part;
use crate::verify::FrameHashes;
use crate::worker::CancelToken;
use std::time::{Duration, Instant};

/// Poll interval for the readiness predicates.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Drives one browser page through one part, frame by frame.
///
/// Every frame runs the same readiness ladder before capture: render entry
/// → fonts → frame marker → settled → network quiet. No single signal is
/// sufficient; bundled asset loads, async font loads and user components
/// with async data each produce frames that look ready while still visually
/// incomplete, and each stage closes one of those races.
pub struct PageDriver<'a> {
    cfg: &'a RenderConfig,
    part: Part,
    page: Box<dyn ScenePage>,
}

impl<'a> PageDriver<'a> {
    /// Bind a fresh page to `part`.
    pub fn new(cfg: &'a RenderConfig, part: Part, page: Box<dyn ScenePage>) -> Self {
        Self { cfg, part, page }
    }

    /// Navigate to the pre-built page and initialize the scene runtime.
    pub fn setup(&mut self, entry_url: &str, init: &PageInit) -> ScenecastResult<()> {
        self.page.navigate(entry_url)?;
        if !self.page.has_init_entry()? {
            return Err(ScenecastError::page(
                "scene page exposes no initialization entry (the page never \
                 finished loading or the bundle is broken)",
            ));
        }
        self.page.init(init)
    }

    /// Render every frame of the part into `sink`, reporting each completed
    /// frame through `on_frame`.
    ///
    /// The cancel flag is observed between frames; a set flag aborts the
    /// part. Frame N+1 never starts before the sink has acknowledged frame
    /// N.
    pub fn render_part(
        &mut self,
        sink: &mut dyn PartSink,
        hashes: &FrameHashes,
        cancel: &CancelToken,
        mut on_frame: impl FnMut(u64),
    ) -> ScenecastResult<()> {
        for frame in self.part.start()..self.part.end() {
            if cancel.is_cancelled() {
                return Err(ScenecastError::Aborted);
            }
            self.render_one(frame, sink, hashes)?;
            on_frame(frame);
        }
        Ok(())
    }

    fn render_one(
        &mut self,
        frame: u64,
        sink: &mut dyn PartSink,
        hashes: &FrameHashes,
    ) -> ScenecastResult<()> {
        let timeout = self.cfg.frame_render_timeout();
        let deadline = Instant::now() + timeout;
        self.check_deadline(frame, timeout, deadline)?;

        let page_errors = self.page.render_frame(frame)?;
        if !page_errors.is_empty() {
            if self.cfg.fail_on_page_errors {
                return Err(ScenecastError::page(format!(
                    "frame {frame} reported {} error(s): {}",
                    page_errors.len(),
                    page_errors
                        .iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                )));
            }
            for err in &page_errors {
                tracing::warn!(frame, message = %err.message, "page reported a render error");
            }
        }

        self.poll_until(frame, timeout, deadline, |page| page.fonts_ready())?;
        self.poll_until(frame, timeout, deadline, |page| {
            page.frame_marker_present(frame)
        })?;
        self.poll_until(frame, timeout, deadline, |page| page.render_settled())?;
        let quiet = self.cfg.settle_delay();
        self.poll_until(frame, timeout, deadline, |page| {
            page.network_quiet_for(quiet)
        })?;

        let bytes = capture_frame(
            self.page.as_mut(),
            self.cfg.capture_method,
            self.cfg.image_format,
            self.cfg.jpeg_quality,
            deadline,
        )?;

        hashes.record(frame, &bytes);
        sink.write(FrameIndex(frame), &bytes)
    }

    fn check_deadline(&self, frame: u64, timeout: Duration, deadline: Instant) -> ScenecastResult<()> {
        if Instant::now() >= deadline {
            return Err(ScenecastError::FrameTimeout { frame, timeout });
        }
        Ok(())
    }

    fn poll_until(
        &mut self,
        frame: u64,
        timeout: Duration,
        deadline: Instant,
        mut pred: impl FnMut(&mut dyn ScenePage) -> ScenecastResult<bool>,
    ) -> ScenecastResult<()> {
        loop {
            self.check_deadline(frame, timeout, deadline)?;
            if pred(self.page.as_mut())? {
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Close the underlying page. Best-effort; called on every exit path.
    pub fn close(&mut self) {
        self.page.close();
    }
}
