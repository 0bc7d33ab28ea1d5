//! Scripted fakes for exercising the pipeline without chrome or ffmpeg.

use scenecast::{
    Browser, ImageFormat, PageInit, PageRenderError, ScenePage, ScenecastError, ScenecastResult,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Deterministic capture payload for `frame`.
pub fn frame_payload(frame: u64) -> Vec<u8> {
    format!("frame-{frame}").into_bytes()
}

/// Behavior script shared by every page a [`FakeBrowser`] creates.
#[derive(Clone, Debug, Default)]
pub struct FakeScript {
    /// Fail the render entry at this absolute frame.
    pub fail_render_at: Option<u64>,
    /// Report these page errors at the given frame.
    pub page_errors_at: Option<(u64, Vec<String>)>,
    /// These two frames capture byte-identical payloads.
    pub duplicate_frames: Option<(u64, u64)>,
    /// Pretend the bundle is broken (no init entry).
    pub broken_bundle: bool,
    /// Per-frame render latency; gives peers time to observe cancellation.
    pub frame_delay: Duration,
}

/// Scripted browser; every page follows the same [`FakeScript`].
#[derive(Default)]
pub struct FakeBrowser {
    script: FakeScript,
    inits: Arc<Mutex<Vec<PageInit>>>,
}

impl FakeBrowser {
    pub fn new(script: FakeScript) -> Self {
        Self {
            script,
            inits: Arc::default(),
        }
    }

    /// Init records received by every page so far.
    pub fn inits(&self) -> Vec<PageInit> {
        self.inits.lock().unwrap().clone()
    }
}

impl Browser for FakeBrowser {
    fn new_page(&self) -> ScenecastResult<Box<dyn ScenePage>> {
        Ok(Box::new(FakePage {
            script: self.script.clone(),
            inits: Arc::clone(&self.inits),
            current_frame: None,
        }))
    }

    fn close(&mut self) {}
}

struct FakePage {
    script: FakeScript,
    inits: Arc<Mutex<Vec<PageInit>>>,
    current_frame: Option<u64>,
}

impl FakePage {
    fn captured_bytes(&self) -> ScenecastResult<Vec<u8>> {
        let frame = self
            .current_frame
            .ok_or_else(|| ScenecastError::page("capture before any frame was rendered"))?;
        if let Some((a, b)) = self.script.duplicate_frames {
            if frame == a || frame == b {
                return Ok(b"duplicate-pixels".to_vec());
            }
        }
        Ok(frame_payload(frame))
    }
}

impl ScenePage for FakePage {
    fn navigate(&mut self, _url: &str) -> ScenecastResult<()> {
        Ok(())
    }

    fn has_init_entry(&mut self) -> ScenecastResult<bool> {
        Ok(!self.script.broken_bundle)
    }

    fn init(&mut self, init: &PageInit) -> ScenecastResult<()> {
        self.inits.lock().unwrap().push(init.clone());
        Ok(())
    }

    fn render_frame(&mut self, frame: u64) -> ScenecastResult<Vec<PageRenderError>> {
        if !self.script.frame_delay.is_zero() {
            std::thread::sleep(self.script.frame_delay);
        }
        if self.script.fail_render_at == Some(frame) {
            return Err(ScenecastError::page(format!(
                "injected render failure at frame {frame}"
            )));
        }
        self.current_frame = Some(frame);
        if let Some((at, messages)) = &self.script.page_errors_at {
            if *at == frame {
                return Ok(messages
                    .iter()
                    .map(|m| PageRenderError { message: m.clone() })
                    .collect());
            }
        }
        Ok(Vec::new())
    }

    fn fonts_ready(&mut self) -> ScenecastResult<bool> {
        Ok(true)
    }

    fn frame_marker_present(&mut self, frame: u64) -> ScenecastResult<bool> {
        Ok(self.current_frame == Some(frame))
    }

    fn render_settled(&mut self) -> ScenecastResult<bool> {
        Ok(true)
    }

    fn network_quiet_for(&mut self, _quiet: Duration) -> ScenecastResult<bool> {
        Ok(true)
    }

    fn screenshot(
        &mut self,
        _format: ImageFormat,
        _quality: Option<u32>,
    ) -> ScenecastResult<Vec<u8>> {
        self.captured_bytes()
    }

    fn next_screencast_frame(&mut self, _deadline: Instant) -> ScenecastResult<Vec<u8>> {
        self.captured_bytes()
    }

    fn grab_visible_tab(&mut self) -> ScenecastResult<Vec<u8>> {
        self.captured_bytes()
    }

    fn close(&mut self) {}
}
