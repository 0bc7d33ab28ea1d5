use crate::config::{CaptureMethod, ImageFormat};
use crate::foundation::error::{ScenecastError, ScenecastResult};
use crate::page::{Browser, PageInit, PageRenderError, ScenePage};
use base64::Engine as _;
use crossbeam_channel::Receiver;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Page as CdpPage;
use headless_chrome::{Browser as ChromeHandle, LaunchOptions, Tab};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Launch parameters for the shared browser process.
#[derive(Clone, Debug)]
pub struct ChromeBrowserOpts {
    /// Run without a visible window. Must be `false` for the extension
    /// capture method (rejected during config validation).
    pub headless: bool,
    /// Viewport width; device scale factor is forced to 1 so HiDPI hosts do
    /// not double the output resolution.
    pub width: u32,
    /// Viewport height.
    pub height: u32,
    /// Capture strategy; screencast attaches when the page is created.
    pub capture_method: CaptureMethod,
    /// Image format for screencast/screenshot capture.
    pub image_format: ImageFormat,
    /// JPEG quality for capture.
    pub jpeg_quality: u32,
    /// Unpacked capture extension to pre-load, when the extension strategy
    /// is selected.
    pub extension_dir: Option<PathBuf>,
    /// Upper bound for individual DevTools calls; sized to outlive the
    /// per-frame envelope so timeouts surface as frame timeouts, not
    /// protocol errors.
    pub call_timeout: Duration,
}

/// Shared browser process driven over the DevTools protocol.
pub struct ChromeBrowser {
    handle: Option<ChromeHandle>,
    opts: ChromeBrowserOpts,
}

impl ChromeBrowser {
    /// Launch the browser.
    pub fn launch(opts: ChromeBrowserOpts) -> ScenecastResult<Self> {
        let mut arg_store: Vec<OsString> = vec![
            OsString::from("--force-device-scale-factor=1"),
            OsString::from("--hide-scrollbars"),
        ];
        if let Some(dir) = &opts.extension_dir {
            let mut flag = OsString::from("--load-extension=");
            flag.push(dir.as_os_str());
            arg_store.push(flag);
        }
        let args: Vec<&OsStr> = arg_store.iter().map(|s| s.as_os_str()).collect();

        let launch = LaunchOptions::default_builder()
            .headless(opts.headless)
            .window_size(Some((opts.width, opts.height)))
            .args(args)
            .idle_browser_timeout(Duration::from_secs(3600))
            .build()
            .map_err(|e| ScenecastError::page(format!("invalid browser launch options: {e}")))?;

        let handle = ChromeHandle::new(launch)
            .map_err(|e| ScenecastError::page(format!("failed to launch browser: {e}")))?;
        Ok(Self {
            handle: Some(handle),
            opts,
        })
    }
}

impl Browser for ChromeBrowser {
    fn new_page(&self) -> ScenecastResult<Box<dyn ScenePage>> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| ScenecastError::page("browser is already closed"))?;
        let tab = handle
            .new_tab()
            .map_err(|e| ScenecastError::page(format!("failed to open page: {e}")))?;
        tab.set_default_timeout(self.opts.call_timeout);

        let screencast = if self.opts.capture_method == CaptureMethod::Screencast {
            Some(start_screencast(
                &tab,
                self.opts.image_format,
                self.opts.jpeg_quality,
            )?)
        } else {
            None
        };

        Ok(Box::new(ChromeScenePage { tab, screencast }))
    }

    fn close(&mut self) {
        // Dropping the handle tears the browser process down.
        self.handle.take();
    }
}

fn start_screencast(
    tab: &Arc<Tab>,
    format: ImageFormat,
    jpeg_quality: u32,
) -> ScenecastResult<Receiver<Vec<u8>>> {
    let (tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
    let ack_tab = Arc::clone(tab);
    tab.add_event_listener(Arc::new(move |event: &Event| {
        if let Event::PageScreencastFrame(frame) = event {
            let params = &frame.params;
            match base64::engine::general_purpose::STANDARD.decode(params.data.as_bytes()) {
                Ok(bytes) => {
                    let _ = tx.send(bytes);
                }
                Err(e) => tracing::warn!(error = %e, "undecodable screencast frame"),
            }
            let _ = ack_tab.call_method(CdpPage::ScreencastFrameAck {
                session_id: params.session_id,
            });
        }
    }))
    .map_err(|e| ScenecastError::page(format!("failed to install screencast listener: {e}")))?;

    let cast_format = match format {
        ImageFormat::Jpeg => CdpPage::StartScreencastFormatOption::Jpeg,
        ImageFormat::Png => CdpPage::StartScreencastFormatOption::Png,
    };
    tab.call_method(CdpPage::StartScreencast {
        format: Some(cast_format),
        quality: Some(jpeg_quality),
        max_width: None,
        max_height: None,
        every_nth_frame: None,
    })
    .map_err(|e| ScenecastError::page(format!("failed to start screencast: {e}")))?;
    Ok(rx)
}

/// One DevTools tab speaking the `window.scenecast` page protocol.
pub struct ChromeScenePage {
    tab: Arc<Tab>,
    screencast: Option<Receiver<Vec<u8>>>,
}

impl ChromeScenePage {
    fn eval(&self, expr: &str, await_promise: bool) -> ScenecastResult<Option<serde_json::Value>> {
        let object = self
            .tab
            .evaluate(expr, await_promise)
            .map_err(|e| ScenecastError::page(format!("page evaluation failed: {e}")))?;
        Ok(object.value)
    }

    // Expressions return primitives so the protocol hands the value back
    // directly instead of an object reference.
    fn eval_bool(&self, expr: &str, await_promise: bool) -> ScenecastResult<bool> {
        Ok(self
            .eval(expr, await_promise)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    fn eval_string(&self, expr: &str, await_promise: bool) -> ScenecastResult<String> {
        self.eval(expr, await_promise)?
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| ScenecastError::page("page evaluation returned no string value"))
    }
}

impl ScenePage for ChromeScenePage {
    fn navigate(&mut self, url: &str) -> ScenecastResult<()> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| ScenecastError::page(format!("failed to load scene page '{url}': {e}")))?;
        Ok(())
    }

    fn has_init_entry(&mut self) -> ScenecastResult<bool> {
        self.eval_bool(
            "typeof window.scenecast === 'object' && typeof window.scenecast.init === 'function'",
            false,
        )
    }

    fn init(&mut self, init: &PageInit) -> ScenecastResult<()> {
        let record = serde_json::to_string(init)
            .map_err(|e| ScenecastError::page(format!("unserializable page init record: {e}")))?;
        let ok = self.eval_bool(
            &format!("(async () => {{ await window.scenecast.init({record}); return true; }})()"),
            true,
        )?;
        if !ok {
            return Err(ScenecastError::page("scene page initialization failed"));
        }
        Ok(())
    }

    fn render_frame(&mut self, frame: u64) -> ScenecastResult<Vec<PageRenderError>> {
        let raw = self.eval_string(
            &format!(
                "(async () => JSON.stringify((await window.scenecast.renderFrame({frame})) || []))()"
            ),
            true,
        )?;
        serde_json::from_str(&raw).map_err(|e| {
            ScenecastError::page(format!("unparseable render error list for frame {frame}: {e}"))
        })
    }

    fn fonts_ready(&mut self) -> ScenecastResult<bool> {
        self.eval_bool("document.fonts.status === 'loaded'", false)
    }

    fn frame_marker_present(&mut self, frame: u64) -> ScenecastResult<bool> {
        self.eval_bool(
            &format!("document.querySelector('[data-frame=\"{frame}\"]') !== null"),
            false,
        )
    }

    fn render_settled(&mut self) -> ScenecastResult<bool> {
        self.eval_bool(
            "(async () => { await window.scenecast.settled(); return true; })()",
            true,
        )
    }

    fn network_quiet_for(&mut self, quiet: Duration) -> ScenecastResult<bool> {
        // Resource timing records a request when it finishes, so this
        // measures time since the last completed load; requests still in
        // flight are covered by the scene's settled predicate.
        let quiet_ms = quiet.as_millis();
        self.eval_bool(
            &format!(
                "(() => {{ \
                   const entries = performance.getEntriesByType('resource'); \
                   const last = entries.length ? Math.max(...entries.map(e => e.responseEnd)) : 0; \
                   return performance.now() - last >= {quiet_ms}; \
                 }})()"
            ),
            false,
        )
    }

    fn screenshot(&mut self, format: ImageFormat, quality: Option<u32>) -> ScenecastResult<Vec<u8>> {
        let shot_format = match format {
            ImageFormat::Jpeg => CdpPage::CaptureScreenshotFormatOption::Jpeg,
            ImageFormat::Png => CdpPage::CaptureScreenshotFormatOption::Png,
        };
        self.tab
            .capture_screenshot(shot_format, quality, None, true)
            .map_err(|e| ScenecastError::page(format!("screenshot capture failed: {e}")))
    }

    fn next_screencast_frame(&mut self, deadline: Instant) -> ScenecastResult<Vec<u8>> {
        let rx = self
            .screencast
            .as_ref()
            .ok_or_else(|| ScenecastError::page("screencast capture was not started"))?;
        // Frames buffered before the page settled show older content.
        while rx.try_recv().is_ok() {}
        let budget = deadline.saturating_duration_since(Instant::now());
        rx.recv_timeout(budget).map_err(|_| {
            ScenecastError::page("no screencast frame arrived before the frame deadline")
        })
    }

    fn grab_visible_tab(&mut self) -> ScenecastResult<Vec<u8>> {
        let data = self.eval_string("(async () => await window.scenecast.captureTab())()", true)?;
        // The extension hands back a data URL; keep the payload only.
        let payload = data.rsplit(',').next().unwrap_or(&data);
        base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| ScenecastError::page(format!("undecodable tab capture payload: {e}")))
    }

    fn close(&mut self) {
        if let Err(e) = self.tab.close(true) {
            tracing::warn!(error = %e, "failed to close page");
        }
    }
}
