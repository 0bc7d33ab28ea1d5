use crate::config::RenderConfig;
use crate::driver::PageDriver;
use crate::encode::sink::{PartSink, SinkFactory};
use crate::foundation::error::ScenecastResult;
use crate::page::{Browser, PageInit};
use crate::partition::Part;
use crate::verify::FrameHashes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the orchestrator and one
/// worker.
///
/// Cancelling is idempotent; the worker observes the flag between frames
/// and reports `Aborted`.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Return `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Render one part: one page, one encoder sink, strictly sequential frames.
///
/// On any error (page, capture, encoder, timeout or abort) the worker
/// kills its encoder subprocess and closes its page before propagating, so
/// an aborted peer cannot leak a process. Returns the part artifact path on
/// success.
#[allow(clippy::too_many_arguments)]
pub fn run_part(
    cfg: &RenderConfig,
    part: Part,
    entry_url: &str,
    init: &PageInit,
    browser: &dyn Browser,
    sinks: &dyn SinkFactory,
    hashes: &FrameHashes,
    cancel: &CancelToken,
    on_frame: impl FnMut(u64),
) -> ScenecastResult<PathBuf> {
    let mut sink = sinks.create(&part)?;
    drive_part(
        cfg,
        part,
        entry_url,
        init,
        browser,
        sink.as_mut(),
        hashes,
        cancel,
        on_frame,
    )?;
    sink.end()?;
    Ok(part.artifact_path(&cfg.temp_dir))
}

#[allow(clippy::too_many_arguments)]
fn drive_part(
    cfg: &RenderConfig,
    part: Part,
    entry_url: &str,
    init: &PageInit,
    browser: &dyn Browser,
    sink: &mut dyn PartSink,
    hashes: &FrameHashes,
    cancel: &CancelToken,
    on_frame: impl FnMut(u64),
) -> ScenecastResult<()> {
    let page = match browser.new_page() {
        Ok(page) => page,
        Err(e) => {
            sink.kill();
            return Err(e);
        }
    };
    let mut driver = PageDriver::new(cfg, part, page);

    let result = driver.setup(entry_url, init).and_then(|()| {
        sink.open()?;
        driver.render_part(sink, hashes, cancel, on_frame)
    });
    // Teardown order: the encoder dies before its page closes.
    if result.is_err() {
        sink.kill();
    }
    driver.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_idempotent_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
