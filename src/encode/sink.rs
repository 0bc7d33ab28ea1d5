use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ScenecastError, ScenecastResult};
use crate::partition::Part;
use std::sync::{Arc, Mutex};

/// Sink contract for one part's ordered stream of encoded frame images.
///
/// Ordering contract: `write` is called in strictly increasing frame-index
/// order within the part. `write` must not return until the underlying
/// write has been acknowledged; that acknowledgement is the pipeline's only
/// backpressure signal.
pub trait PartSink: Send {
    /// Called once before any frames are written.
    fn open(&mut self) -> ScenecastResult<()>;

    /// Append one encoded image; blocks until the write is acknowledged.
    fn write(&mut self, frame: FrameIndex, bytes: &[u8]) -> ScenecastResult<()>;

    /// Close the input stream and wait for the part file to be finalized.
    fn end(&mut self) -> ScenecastResult<()>;

    /// Force-terminate the sink. Idempotent, best-effort; the failure path
    /// for every worker error.
    fn kill(&mut self);
}

/// Per-part sink construction seam.
pub trait SinkFactory: Sync {
    /// Build the sink for `part`.
    fn create(&self, part: &Part) -> ScenecastResult<Box<dyn PartSink>>;
}

/// Observable state of a [`MemorySink`].
#[derive(Debug, Default)]
pub struct MemorySinkState {
    /// `open` has been called.
    pub opened: bool,
    /// `end` completed.
    pub ended: bool,
    /// `kill` was invoked.
    pub killed: bool,
    /// Frames written, in arrival order.
    pub frames: Vec<(u64, Vec<u8>)>,
}

/// In-memory sink for tests and debugging.
///
/// State lives behind a shared handle so callers can inspect it after the
/// pipeline has consumed the sink.
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
    fail_write_at: Option<u64>,
    last: Option<u64>,
}

impl MemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemorySinkState::default())),
            fail_write_at: None,
            last: None,
        }
    }

    /// Fail the write of `frame` with an encoder error (simulates the
    /// encoder subprocess dying mid-run).
    pub fn fail_write_at(mut self, frame: u64) -> Self {
        self.fail_write_at = Some(frame);
        self
    }

    /// Shared handle to the sink's observable state.
    pub fn handle(&self) -> Arc<Mutex<MemorySinkState>> {
        Arc::clone(&self.state)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl PartSink for MemorySink {
    fn open(&mut self) -> ScenecastResult<()> {
        self.state.lock().unwrap().opened = true;
        Ok(())
    }

    fn write(&mut self, frame: FrameIndex, bytes: &[u8]) -> ScenecastResult<()> {
        if let Some(last) = self.last {
            if frame.0 <= last {
                return Err(ScenecastError::encoder(format!(
                    "out-of-order frame {} after {}",
                    frame.0, last
                )));
            }
        }
        self.last = Some(frame.0);

        if self.fail_write_at == Some(frame.0) {
            return Err(ScenecastError::encoder(format!(
                "injected write failure at frame {}",
                frame.0
            )));
        }
        self.state
            .lock()
            .unwrap()
            .frames
            .push((frame.0, bytes.to_vec()));
        Ok(())
    }

    fn end(&mut self) -> ScenecastResult<()> {
        self.state.lock().unwrap().ended = true;
        Ok(())
    }

    fn kill(&mut self) {
        self.state.lock().unwrap().killed = true;
    }
}

/// Factory producing [`MemorySink`]s and retaining a handle per part.
#[derive(Default)]
pub struct MemorySinkFactory {
    handles: Mutex<Vec<(usize, Arc<Mutex<MemorySinkState>>)>>,
    fail_write_at: Option<(usize, u64)>,
}

impl MemorySinkFactory {
    /// Create a factory with no failure injection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a write failure into `part` at absolute frame `frame`.
    pub fn fail_part_write_at(mut self, part: usize, frame: u64) -> Self {
        self.fail_write_at = Some((part, frame));
        self
    }

    /// State handles of every sink created so far, `(part_num, state)`.
    pub fn handles(&self) -> Vec<(usize, Arc<Mutex<MemorySinkState>>)> {
        self.handles.lock().unwrap().clone()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create(&self, part: &Part) -> ScenecastResult<Box<dyn PartSink>> {
        let mut sink = MemorySink::new();
        if let Some((num, frame)) = self.fail_write_at {
            if num == part.num {
                sink = sink.fail_write_at(frame);
            }
        }
        self.handles
            .lock()
            .unwrap()
            .push((part.num, sink.handle()));
        Ok(Box::new(sink))
    }
}
