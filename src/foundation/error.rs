use std::time::Duration;

/// Convenience alias used across the crate.
pub type ScenecastResult<T> = Result<T, ScenecastError>;

/// Error kinds surfaced by the rendering pipeline.
///
/// Workers kill their encoder subprocess before propagating `Page`,
/// `FrameTimeout` or `Encoder`; the orchestrator surfaces the first worker
/// error as the run's cause. `Aborted` is what a cancelled peer reports and
/// never masks the cause that triggered the cancellation.
#[derive(thiserror::Error, Debug)]
pub enum ScenecastError {
    /// Invalid or missing run configuration, raised before any external
    /// resource is allocated.
    #[error("configuration error: {0}")]
    Config(String),

    /// The scene page failed to load, initialize, or render a frame.
    #[error("page error: {0}")]
    Page(String),

    /// A single frame's end-to-end envelope exceeded the configured timeout.
    #[error("frame {frame} did not complete within {timeout:?}")]
    FrameTimeout {
        /// Absolute frame index that timed out.
        frame: u64,
        /// The configured per-frame envelope.
        timeout: Duration,
    },

    /// The encoder subprocess exited non-zero or rejected a write.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// Post-render verification failed (frame count or duplicate frames).
    #[error("verification error: {0}")]
    Verification(String),

    /// The worker observed its cooperative cancel flag.
    #[error("render aborted")]
    Aborted,

    /// Any other failure, with its original context preserved.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScenecastError {
    /// Build a [`ScenecastError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`ScenecastError::Page`].
    pub fn page(msg: impl Into<String>) -> Self {
        Self::Page(msg.into())
    }

    /// Build a [`ScenecastError::Encoder`].
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Build a [`ScenecastError::Verification`].
    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }
}
