use crate::chrome::{ChromeBrowser, ChromeBrowserOpts};
use crate::config::RenderConfig;
use crate::encode::concat;
use crate::encode::ffmpeg::FfmpegSinkFactory;
use crate::encode::sink::SinkFactory;
use crate::foundation::error::{ScenecastError, ScenecastResult};
use crate::page::{Browser, MediaService, PageInit};
use crate::partition::partition;
use crate::progress::{ProgressAggregator, ProgressReport, RenderStats};
use crate::verify::{self, FrameHashes};
use crate::worker::{run_part, CancelToken};
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// Lifecycle stages of one run, logged as the orchestrator advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStage {
    /// Launching the shared browser process.
    BrowserLaunching,
    /// Part workers are producing frames.
    Rendering,
    /// Merging part artifacts into the final output.
    Concatenating,
    /// Post-render checks (frame count, duplicate hashes).
    Verifying,
    /// The final artifact is in place.
    Done,
}

/// Per-run shared secret embedded in every page/media-service exchange.
#[derive(Clone, Debug)]
pub struct RunSecret(String);

impl RunSecret {
    /// Generate a fresh 128-bit token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Hex form of the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of the rendering pass, before concatenation.
#[derive(Debug)]
pub struct RenderOutcome {
    /// Part artifact paths, in part order.
    pub artifacts: Vec<PathBuf>,
    /// Aggregate statistics.
    pub stats: RenderStats,
    /// Digests captured for the duplicate-frame check.
    pub hashes: FrameHashes,
}

enum WorkerEvent {
    Progress {
        part: usize,
        frame: u64,
    },
    Done {
        part: usize,
        result: ScenecastResult<PathBuf>,
    },
}

/// Top-level coordinator for one render run.
///
/// Owns the browser handle, the optional media service and the temp
/// directory. Workers own their page and encoder subprocess; the job is the
/// sole synchronizer between them.
pub struct RenderJob {
    cfg: RenderConfig,
    secret: RunSecret,
    media: Option<Box<dyn MediaService>>,
    on_progress: Option<Box<dyn FnMut(&ProgressReport) + Send>>,
}

impl RenderJob {
    /// Validate `cfg` and build a job. Configuration errors surface here,
    /// before any external resource is allocated.
    pub fn new(cfg: RenderConfig) -> ScenecastResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            secret: RunSecret::generate(),
            media: None,
            on_progress: None,
        })
    }

    /// Attach the media service collaborator; its port flows into every
    /// page init record and it is stopped during cleanup.
    pub fn with_media_service(mut self, media: Box<dyn MediaService>) -> Self {
        self.media = Some(media);
        self
    }

    /// Install an aggregated-progress callback (also logged via `tracing`).
    pub fn on_progress(mut self, callback: impl FnMut(&ProgressReport) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &RenderConfig {
        &self.cfg
    }

    /// Render the full video: launch the browser, render all parts,
    /// concatenate, verify, clean up. Returns the final artifact path.
    ///
    /// Cleanup (browser, media service, part artifacts) runs on every exit
    /// path; cleanup failures are logged and never mask the primary error.
    pub fn render(&mut self) -> ScenecastResult<PathBuf> {
        let entry = self.cfg.entry_document();
        if !entry.exists() {
            return Err(ScenecastError::page(format!(
                "scene entry '{}' does not exist (was the bundle built?)",
                entry.display()
            )));
        }
        std::fs::create_dir_all(&self.cfg.temp_dir).map_err(|e| {
            ScenecastError::config(format!(
                "failed to create temp dir '{}': {e}",
                self.cfg.temp_dir.display()
            ))
        })?;

        tracing::info!(stage = ?RenderStage::BrowserLaunching, "launching browser");
        let mut browser = ChromeBrowser::launch(ChromeBrowserOpts {
            headless: self.cfg.headless,
            width: self.cfg.width,
            height: self.cfg.height,
            capture_method: self.cfg.capture_method,
            image_format: self.cfg.image_format,
            jpeg_quality: self.cfg.jpeg_quality,
            extension_dir: self.cfg.extension_dir.clone(),
            call_timeout: self.cfg.frame_render_timeout() + Duration::from_secs(5),
        })?;

        let out_path = self.cfg.resolved_output_path();
        let result = self.render_and_finalize(&browser, &out_path);

        browser.close();
        if let Some(media) = self.media.as_mut() {
            media.stop();
        }
        self.cleanup_temp();

        match result {
            Ok(()) => {
                tracing::info!(
                    stage = ?RenderStage::Done,
                    output = %out_path.display(),
                    "render complete"
                );
                Ok(out_path)
            }
            Err(e) => Err(e),
        }
    }

    fn render_and_finalize(
        &mut self,
        browser: &dyn Browser,
        out_path: &Path,
    ) -> ScenecastResult<()> {
        let sinks = FfmpegSinkFactory {
            temp_dir: self.cfg.temp_dir.clone(),
            image_format: self.cfg.image_format,
            fps: self.cfg.fps,
        };
        let outcome = self.render_parts(browser, &sinks)?;

        tracing::info!(
            stage = ?RenderStage::Concatenating,
            parts = outcome.artifacts.len(),
            "merging part artifacts"
        );
        concat::concatenate(
            &self.cfg.temp_dir,
            &outcome.artifacts,
            self.cfg.raw_output,
            self.cfg.is_image_output(),
            out_path,
        )?;

        tracing::info!(stage = ?RenderStage::Verifying, "verifying output");
        if self.cfg.enable_frame_count_check {
            verify::check_frame_count(out_path, self.cfg.duration_frames)?;
        }
        outcome
            .hashes
            .check_consecutive(self.cfg.start_frame, self.cfg.duration_frames)
    }

    /// Render every part through `browser` into sinks from `sinks`.
    ///
    /// Spawns one worker per part, aggregates progress, applies fail-fast
    /// semantics: the first worker error becomes the run's cause, every
    /// peer is cancelled, and all workers are awaited to settlement before
    /// the cause is surfaced.
    pub fn render_parts(
        &mut self,
        browser: &dyn Browser,
        sinks: &dyn SinkFactory,
    ) -> ScenecastResult<RenderOutcome> {
        let this = &mut *self;
        let cfg = &this.cfg;
        let on_progress = &mut this.on_progress;
        let server_port = this.media.as_ref().map(|m| m.port());
        let secret = this.secret.clone();

        let parts = partition(cfg.start_frame, cfg.duration_frames, cfg.workers());
        let hashes = FrameHashes::new(cfg.enable_hash_check);
        let mut aggregator = ProgressAggregator::new(&parts, cfg.fps);
        let tokens: Vec<CancelToken> = parts.iter().map(|_| CancelToken::new()).collect();

        let entry = cfg.entry_document();
        let entry = entry.canonicalize().unwrap_or(entry);
        let entry_url = format!("file://{}", entry.display());

        let inits: Vec<PageInit> = parts
            .iter()
            .map(|part| PageInit {
                width: cfg.width,
                height: cfg.height,
                fps: cfg.fps,
                server_port,
                duration_frames: cfg.duration_frames,
                render_id: part.start(),
                user_data: cfg.user_data.clone(),
                video_component_type: cfg.video_component_type.clone(),
                image_format: cfg.image_format,
                jpeg_quality: cfg.jpeg_quality,
                secret: secret.as_str().to_owned(),
                dev_mode: cfg.dev_mode,
            })
            .collect();

        tracing::info!(
            stage = ?RenderStage::Rendering,
            parts = parts.len(),
            frames = cfg.duration_frames,
            "rendering"
        );

        let (tx, rx) = mpsc::channel::<WorkerEvent>();
        let mut artifacts: Vec<Option<PathBuf>> = vec![None; parts.len()];
        let mut first_err: Option<ScenecastError> = None;

        std::thread::scope(|scope| {
            for (part, init) in parts.iter().zip(inits.into_iter()) {
                let part = *part;
                let tx = tx.clone();
                let token = tokens[part.num].clone();
                let hashes = &hashes;
                let entry_url = entry_url.as_str();
                scope.spawn(move || {
                    let progress_tx = tx.clone();
                    let result = run_part(
                        cfg,
                        part,
                        entry_url,
                        &init,
                        browser,
                        sinks,
                        hashes,
                        &token,
                        move |frame| {
                            let _ = progress_tx.send(WorkerEvent::Progress {
                                part: part.num,
                                frame,
                            });
                        },
                    );
                    let _ = tx.send(WorkerEvent::Done {
                        part: part.num,
                        result,
                    });
                });
            }
            drop(tx);

            let mut settled = 0usize;
            while settled < parts.len() {
                let event = match rx.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                };
                match event {
                    WorkerEvent::Progress { part, frame } => {
                        tracing::trace!(part, frame, "frame complete");
                        if let Some(report) = aggregator.record(part) {
                            tracing::info!(
                                frames = report.frames_done,
                                total = report.frames_total,
                                fps = format_args!("{:.1}", report.fps),
                                "rendering progress"
                            );
                            if let Some(callback) = on_progress.as_mut() {
                                callback(&report);
                            }
                        }
                    }
                    WorkerEvent::Done { part, result } => {
                        settled += 1;
                        match result {
                            Ok(path) => artifacts[part] = Some(path),
                            Err(e) => {
                                if first_err.is_none() {
                                    tracing::warn!(part, error = %e, "part failed; aborting peers");
                                    first_err = Some(e);
                                    for token in &tokens {
                                        token.cancel();
                                    }
                                } else {
                                    tracing::debug!(part, error = %e, "part settled after abort");
                                }
                            }
                        }
                    }
                }
            }
        });

        if let Some(e) = first_err {
            return Err(e);
        }
        let artifacts = artifacts
            .into_iter()
            .map(|p| {
                p.ok_or_else(|| {
                    ScenecastError::encoder("worker settled without an artifact (unexpected)")
                })
            })
            .collect::<ScenecastResult<Vec<_>>>()?;

        Ok(RenderOutcome {
            artifacts,
            stats: aggregator.stats(),
            hashes,
        })
    }

    fn cleanup_temp(&self) {
        let parts = partition(
            self.cfg.start_frame,
            self.cfg.duration_frames,
            self.cfg.workers(),
        );
        for part in &parts {
            let path = part.artifact_path(&self.cfg.temp_dir);
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove part artifact");
                }
            }
        }
        let descriptor = self.cfg.temp_dir.join(concat::CONCAT_DESCRIPTOR);
        if descriptor.exists() {
            if let Err(e) = std::fs::remove_file(&descriptor) {
                tracing::warn!(path = %descriptor.display(), error = %e, "failed to remove concat descriptor");
            }
        }
    }
}
