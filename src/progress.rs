use crate::partition::Part;
use std::time::Instant;

/// Progress of a single part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartProgress {
    /// Frames completed so far.
    pub frames_done: u64,
    /// Total frames in the part.
    pub part_length: u64,
}

impl PartProgress {
    /// Completion percentage in [0, 100].
    pub fn percent(&self) -> f64 {
        if self.part_length == 0 {
            100.0
        } else {
            self.frames_done as f64 * 100.0 / self.part_length as f64
        }
    }
}

/// Aggregated run progress, emitted every `fps` frames of total progress.
#[derive(Clone, Debug)]
pub struct ProgressReport {
    /// Frames completed across all parts.
    pub frames_done: u64,
    /// Total frames in the run.
    pub frames_total: u64,
    /// Instantaneous throughput: frames since start over elapsed wall time.
    pub fps: f64,
    /// Per-part completion, in part order.
    pub per_part: Vec<PartProgress>,
}

/// Final statistics of a rendering pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderStats {
    /// Frames rendered and written across all parts.
    pub frames_rendered: u64,
    /// Wall time of the rendering pass in seconds.
    pub elapsed_secs: f64,
}

/// Collects per-part progress events and decides when to emit an aggregated
/// report.
pub struct ProgressAggregator {
    started: Instant,
    per_part: Vec<PartProgress>,
    frames_done: u64,
    frames_total: u64,
    stride: u64,
}

impl ProgressAggregator {
    /// Build an aggregator for `parts`, reporting every `fps` frames.
    pub fn new(parts: &[Part], fps: u32) -> Self {
        let per_part = parts
            .iter()
            .map(|p| PartProgress {
                frames_done: 0,
                part_length: p.len(),
            })
            .collect::<Vec<_>>();
        let frames_total = per_part.iter().map(|p| p.part_length).sum();
        Self {
            started: Instant::now(),
            per_part,
            frames_done: 0,
            frames_total,
            stride: u64::from(fps.max(1)),
        }
    }

    /// Record one completed frame for `part`; returns a report when the
    /// aggregate crosses the reporting stride or finishes.
    pub fn record(&mut self, part: usize) -> Option<ProgressReport> {
        if let Some(p) = self.per_part.get_mut(part) {
            p.frames_done += 1;
        }
        self.frames_done += 1;

        if self.frames_done % self.stride == 0 || self.frames_done == self.frames_total {
            Some(self.report())
        } else {
            None
        }
    }

    /// Snapshot the current aggregate.
    pub fn report(&self) -> ProgressReport {
        let elapsed = self.started.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.frames_done as f64 / elapsed
        } else {
            0.0
        };
        ProgressReport {
            frames_done: self.frames_done,
            frames_total: self.frames_total,
            fps,
            per_part: self.per_part.clone(),
        }
    }

    /// Final statistics for the pass.
    pub fn stats(&self) -> RenderStats {
        RenderStats {
            frames_rendered: self.frames_done,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}
