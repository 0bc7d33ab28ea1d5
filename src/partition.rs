use crate::foundation::core::{FrameIndex, FrameRange};
use std::path::{Path, PathBuf};

/// A contiguous frame interval assigned to one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Part {
    /// 0-based part number; concatenation order.
    pub num: usize,
    /// Frames covered, half-open.
    pub range: FrameRange,
}

impl Part {
    /// First frame of the part (also used as the per-worker render id).
    pub fn start(&self) -> u64 {
        self.range.start.0
    }

    /// One past the last frame of the part.
    pub fn end(&self) -> u64 {
        self.range.end.0
    }

    /// Number of frames in the part.
    pub fn len(&self) -> u64 {
        self.range.len_frames()
    }

    /// Return `true` when the part covers no frames.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Deterministic artifact path under `temp_dir`.
    ///
    /// Parts are always Matroska regardless of the image format.
    pub fn artifact_path(&self, temp_dir: &Path) -> PathBuf {
        temp_dir.join(format!(
            "part {}-{}-{}.mkv",
            self.num,
            self.start(),
            self.end()
        ))
    }
}

/// Split `[start_frame, start_frame + duration_frames)` into `concurrency`
/// contiguous parts.
///
/// Each part gets `duration_frames / concurrency` frames; the remainder is
/// absorbed by the last part. Callers clamp `concurrency` to
/// `duration_frames` beforehand (see `RenderConfig::workers`), so every part
/// is non-empty.
pub fn partition(start_frame: u64, duration_frames: u64, concurrency: usize) -> Vec<Part> {
    let concurrency = concurrency.max(1) as u64;
    let base = duration_frames / concurrency;
    let remainder = duration_frames % concurrency;

    let mut parts = Vec::with_capacity(concurrency as usize);
    let mut cursor = start_frame;
    for num in 0..concurrency {
        let mut len = base;
        if num == concurrency - 1 {
            len += remainder;
        }
        parts.push(Part {
            num: num as usize,
            range: FrameRange {
                start: FrameIndex(cursor),
                end: FrameIndex(cursor + len),
            },
        });
        cursor += len;
    }
    parts
}
