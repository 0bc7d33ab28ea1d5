use crate::encode::probe;
use crate::foundation::error::{ScenecastError, ScenecastResult};
use dashmap::DashMap;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

/// Content digest of one captured frame.
pub fn frame_digest(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Shared map of absolute frame index to captured-bytes digest.
///
/// Populated only when the hash check is enabled. Workers insert disjoint
/// key ranges concurrently; the duplicate scan runs after every worker has
/// settled.
#[derive(Debug)]
pub struct FrameHashes {
    enabled: bool,
    digests: DashMap<u64, u64>,
}

impl FrameHashes {
    /// Create the map; a disabled map ignores all records.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            digests: DashMap::new(),
        }
    }

    /// Whether recording is enabled for this run.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Record the digest of `frame`'s captured bytes.
    pub fn record(&self, frame: u64, bytes: &[u8]) {
        if self.enabled {
            self.digests.insert(frame, frame_digest(bytes));
        }
    }

    /// Number of recorded frames.
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Return `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Scan `[start, start + duration)` for consecutive frames with equal
    /// digests and fail on the first pair.
    ///
    /// Two identical consecutive frames mean the page was captured before
    /// it displayed the newly requested frame.
    pub fn check_consecutive(&self, start: u64, duration: u64) -> ScenecastResult<()> {
        if !self.enabled {
            return Ok(());
        }
        for frame in start..start + duration.saturating_sub(1) {
            let a = self.digests.get(&frame).map(|e| *e.value());
            let b = self.digests.get(&(frame + 1)).map(|e| *e.value());
            if let (Some(a), Some(b)) = (a, b) {
                if a == b {
                    return Err(ScenecastError::verification(format!(
                        "frames {} and {} captured identical pixel content",
                        frame,
                        frame + 1
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Probe the final output and assert its frame count equals the run's
/// duration.
pub fn check_frame_count(output: &Path, expected: u64) -> ScenecastResult<()> {
    let actual = probe::count_frames(output)?;
    if actual != expected {
        return Err(ScenecastError::verification(format!(
            "output '{}' holds {actual} frames, expected {expected}",
            output.display()
        )));
    }
    Ok(())
}
