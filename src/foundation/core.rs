/// Absolute 0-based frame index in run timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Half-open frame range `[start, end)` in timeline space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// Inclusive range start.
    pub start: FrameIndex,
    /// Exclusive range end.
    pub end: FrameIndex,
}

impl FrameRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: FrameIndex, end: FrameIndex) -> Option<Self> {
        if start.0 > end.0 {
            return None;
        }
        Some(Self { start, end })
    }

    /// Number of frames contained in the range.
    pub fn len_frames(self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    /// Return `true` when the range has no frames.
    pub fn is_empty(self) -> bool {
        self.start.0 == self.end.0
    }

    /// Return `true` when `f` is inside `[start, end)`.
    pub fn contains(self, f: FrameIndex) -> bool {
        self.start.0 <= f.0 && f.0 < self.end.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_len_and_contains() {
        let r = FrameRange::new(FrameIndex(3), FrameIndex(7)).unwrap();
        assert_eq!(r.len_frames(), 4);
        assert!(r.contains(FrameIndex(3)));
        assert!(r.contains(FrameIndex(6)));
        assert!(!r.contains(FrameIndex(7)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(FrameRange::new(FrameIndex(5), FrameIndex(4)).is_none());
        assert!(FrameRange::new(FrameIndex(5), FrameIndex(5)).unwrap().is_empty());
    }
}
