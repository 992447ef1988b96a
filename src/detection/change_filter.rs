use crate::frame::Frame;

/// Relative sample coordinates spread across the frame: corners pulled in
/// from the edges plus the center.
const SAMPLE_POINTS: [(f32, f32); 5] = [
    (0.10, 0.10),
    (0.90, 0.10),
    (0.50, 0.50),
    (0.10, 0.90),
    (0.90, 0.90),
];

/// Cheap frame-change heuristic.
///
/// Hashes a small fixed set of sample pixels with polynomial accumulation
/// (`hash = 31 * hash + value`) and short-circuits the cycle when the hash
/// matches the previous frame's.
///
/// This is a deliberate trade-off, not a correctness guarantee: a change
/// confined to pixels outside the sampled points produces a false negative
/// and that frame is skipped. The filter can be disabled in configuration
/// when the capture region is small enough to scan every cycle.
pub struct ChangeFilter {
    last_hash: Option<u64>,
}

impl ChangeFilter {
    pub fn new() -> Self {
        Self { last_hash: None }
    }

    /// True when the frame differs from the previous one at any sampled
    /// point (or when no previous frame exists).
    pub fn has_changed(&mut self, frame: &Frame) -> bool {
        let hash = Self::sample_hash(frame);
        let changed = self.last_hash != Some(hash);
        self.last_hash = Some(hash);
        changed
    }

    #[allow(dead_code)]
    pub fn reset(&mut self) {
        self.last_hash = None;
    }

    fn sample_hash(frame: &Frame) -> u64 {
        let mut hash: u64 = 17;
        for (fx, fy) in SAMPLE_POINTS {
            let x = ((frame.width().saturating_sub(1)) as f32 * fx) as u32;
            let y = ((frame.height().saturating_sub(1)) as f32 * fy) as u32;
            for channel in frame.rgb(x, y) {
                hash = hash.wrapping_mul(31).wrapping_add(channel as u64);
            }
        }
        hash
    }
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_counts_as_changed() {
        let mut filter = ChangeFilter::new();
        let frame = Frame::solid(100, 100, [50, 50, 50]);
        assert!(filter.has_changed(&frame));
    }

    #[test]
    fn test_identical_frame_is_skipped() {
        let mut filter = ChangeFilter::new();
        let frame = Frame::solid(100, 100, [50, 50, 50]);
        assert!(filter.has_changed(&frame));
        assert!(!filter.has_changed(&frame));
        assert!(!filter.has_changed(&frame.clone()));
    }

    #[test]
    fn test_change_at_sample_point_is_seen() {
        let mut filter = ChangeFilter::new();
        let frame = Frame::solid(100, 100, [50, 50, 50]);
        assert!(filter.has_changed(&frame));

        let mut changed = frame.clone();
        changed.paint_rect(45, 45, 55, 55, [200, 0, 0]); // covers center sample
        assert!(filter.has_changed(&changed));
    }

    #[test]
    fn test_change_off_sample_points_is_missed() {
        // Documents the known false negative of sparse sampling.
        let mut filter = ChangeFilter::new();
        let frame = Frame::solid(100, 100, [50, 50, 50]);
        assert!(filter.has_changed(&frame));

        let mut changed = frame.clone();
        changed.paint_rect(20, 20, 24, 24, [200, 0, 0]); // between samples
        assert!(!filter.has_changed(&changed));
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut filter = ChangeFilter::new();
        let frame = Frame::solid(100, 100, [50, 50, 50]);
        assert!(filter.has_changed(&frame));
        filter.reset();
        assert!(filter.has_changed(&frame));
    }
}
