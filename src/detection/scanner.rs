/// Concurrent multi-band frame scanning.
///
/// The frame is split into horizontal bands and each band runs through the
/// detector on the rayon pool. Results are joined through a channel with a
/// wall-clock deadline: either every band reports, or the whole cycle is
/// abandoned. Partial per-band results are never returned to the caller.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::cancel::CancelToken;
use crate::detection::detector::{Band, RegionDetector};
use crate::detection::region::Region;
use crate::error::DetectionError;
use crate::frame::Frame;

pub struct ParallelScanner {
    band_count: u32,
}

impl ParallelScanner {
    pub fn new(band_count: u32) -> Self {
        Self {
            band_count: band_count.max(1),
        }
    }

    /// Split `height` rows into near-equal bands. The last band absorbs the
    /// remainder; bands never overlap and cover every row exactly once.
    pub fn bands(&self, height: u32) -> Vec<Band> {
        let count = self.band_count.min(height.max(1));
        let base = height / count;
        let mut bands = Vec::with_capacity(count as usize);
        let mut top = 0;
        for i in 0..count {
            let bottom = if i == count - 1 { height } else { top + base };
            bands.push(Band { top, bottom });
            top = bottom;
        }
        bands
    }

    /// Fan out one detector invocation per band and join all of them before
    /// returning (synchronization barrier).
    ///
    /// A band that misses `budget` aborts the cycle: the in-flight workers
    /// are flagged to stop cooperatively and the partial output is dropped.
    /// A target straddling a band boundary comes back as two regions here;
    /// reunification is the merger's job.
    pub fn scan(
        &self,
        frame: &Arc<Frame>,
        detector: &Arc<RegionDetector>,
        stop: &CancelToken,
        budget: Duration,
    ) -> Result<Vec<Region>, DetectionError> {
        let bands = self.bands(frame.height());
        let deadline = Instant::now() + budget;
        let timed_out = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded::<Vec<Region>>(bands.len());

        for band in &bands {
            let band = *band;
            let frame = Arc::clone(frame);
            let detector = Arc::clone(detector);
            let stop = stop.clone();
            let timed_out = Arc::clone(&timed_out);
            let tx = tx.clone();
            rayon::spawn(move || {
                let abort = || stop.is_cancelled() || timed_out.load(Ordering::Relaxed);
                let regions = detector.scan_band(&frame, band, &abort);
                // Receiver may already have abandoned the cycle.
                let _ = tx.send(regions);
            });
        }
        drop(tx);

        let mut all = Vec::new();
        for _ in 0..bands.len() {
            match rx.recv_deadline(deadline) {
                Ok(regions) => all.extend(regions),
                Err(RecvTimeoutError::Timeout) => {
                    timed_out.store(true, Ordering::Relaxed);
                    return Err(DetectionError::CycleTimeout {
                        budget_ms: budget.as_millis() as u64,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DetectionError::BandLost);
                }
            }
        }

        if stop.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::color::ColorRange;

    const TARGET: [u8; 3] = [40, 200, 90];

    fn scanner_parts() -> (Arc<RegionDetector>, CancelToken) {
        let detector = Arc::new(RegionDetector::new(
            vec![ColorRange::around(TARGET, 10)],
            5,
        ));
        (detector, CancelToken::new())
    }

    #[test]
    fn test_bands_cover_height_without_overlap() {
        let scanner = ParallelScanner::new(4);
        let bands = scanner.bands(103);

        assert_eq!(bands.len(), 4);
        assert_eq!(bands[0].top, 0);
        assert_eq!(bands[3].bottom, 103);
        for pair in bands.windows(2) {
            assert_eq!(pair[0].bottom, pair[1].top);
        }
    }

    #[test]
    fn test_more_bands_than_rows_is_clamped() {
        let scanner = ParallelScanner::new(8);
        let bands = scanner.bands(3);
        assert_eq!(bands.len(), 3);
        assert_eq!(bands.last().unwrap().bottom, 3);
    }

    #[test]
    fn test_scan_joins_all_bands() {
        let mut frame = Frame::solid(200, 200, [0, 0, 0]);
        frame.paint_rect(20, 20, 120, 60, TARGET);
        let frame = Arc::new(frame);
        let (detector, stop) = scanner_parts();

        let scanner = ParallelScanner::new(4);
        let regions = scanner
            .scan(&frame, &detector, &stop, Duration::from_secs(5))
            .unwrap();
        assert!(!regions.is_empty());
    }

    #[test]
    fn test_target_straddling_boundary_reports_per_band() {
        // 4 bands over 200 rows: boundary at y=50. Rect crosses it.
        let mut frame = Frame::solid(200, 200, [0, 0, 0]);
        frame.paint_rect(20, 30, 120, 70, TARGET);
        let frame = Arc::new(frame);
        let (detector, stop) = scanner_parts();

        let scanner = ParallelScanner::new(4);
        let regions = scanner
            .scan(&frame, &detector, &stop, Duration::from_secs(5))
            .unwrap();
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn test_cancelled_scan_reports_cancelled() {
        let frame = Arc::new(Frame::solid(100, 100, [0, 0, 0]));
        let (detector, stop) = scanner_parts();
        stop.cancel();

        let scanner = ParallelScanner::new(2);
        let result = scanner.scan(&frame, &detector, &stop, Duration::from_secs(1));
        assert!(matches!(result, Err(DetectionError::Cancelled)));
    }
}
