/// Candidate merging, shape filtering and confidence scoring.
use serde::{Deserialize, Serialize};

use crate::detection::region::{Candidate, Region};
use crate::error::ConfigError;

/// Shape envelopes a merged region must satisfy to become a candidate.
/// Fractions are relative to frame dimensions; aspect is width / height.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShapeEnvelope {
    pub min_width_frac: f32,
    pub max_width_frac: f32,
    pub min_height_frac: f32,
    pub max_height_frac: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl Default for ShapeEnvelope {
    fn default() -> Self {
        Self {
            min_width_frac: 0.10,
            max_width_frac: 0.90,
            min_height_frac: 0.05,
            max_height_frac: 0.30,
            min_aspect: 1.5,
            max_aspect: 8.0,
        }
    }
}

impl ShapeEnvelope {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let frac_ok = |lo: f32, hi: f32| lo > 0.0 && hi <= 1.0 && lo < hi;
        if !frac_ok(self.min_width_frac, self.max_width_frac) {
            return Err(ConfigError::Invalid(format!(
                "width envelope [{}, {}] is not an increasing range in (0, 1]",
                self.min_width_frac, self.max_width_frac
            )));
        }
        if !frac_ok(self.min_height_frac, self.max_height_frac) {
            return Err(ConfigError::Invalid(format!(
                "height envelope [{}, {}] is not an increasing range in (0, 1]",
                self.min_height_frac, self.max_height_frac
            )));
        }
        if self.min_aspect <= 0.0 || self.min_aspect >= self.max_aspect {
            return Err(ConfigError::Invalid(format!(
                "aspect envelope [{}, {}] is not an increasing positive range",
                self.min_aspect, self.max_aspect
            )));
        }
        Ok(())
    }
}

pub struct CandidateMerger {
    proximity_px: u32,
    grid_step: u32,
    shape: ShapeEnvelope,
    confidence_floor: f32,
}

impl CandidateMerger {
    pub fn new(
        proximity_px: u32,
        grid_step: u32,
        shape: ShapeEnvelope,
        confidence_floor: f32,
    ) -> Self {
        Self {
            proximity_px,
            grid_step: grid_step.max(1),
            shape,
            confidence_floor,
        }
    }

    /// Greedy merge to a fixed point: full passes keep running until one
    /// produces no merge. A single pass is not enough, because a merge can
    /// pull a union box within range of a region that was already placed;
    /// chained adjacency only resolves by repeating.
    pub fn merge_regions(&self, regions: Vec<Region>) -> Vec<Region> {
        let mut regions = regions;
        loop {
            let mut merged_any = false;
            let mut out: Vec<Region> = Vec::with_capacity(regions.len());
            'next: for region in regions {
                for placed in out.iter_mut() {
                    if placed.within(&region, self.proximity_px) {
                        *placed = placed.union(&region);
                        merged_any = true;
                        continue 'next;
                    }
                }
                out.push(region);
            }
            regions = out;
            if !merged_any {
                return regions;
            }
        }
    }

    /// Apply shape envelopes and score the survivors.
    pub fn candidates(
        &self,
        frame_width: u32,
        frame_height: u32,
        regions: Vec<Region>,
    ) -> Vec<Candidate> {
        if frame_width == 0 || frame_height == 0 {
            return Vec::new();
        }
        regions
            .into_iter()
            .filter(|region| self.passes_shape(frame_width, frame_height, region))
            .filter_map(|region| {
                let confidence = self.confidence(&region);
                if confidence < self.confidence_floor {
                    return None;
                }
                Some(Candidate {
                    average_color: region.average_color(),
                    region,
                    confidence,
                })
            })
            .collect()
    }

    fn passes_shape(&self, frame_width: u32, frame_height: u32, region: &Region) -> bool {
        let width_frac = region.width() as f32 / frame_width as f32;
        let height_frac = region.height() as f32 / frame_height as f32;
        let aspect = region.width() as f32 / region.height() as f32;

        width_frac >= self.shape.min_width_frac
            && width_frac <= self.shape.max_width_frac
            && height_frac >= self.shape.min_height_frac
            && height_frac <= self.shape.max_height_frac
            && aspect >= self.shape.min_aspect
            && aspect <= self.shape.max_aspect
    }

    /// Fill density: matched samples cover `samples * step²` pixels of the
    /// bounding box. A solid control scores near 1.0, scattered noise that
    /// happened to merge scores low.
    fn confidence(&self, region: &Region) -> f32 {
        let covered = region.samples as u64 * (self.grid_step as u64).pow(2);
        (covered as f32 / region.area() as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merger() -> CandidateMerger {
        CandidateMerger::new(20, 5, ShapeEnvelope::default(), 0.3)
    }

    fn rect_region(left: u32, top: u32, right: u32, bottom: u32, step: u32) -> Region {
        let mut region = Region::seed(left, top, [40, 200, 90]);
        let mut y = top;
        while y <= bottom {
            let mut x = left;
            while x <= right {
                if (x, y) != (left, top) {
                    region.include(x, y, [40, 200, 90]);
                }
                x += step;
            }
            y += step;
        }
        region
    }

    #[test]
    fn test_two_regions_within_threshold_merge_to_union() {
        let a = rect_region(0, 0, 50, 20, 5);
        let b = rect_region(65, 0, 115, 20, 5); // 15px gap < 20px threshold

        let merged = merger().merge_regions(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].left, 0);
        assert_eq!(merged[0].right, 115);
        assert_eq!(merged[0].samples, a.samples + b.samples);
    }

    #[test]
    fn test_distant_regions_stay_separate() {
        let a = rect_region(0, 0, 50, 20, 5);
        let b = rect_region(200, 0, 250, 20, 5);

        let merged = merger().merge_regions(vec![a, b]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_chained_adjacency_requires_fixed_point() {
        // a-b gap 30px (no merge), b-c gap 10px (merge). The b∪c union then
        // sits 30px from a, still no merge: 2 regions, found in one extra pass.
        let a = rect_region(0, 0, 20, 20, 5);
        let b = rect_region(50, 0, 70, 20, 5);
        let c = rect_region(80, 0, 100, 20, 5);

        let merged = merger().merge_regions(vec![a, b, c]);
        assert_eq!(merged.len(), 2);

        // Transitive case: a-b 15px, b-c 15px, a-c 45px. All three collapse.
        let a = rect_region(0, 0, 20, 20, 5);
        let b = rect_region(35, 0, 55, 20, 5);
        let c = rect_region(70, 0, 90, 20, 5);

        let merged = merger().merge_regions(vec![a, b, c]);
        assert_eq!(merged.len(), 1);
        assert_eq!((merged[0].left, merged[0].right), (0, 90));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let regions = vec![
            rect_region(0, 0, 40, 20, 5),
            rect_region(50, 0, 90, 20, 5),
            rect_region(300, 50, 340, 70, 5),
        ];
        let m = merger();
        let once = m.merge_regions(regions);
        let twice = m.merge_regions(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_shape_filter_rejects_out_of_envelope() {
        let m = merger();

        // Tall sliver: aspect < 1.5.
        let sliver = rect_region(0, 0, 20, 200, 5);
        assert!(m.candidates(640, 480, vec![sliver]).is_empty());

        // Near full-frame: width fraction > 0.9.
        let huge = rect_region(0, 0, 630, 100, 5);
        assert!(m.candidates(640, 480, vec![huge]).is_empty());

        // Button-like: passes.
        let button = rect_region(100, 100, 300, 140, 5);
        let candidates = m.candidates(640, 480, vec![button]);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].confidence >= 0.3);
        assert_eq!(candidates[0].centroid(), (200, 120));
    }

    #[test]
    fn test_sparse_region_scores_below_solid() {
        let m = merger();
        let solid = rect_region(0, 0, 200, 40, 5);

        // Same box, but only the two far corners matched.
        let mut sparse = Region::seed(0, 0, [40, 200, 90]);
        sparse.include(200, 40, [40, 200, 90]);

        assert!(m.confidence(&solid) > m.confidence(&sparse));
        assert!(m.confidence(&sparse) < 0.01);
    }
}
