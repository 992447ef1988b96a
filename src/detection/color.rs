use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Inclusive RGB interval describing one appearance of the target control.
///
/// Several variants are usually configured together so that lighting and
/// compression drift still classify as a match (OR across the list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub r_min: u8,
    pub r_max: u8,
    pub g_min: u8,
    pub g_max: u8,
    pub b_min: u8,
    pub b_max: u8,
}

impl ColorRange {
    pub fn new(r: (u8, u8), g: (u8, u8), b: (u8, u8)) -> Self {
        Self {
            r_min: r.0,
            r_max: r.1,
            g_min: g.0,
            g_max: g.1,
            b_min: b.0,
            b_max: b.1,
        }
    }

    /// Range centered on a reference color with a symmetric tolerance.
    pub fn around(center: [u8; 3], tolerance: u8) -> Self {
        Self {
            r_min: center[0].saturating_sub(tolerance),
            r_max: center[0].saturating_add(tolerance),
            g_min: center[1].saturating_sub(tolerance),
            g_max: center[1].saturating_add(tolerance),
            b_min: center[2].saturating_sub(tolerance),
            b_max: center[2].saturating_add(tolerance),
        }
    }

    #[inline]
    pub fn contains(&self, rgb: [u8; 3]) -> bool {
        rgb[0] >= self.r_min
            && rgb[0] <= self.r_max
            && rgb[1] >= self.g_min
            && rgb[1] <= self.g_max
            && rgb[2] >= self.b_min
            && rgb[2] <= self.b_max
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.r_min > self.r_max || self.g_min > self.g_max || self.b_min > self.b_max {
            return Err(ConfigError::Invalid(format!(
                "color range has min above max: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// True when any configured variant classifies the pixel as the target color.
#[inline]
pub fn matches_any(ranges: &[ColorRange], rgb: [u8; 3]) -> bool {
    ranges.iter().any(|range| range.contains(rgb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_inclusive() {
        let range = ColorRange::new((10, 20), (30, 40), (50, 60));
        assert!(range.contains([10, 30, 50]));
        assert!(range.contains([20, 40, 60]));
        assert!(range.contains([15, 35, 55]));
        assert!(!range.contains([9, 35, 55]));
        assert!(!range.contains([15, 41, 55]));
    }

    #[test]
    fn test_around_saturates_at_bounds() {
        let range = ColorRange::around([5, 250, 128], 10);
        assert_eq!(range.r_min, 0);
        assert_eq!(range.g_max, 255);
        assert_eq!(range.b_min, 118);
        assert_eq!(range.b_max, 138);
    }

    #[test]
    fn test_matches_any_is_or_across_variants() {
        let ranges = vec![
            ColorRange::around([200, 50, 50], 20),
            ColorRange::around([50, 200, 50], 20),
        ];
        assert!(matches_any(&ranges, [210, 45, 55]));
        assert!(matches_any(&ranges, [45, 210, 55]));
        assert!(!matches_any(&ranges, [50, 50, 200]));
    }

    #[test]
    fn test_validate_rejects_inverted_interval() {
        let range = ColorRange::new((20, 10), (0, 255), (0, 255));
        assert!(range.validate().is_err());
        assert!(ColorRange::around([128, 128, 128], 30).validate().is_ok());
    }
}
