use display_info::DisplayInfo;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::detection::merger::ShapeEnvelope;
use crate::detection::ColorRange;
use crate::engine::dedup::DedupConfig;
use crate::engine::scheduler::CadenceConfig;
use crate::error::ConfigError;
use crate::filter::FilterCriteria;

fn default_capture_region() -> [u32; 4] {
    let (screen_width, screen_height) = DisplayInfo::all()
        .ok()
        .and_then(|infos| {
            let display = infos
                .iter()
                .find(|d| d.is_primary)
                .or_else(|| infos.first());
            display.map(|d| (d.width as u32, d.height as u32))
        })
        .unwrap_or((1920, 1080));

    // Offer cards pop up in the lower half of the target app's window.
    let screen_width = screen_width.max(1);
    let screen_height = screen_height.max(1);
    let capture_height = (screen_height / 2).max(1);
    let capture_y = screen_height.saturating_sub(capture_height);

    [0, capture_y, screen_width, capture_height]
}

fn default_color_ranges() -> Vec<ColorRange> {
    // The accept control ships in two green shades depending on app theme;
    // the intervals tolerate capture compression drift.
    vec![
        ColorRange::new((18, 74), (176, 232), (85, 141)),
        ColorRange::new((11, 67), (146, 202), (68, 124)),
    ]
}

fn default_fallback_color_ranges() -> Vec<ColorRange> {
    // Wider envelopes for the post-failure rescan pass.
    vec![
        ColorRange::around([46, 204, 113], 55),
        ColorRange::around([39, 174, 96], 55),
    ]
}

/// Scan-side settings: sampling, banding, merge and scoring thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Target color variants (OR across the list).
    pub color_ranges: Vec<ColorRange>,

    /// Broader variants used by the dispatcher's fallback rescan.
    pub fallback_color_ranges: Vec<ColorRange>,

    /// Sampling stride in pixels; the flood fill expands at the same stride.
    pub grid_step: u32,

    /// Number of horizontal scan bands run concurrently.
    pub band_count: u32,

    /// Bounding boxes closer than this merge into one candidate.
    pub proximity_px: u32,

    /// Size and aspect envelopes a merged region must satisfy.
    pub shape: ShapeEnvelope,

    /// Candidates scoring below this are discarded.
    pub confidence_floor: f32,

    /// Skip cycles whose sparse-sample hash matches the previous frame.
    pub enable_change_filter: bool,

    /// Wall-clock budget for one detection cycle; slower cycles are
    /// abandoned to preserve cadence.
    pub cycle_budget_ms: u64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            color_ranges: default_color_ranges(),
            fallback_color_ranges: default_fallback_color_ranges(),
            grid_step: 6,
            band_count: 4,
            proximity_px: 20,
            shape: ShapeEnvelope::default(),
            confidence_floor: 0.35,
            enable_change_filter: true,
            cycle_budget_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Screen region to watch [x, y, width, height]
    pub capture_region: [u32; 4],

    pub detection: DetectionSettings,

    pub cadence: CadenceConfig,

    pub dedup: DedupConfig,

    #[serde(default)]
    pub filter: FilterCriteria,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_region: default_capture_region(),
            detection: DetectionSettings::default(),
            cadence: CadenceConfig::default(),
            dedup: DedupConfig::default(),
            filter: FilterCriteria::default(),
        }
    }
}

impl Config {
    /// Load configuration from the platform-specific config directory.
    /// Creates default config if file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::LoadFailed {
                path: config_path.display().to_string(),
                source: Box::new(e),
            })?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: config_path.display().to_string(),
                    source: Box::new(e),
                })?;
            tracing::info!("loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            tracing::info!("created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed {
                path: config_path.display().to_string(),
                source: Box::new(e),
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: config_path.display().to_string(),
            source: Box::new(e),
        })?;
        fs::write(&config_path, json).map_err(|e| ConfigError::SaveFailed {
            path: config_path.display().to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("OfferSniper")
            .join("config.json")
    }

    /// Get the config file path (for display purposes)
    pub fn config_path_display() -> String {
        Self::config_path().display().to_string()
    }

    /// Reject malformed settings before the engine loop ever starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [_, _, width, height] = self.capture_region;
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture region {:?} has zero area",
                self.capture_region
            )));
        }

        let d = &self.detection;
        if d.color_ranges.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one color range is required".to_string(),
            ));
        }
        for range in d.color_ranges.iter().chain(&d.fallback_color_ranges) {
            range.validate()?;
        }
        if d.grid_step == 0 {
            return Err(ConfigError::Invalid("grid_step must be positive".to_string()));
        }
        if d.band_count == 0 {
            return Err(ConfigError::Invalid("band_count must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&d.confidence_floor) {
            return Err(ConfigError::Invalid(format!(
                "confidence_floor {} is outside [0, 1]",
                d.confidence_floor
            )));
        }
        if d.cycle_budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "cycle_budget_ms must be positive".to_string(),
            ));
        }
        d.shape.validate()?;
        self.cadence.validate()?;
        self.dedup.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.band_count, 4);
        assert_eq!(config.detection.proximity_px, 20);
        assert_eq!(config.dedup.ttl_ms, 500);
        assert!(!config.filter.bypass);
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.capture_region, deserialized.capture_region);
        assert_eq!(
            config.detection.color_ranges,
            deserialized.detection.color_ranges
        );
        assert_eq!(config.cadence.idle_interval_ms, deserialized.cadence.idle_interval_ms);
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let mut config = Config::default();
        config.detection.grid_step = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.color_ranges.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture_region = [0, 0, 0, 100];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.confidence_floor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_filter_section_defaults_off() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value.as_object_mut().unwrap().remove("filter");

        let config: Config = serde_json::from_value(value).unwrap();
        assert!(!config.filter.is_restrictive());
        assert!(!config.filter.bypass);
    }
}
