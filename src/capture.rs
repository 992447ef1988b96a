use xcap::Monitor;

use crate::error::CaptureError;
use crate::frame::{Frame, FrameSource};

/// Represents a screen region to capture
#[derive(Debug, Clone, Copy)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_array(arr: [u32; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }
}

/// Pull-based frame source backed by the primary monitor.
///
/// Every call grabs the latest screen contents and crops to the configured
/// region; there is no queue, so a slow cycle simply sees a fresher frame
/// next time (bounded staleness).
///
/// # Platform Notes
/// - macOS needs the Screen Recording permission (System Preferences >
///   Security & Privacy > Privacy > Screen Recording).
/// - Windows uses the Graphics.Capture path, no special permission.
/// - Linux capture behavior varies by compositor.
pub struct MonitorSource {
    monitor: Monitor,
    region: CaptureRegion,
}

impl MonitorSource {
    /// Attach to the primary monitor and validate the region against its
    /// bounds.
    pub fn primary(region: CaptureRegion) -> Result<Self, CaptureError> {
        let monitors =
            Monitor::all().map_err(|e| CaptureError::InitFailed(Box::new(e)))?;
        let monitor = monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .ok_or(CaptureError::NoDisplays)?;

        let monitor_width = monitor
            .width()
            .map_err(|e| CaptureError::InitFailed(Box::new(e)))?;
        let monitor_height = monitor
            .height()
            .map_err(|e| CaptureError::InitFailed(Box::new(e)))?;

        if region.x.saturating_add(region.width) > monitor_width
            || region.y.saturating_add(region.height) > monitor_height
        {
            return Err(CaptureError::RegionOutOfBounds([
                region.x,
                region.y,
                region.width,
                region.height,
            ]));
        }

        tracing::info!(
            "capturing {}x{} at ({}, {}) on monitor {}",
            region.width,
            region.height,
            region.x,
            region.y,
            monitor.name().unwrap_or_default()
        );

        Ok(Self { monitor, region })
    }
}

impl FrameSource for MonitorSource {
    fn latest_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let image = self
            .monitor
            .capture_image()
            .map_err(|e| CaptureError::CaptureFailed(Box::new(e)))?;

        let cropped = image::imageops::crop_imm(
            &image,
            self.region.x,
            self.region.y,
            self.region.width,
            self.region.height,
        )
        .to_image();

        Ok(Some(Frame::new(cropped)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_region_creation() {
        let region = CaptureRegion::new(0, 0, 200, 100);
        assert_eq!(region.x, 0);
        assert_eq!(region.y, 0);
        assert_eq!(region.width, 200);
        assert_eq!(region.height, 100);
    }

    #[test]
    fn test_capture_region_from_array() {
        let region = CaptureRegion::from_array([10, 20, 300, 150]);
        assert_eq!(region.x, 10);
        assert_eq!(region.y, 20);
        assert_eq!(region.width, 300);
        assert_eq!(region.height, 150);
    }
}
