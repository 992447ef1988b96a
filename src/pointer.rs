use std::thread;
use std::time::Duration;

use rand::Rng;
use rdev::{simulate, Button, EventType};

use crate::engine::PointerAction;
use crate::error::DispatchError;

/// Delay between synthetic events so the OS input pipeline keeps up.
const EVENT_SETTLE: Duration = Duration::from_millis(20);

/// Pointer capability backed by OS-level event simulation.
pub struct SystemPointer {
    jitter_px: f64,
}

impl SystemPointer {
    pub fn new() -> Self {
        Self { jitter_px: 2.0 }
    }

    fn send(event: &EventType) -> Result<(), DispatchError> {
        simulate(event).map_err(|_| DispatchError::SimulationFailed)?;
        thread::sleep(EVENT_SETTLE);
        Ok(())
    }

    fn click(x: f64, y: f64) -> Result<(), DispatchError> {
        Self::send(&EventType::MouseMove { x, y })?;
        Self::send(&EventType::ButtonPress(Button::Left))?;
        Self::send(&EventType::ButtonRelease(Button::Left))?;
        Ok(())
    }
}

impl Default for SystemPointer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerAction for SystemPointer {
    fn dispatch(&mut self, x: u32, y: u32) -> Result<(), DispatchError> {
        Self::click(x as f64, y as f64)
    }

    /// Natural-motion form: walk the waypoints with a little positional
    /// jitter over roughly `duration`, then activate at the final point.
    fn dispatch_path(
        &mut self,
        path: &[(u32, u32)],
        duration: Duration,
    ) -> Result<(), DispatchError> {
        let Some(&(last_x, last_y)) = path.last() else {
            return Ok(());
        };

        let mut rng = rand::thread_rng();
        let step_pause = duration
            .checked_div(path.len() as u32)
            .unwrap_or(Duration::ZERO);

        for &(x, y) in &path[..path.len() - 1] {
            let jx = x as f64 + rng.gen_range(-self.jitter_px..=self.jitter_px);
            let jy = y as f64 + rng.gen_range(-self.jitter_px..=self.jitter_px);
            Self::send(&EventType::MouseMove { x: jx, y: jy })?;
            thread::sleep(step_pause);
        }

        Self::click(last_x as f64, last_y as f64)
    }
}
