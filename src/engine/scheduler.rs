/// Scan-cadence state machine.
///
/// Selects the next poll interval from three modes. The scheduler never
/// sleeps or blocks; it only reports how long the sequencer should wait
/// before the next cycle.
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Current cadence of the detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Target application not reachable, nothing seen recently: slow poll.
    Idle,
    /// Target reachable but no candidate yet: medium poll.
    Active,
    /// A candidate was just seen: fast poll until the cool-down lapses.
    Burst,
}

impl DetectionMode {
    pub fn description(&self) -> &'static str {
        match self {
            DetectionMode::Idle => "idle",
            DetectionMode::Active => "active",
            DetectionMode::Burst => "burst",
        }
    }
}

/// Per-mode poll intervals and the burst cool-down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CadenceConfig {
    pub idle_interval_ms: u64,
    pub active_interval_ms: u64,
    pub burst_interval_ms: u64,
    pub burst_cooldown_ms: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: 2000,
            active_interval_ms: 500,
            burst_interval_ms: 75,
            burst_cooldown_ms: 5000,
        }
    }
}

impl CadenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_interval_ms == 0
            || self.active_interval_ms == 0
            || self.burst_interval_ms == 0
        {
            return Err(ConfigError::Invalid(
                "cadence intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct DetectionScheduler {
    mode: DetectionMode,
    last_candidate: Option<Instant>,
    config: CadenceConfig,
}

impl DetectionScheduler {
    pub fn new(config: CadenceConfig) -> Self {
        Self {
            mode: DetectionMode::Idle,
            last_candidate: None,
            config,
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Fold one cycle's outcome into the state machine and return the
    /// interval to sleep before the next cycle.
    ///
    /// - Any candidate this cycle promotes to Burst, effective next cycle.
    /// - Burst decays to Active or Idle once the cool-down passes with no
    ///   further candidates.
    /// - Otherwise the target-reachable signal picks Active vs Idle.
    pub fn advance(
        &mut self,
        target_active: bool,
        candidate_seen: bool,
        now: Instant,
    ) -> Duration {
        if candidate_seen {
            self.last_candidate = Some(now);
            self.mode = DetectionMode::Burst;
        } else {
            match self.mode {
                DetectionMode::Burst => {
                    let cooled = self
                        .last_candidate
                        .map(|at| now.duration_since(at) >= self.cooldown())
                        .unwrap_or(true);
                    if cooled {
                        self.mode = if target_active {
                            DetectionMode::Active
                        } else {
                            DetectionMode::Idle
                        };
                    }
                }
                DetectionMode::Active => {
                    if !target_active {
                        self.mode = DetectionMode::Idle;
                    }
                }
                DetectionMode::Idle => {
                    if target_active {
                        self.mode = DetectionMode::Active;
                    }
                }
            }
        }

        self.interval()
    }

    pub fn interval(&self) -> Duration {
        let ms = match self.mode {
            DetectionMode::Idle => self.config.idle_interval_ms,
            DetectionMode::Active => self.config.active_interval_ms,
            DetectionMode::Burst => self.config.burst_interval_ms,
        };
        Duration::from_millis(ms)
    }

    fn cooldown(&self) -> Duration {
        Duration::from_millis(self.config.burst_cooldown_ms)
    }
}
