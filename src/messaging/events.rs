/// Engine observability events.
///
/// Events represent things that have happened (past tense). They are
/// broadcast to all subscribers over the event bus.
use crate::engine::dispatcher::ActionResult;
use crate::engine::scheduler::DetectionMode;
use crate::filter::OfferDetails;
use crate::stats::CycleTiming;

/// Why a cycle produced no detection work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Frame source had nothing to offer this cycle.
    FrameUnavailable,
    /// Sparse-sample hash matched the previous frame.
    FrameUnchanged,
    /// A previous cycle is still in flight; the new frame was dropped.
    CycleBusy,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A full detection cycle ran to completion.
    CycleCompleted {
        candidates: usize,
        mode: DetectionMode,
        timing: CycleTiming,
    },

    /// A cycle ended early without scanning.
    CycleSkipped { reason: SkipReason },

    /// Band workers missed the cycle budget; results were discarded.
    CycleTimedOut { budget_ms: u64 },

    /// The cadence state machine changed mode.
    ModeChanged {
        from: DetectionMode,
        to: DetectionMode,
    },

    /// The offer-text gate rejected the cycle's best candidate.
    CandidateRejected { details: OfferDetails },

    /// A dispatch attempt was made (or suppressed); carries the outcome.
    DispatchAttempted { result: ActionResult },

    /// Automatic dispatch could not resolve the target; a human should
    /// look at these coordinates.
    ManualInterventionRequired {
        x: u32,
        y: u32,
        amount: Option<f64>,
        distance: Option<f64>,
    },

    /// The engine is shutting down.
    Shutdown,
}

impl EngineEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            EngineEvent::CycleCompleted {
                candidates, mode, ..
            } => {
                format!(
                    "cycle completed: {} candidate(s), mode {}",
                    candidates,
                    mode.description()
                )
            }
            EngineEvent::CycleSkipped { reason } => format!("cycle skipped: {:?}", reason),
            EngineEvent::CycleTimedOut { budget_ms } => {
                format!("cycle abandoned after {}ms budget", budget_ms)
            }
            EngineEvent::ModeChanged { from, to } => {
                format!("mode {} -> {}", from.description(), to.description())
            }
            EngineEvent::CandidateRejected { details } => {
                format!(
                    "candidate rejected by filter (amount {:?}, distance {:?})",
                    details.amount, details.distance
                )
            }
            EngineEvent::DispatchAttempted { result } => {
                format!(
                    "dispatch {} via {:?} at ({}, {})",
                    if result.succeeded { "succeeded" } else { "failed" },
                    result.strategy,
                    result.target.0,
                    result.target.1
                )
            }
            EngineEvent::ManualInterventionRequired { x, y, .. } => {
                format!("manual intervention required at ({}, {})", x, y)
            }
            EngineEvent::Shutdown => "shutting down".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_description() {
        let event = EngineEvent::ManualInterventionRequired {
            x: 200,
            y: 120,
            amount: None,
            distance: None,
        };
        assert_eq!(
            event.description(),
            "manual intervention required at (200, 120)"
        );

        let event = EngineEvent::CycleTimedOut { budget_ms: 250 };
        assert_eq!(event.description(), "cycle abandoned after 250ms budget");
    }
}
