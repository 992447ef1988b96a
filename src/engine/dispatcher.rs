/// Candidate selection and pointer dispatch with a fallback chain.
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::detection::{Candidate, CandidateMerger, RegionDetector};
use crate::engine::dedup::DedupCache;
use crate::error::DispatchError;
use crate::filter::OfferDetails;
use crate::frame::Frame;
use crate::messaging::{EngineEvent, EventBus};

/// Synthetic pointer capability boundary.
pub trait PointerAction: Send {
    fn dispatch(&mut self, x: u32, y: u32) -> Result<(), DispatchError>;

    /// Extended form for natural-motion gestures: follow `path` over
    /// roughly `duration`, then activate at the final point. The default
    /// degrades to a plain dispatch at the path's end.
    fn dispatch_path(
        &mut self,
        path: &[(u32, u32)],
        _duration: Duration,
    ) -> Result<(), DispatchError> {
        match path.last() {
            Some(&(x, y)) => self.dispatch(x, y),
            None => Ok(()),
        }
    }
}

/// How a dispatch attempt was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// Direct dispatch on the detector's best candidate.
    Primary,
    /// Second detection pass with the wider color set, then dispatch.
    FallbackRescan,
    /// Both dispatch attempts failed; a human was notified.
    ManualIntervention,
    /// Same identity was dispatched within the dedup TTL window.
    Suppressed,
}

/// Record of one dispatch decision, published for observability.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub succeeded: bool,
    pub strategy: DispatchStrategy,
    pub target: (u32, u32),
    pub at: Instant,
    pub error: Option<String>,
}

pub struct ActionDispatcher {
    pointer: Box<dyn PointerAction>,
    /// Same detector code as the primary pass, parameterized with the
    /// broader color-range variants. Runs single-threaded over the full
    /// frame, once, only after a primary failure.
    fallback_detector: RegionDetector,
    merger: CandidateMerger,
    bus: EventBus,
}

impl ActionDispatcher {
    pub fn new(
        pointer: Box<dyn PointerAction>,
        fallback_detector: RegionDetector,
        merger: CandidateMerger,
        bus: EventBus,
    ) -> Self {
        Self {
            pointer,
            fallback_detector,
            merger,
            bus,
        }
    }

    /// Dispatch on the best of this cycle's candidates.
    ///
    /// Returns `None` only when there is nothing to act on (no candidates,
    /// or stop was requested before the first pointer call). Every other
    /// path yields an ActionResult: success, fallback success, suppressed,
    /// or unresolved after the fallback chain.
    pub fn dispatch(
        &mut self,
        frame: &Frame,
        candidates: &[Candidate],
        dedup: &mut DedupCache,
        stop: &CancelToken,
        context: Option<&OfferDetails>,
        now: Instant,
    ) -> Option<ActionResult> {
        let best = candidates.iter().max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        let target = best.centroid();

        if dedup.is_suppressed(target, now) {
            let result = ActionResult {
                succeeded: false,
                strategy: DispatchStrategy::Suppressed,
                target,
                at: now,
                error: None,
            };
            tracing::debug!(
                "dispatch at ({}, {}) suppressed by dedup cache",
                target.0,
                target.1
            );
            self.bus.publish(EngineEvent::DispatchAttempted {
                result: result.clone(),
            });
            return Some(result);
        }

        // No dispatch may happen once stop has been requested.
        if stop.is_cancelled() {
            return None;
        }

        dedup.record(target, now);
        let result = match self.pointer.dispatch(target.0, target.1) {
            Ok(()) => {
                tracing::info!(
                    "dispatched at ({}, {}) with confidence {:.2}",
                    target.0,
                    target.1,
                    best.confidence
                );
                ActionResult {
                    succeeded: true,
                    strategy: DispatchStrategy::Primary,
                    target,
                    at: now,
                    error: None,
                }
            }
            Err(primary_err) => {
                tracing::warn!("primary dispatch failed: {}", primary_err);
                self.run_fallback_chain(frame, target, dedup, stop, context, now, primary_err)
            }
        };

        self.bus.publish(EngineEvent::DispatchAttempted {
            result: result.clone(),
        });
        Some(result)
    }

    /// Failure path: one wider re-detection, then a manual-intervention
    /// notification. Never retries beyond that.
    fn run_fallback_chain(
        &mut self,
        frame: &Frame,
        target: (u32, u32),
        dedup: &mut DedupCache,
        stop: &CancelToken,
        context: Option<&OfferDetails>,
        now: Instant,
        primary_err: DispatchError,
    ) -> ActionResult {
        let abort = || stop.is_cancelled();
        let regions = self.fallback_detector.scan(frame, &abort);
        let merged = self.merger.merge_regions(regions);
        let rescan_best = self
            .merger
            .candidates(frame.width(), frame.height(), merged)
            .into_iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        if let Some(candidate) = rescan_best {
            let rescan_target = candidate.centroid();
            if !stop.is_cancelled() {
                dedup.record(rescan_target, now);
                if self.pointer.dispatch(rescan_target.0, rescan_target.1).is_ok() {
                    tracing::info!(
                        "fallback rescan dispatched at ({}, {})",
                        rescan_target.0,
                        rescan_target.1
                    );
                    return ActionResult {
                        succeeded: true,
                        strategy: DispatchStrategy::FallbackRescan,
                        target: rescan_target,
                        at: now,
                        error: None,
                    };
                }
            }
        }

        // Unresolved: hand the coordinates and any parsed context to a
        // human instead of retrying indefinitely.
        tracing::warn!(
            "dispatch unresolved at ({}, {}), requesting manual intervention",
            target.0,
            target.1
        );
        self.bus.publish(EngineEvent::ManualInterventionRequired {
            x: target.0,
            y: target.1,
            amount: context.and_then(|c| c.amount),
            distance: context.and_then(|c| c.distance),
        });
        ActionResult {
            succeeded: false,
            strategy: DispatchStrategy::ManualIntervention,
            target,
            at: now,
            error: Some(primary_err.to_string()),
        }
    }
}
