/// Detection engine: the single logical sequencer that owns the polling
/// loop, the cadence state machine, both caches and the dispatcher.
pub mod dedup;
pub mod dispatcher;
pub mod scheduler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::RwLock;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::detection::{
    Candidate, CandidateMerger, ChangeFilter, ParallelScanner, RegionDetector,
};
use crate::error::{AppResult, DetectionError};
use crate::filter::{FilterEvaluator, OfferDetails, TextRecognizer};
use crate::frame::{Frame, FrameSource};
use crate::messaging::{EngineEvent, EventBus, SkipReason};
use crate::stats::{CycleStats, CycleTiming, Timer};

pub use dedup::{DedupCache, DedupConfig};
pub use dispatcher::{ActionDispatcher, ActionResult, DispatchStrategy, PointerAction};
pub use scheduler::{CadenceConfig, DetectionMode, DetectionScheduler};

#[derive(Debug, Default)]
struct SignalState {
    active: bool,
    last_seen: Option<Instant>,
}

/// Shared "target application reachable" signal.
///
/// The embedder writes it from wherever the app-state information comes
/// from; the engine only reads it when deciding cadence.
#[derive(Debug, Clone, Default)]
pub struct AppSignal {
    state: Arc<RwLock<SignalState>>,
}

impl AppSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, active: bool) {
        let mut state = self.state.write();
        state.active = active;
        if active {
            state.last_seen = Some(Instant::now());
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    #[allow(dead_code)]
    pub fn last_seen(&self) -> Option<Instant> {
        self.state.read().last_seen
    }
}

/// Handle to a running engine thread.
pub struct EngineHandle {
    stop: CancelToken,
    thread: JoinHandle<()>,
}

impl EngineHandle {
    /// Request the loop to stop. In-flight band work is cancelled and no
    /// dispatch happens after this call returns.
    #[allow(dead_code)]
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Request stop and wait for the loop thread to exit.
    pub fn stop(self) {
        self.stop.cancel();
        let _ = self.thread.join();
    }
}

pub struct DetectionEngine {
    frames: Box<dyn FrameSource>,
    detector: Arc<RegionDetector>,
    scanner: ParallelScanner,
    merger: CandidateMerger,
    change_filter: ChangeFilter,
    scheduler: DetectionScheduler,
    dedup: DedupCache,
    dispatcher: ActionDispatcher,
    recognizer: Option<Box<dyn TextRecognizer>>,
    evaluator: FilterEvaluator,
    signal: AppSignal,
    bus: EventBus,
    stop: CancelToken,
    cycle_busy: Arc<AtomicBool>,
    stats: CycleStats,
    enable_change_filter: bool,
    cycle_budget: Duration,
}

impl DetectionEngine {
    /// Build an engine from validated configuration and the external
    /// capability adapters. Config problems are fatal here, before the
    /// loop ever starts.
    ///
    /// Supply a `recognizer` to enable the offer-text gate; without one,
    /// candidates dispatch on shape and color alone.
    pub fn new(
        config: Config,
        frames: Box<dyn FrameSource>,
        pointer: Box<dyn PointerAction>,
        recognizer: Option<Box<dyn TextRecognizer>>,
        signal: AppSignal,
    ) -> AppResult<Self> {
        config.validate()?;

        let d = &config.detection;
        let bus = EventBus::new();
        let detector = Arc::new(RegionDetector::new(d.color_ranges.clone(), d.grid_step));
        let fallback_detector =
            RegionDetector::new(d.fallback_color_ranges.clone(), d.grid_step);
        let merger =
            CandidateMerger::new(d.proximity_px, d.grid_step, d.shape, d.confidence_floor);
        let dispatcher_merger =
            CandidateMerger::new(d.proximity_px, d.grid_step, d.shape, d.confidence_floor);
        let dispatcher =
            ActionDispatcher::new(pointer, fallback_detector, dispatcher_merger, bus.clone());
        let evaluator = FilterEvaluator::new(config.filter.clone())?;

        if config.filter.bypass {
            tracing::warn!(
                "filter bypass is enabled: offer criteria will be evaluated but never block dispatch"
            );
        }

        Ok(Self {
            frames,
            detector,
            scanner: ParallelScanner::new(d.band_count),
            merger,
            change_filter: ChangeFilter::new(),
            scheduler: DetectionScheduler::new(config.cadence),
            dedup: DedupCache::new(config.dedup),
            dispatcher,
            recognizer,
            evaluator,
            signal,
            bus,
            stop: CancelToken::new(),
            cycle_busy: Arc::new(AtomicBool::new(false)),
            stats: CycleStats::new(),
            enable_change_filter: d.enable_change_filter,
            cycle_budget: Duration::from_millis(d.cycle_budget_ms),
        })
    }

    /// Clone of the event bus for subscribing before start.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn stop_token(&self) -> CancelToken {
        self.stop.clone()
    }

    /// Spawn the polling loop on its own thread.
    pub fn start(self) -> AppResult<EngineHandle> {
        let stop = self.stop.clone();
        let thread = thread::Builder::new()
            .name("detection-loop".to_string())
            .spawn(move || self.run())
            .context("failed to spawn detection loop thread")?;
        Ok(EngineHandle { stop, thread })
    }

    /// The supervisory polling loop. A failed cycle is logged and skipped;
    /// only stop requests end the loop.
    fn run(mut self) {
        tracing::info!("detection loop started in {} mode", self.scheduler.mode().description());

        while !self.stop.is_cancelled() {
            let interval = match self.run_cycle() {
                Ok(interval) => interval,
                Err(e) => {
                    tracing::warn!("detection cycle failed: {e:#}");
                    self.scheduler
                        .advance(self.signal.is_active(), false, Instant::now())
                }
            };
            self.sleep_interruptible(interval);
        }

        self.bus.publish(EngineEvent::Shutdown);
        self.stats.report();
        tracing::info!("detection loop stopped");
    }

    /// Run one cycle behind the busy guard. The guard matters for
    /// embedders that drive cycles from more than one place; the loop
    /// itself is strictly sequential.
    fn run_cycle(&mut self) -> AppResult<Duration> {
        if self.cycle_busy.swap(true, Ordering::SeqCst) {
            self.bus.publish(EngineEvent::CycleSkipped {
                reason: SkipReason::CycleBusy,
            });
            return Ok(self.scheduler.interval());
        }
        let result = self.cycle_inner();
        self.cycle_busy.store(false, Ordering::SeqCst);
        result
    }

    fn cycle_inner(&mut self) -> AppResult<Duration> {
        let total_timer = Timer::start();
        let mut timing = CycleTiming::new();
        let target_active = self.signal.is_active();

        // Acquisition. A missing frame is a skipped cycle, not an error.
        let capture_timer = Timer::start();
        let frame = match self.frames.latest_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!("no frame available, skipping cycle");
                self.bus.publish(EngineEvent::CycleSkipped {
                    reason: SkipReason::FrameUnavailable,
                });
                return Ok(self.advance_scheduler(target_active, false));
            }
            Err(e) => {
                tracing::debug!("frame acquisition failed: {e}");
                self.bus.publish(EngineEvent::CycleSkipped {
                    reason: SkipReason::FrameUnavailable,
                });
                return Ok(self.advance_scheduler(target_active, false));
            }
        };
        timing.capture_us = capture_timer.elapsed_us();

        // Cheap unchanged-frame short circuit.
        let hash_timer = Timer::start();
        if self.enable_change_filter && !self.change_filter.has_changed(&frame) {
            self.bus.publish(EngineEvent::CycleSkipped {
                reason: SkipReason::FrameUnchanged,
            });
            return Ok(self.advance_scheduler(target_active, false));
        }
        timing.hash_us = hash_timer.elapsed_us();

        // Concurrent band scan with barrier join.
        let scan_timer = Timer::start();
        let frame = Arc::new(frame);
        let regions = match self
            .scanner
            .scan(&frame, &self.detector, &self.stop, self.cycle_budget)
        {
            Ok(regions) => regions,
            Err(DetectionError::CycleTimeout { budget_ms }) => {
                tracing::warn!("cycle abandoned: bands missed {budget_ms}ms budget");
                self.bus.publish(EngineEvent::CycleTimedOut { budget_ms });
                return Ok(self.advance_scheduler(target_active, false));
            }
            Err(DetectionError::Cancelled) => {
                return Ok(self.scheduler.interval());
            }
            Err(e) => return Err(e.into()),
        };
        timing.scan_us = scan_timer.elapsed_us();

        // Merge, filter, score.
        let merge_timer = Timer::start();
        let merged = self.merger.merge_regions(regions);
        let candidates = self
            .merger
            .candidates(frame.width(), frame.height(), merged);
        timing.merge_us = merge_timer.elapsed_us();

        let found = !candidates.is_empty();
        let interval = self.advance_scheduler(target_active, found);

        self.dedup.sweep(Instant::now());

        let dispatch_timer = Timer::start();
        if found {
            self.gate_and_dispatch(&frame, &candidates)?;
        }
        timing.dispatch_us = dispatch_timer.elapsed_us();

        timing.total_us = total_timer.elapsed_us();
        self.bus.publish(EngineEvent::CycleCompleted {
            candidates: candidates.len(),
            mode: self.scheduler.mode(),
            timing,
        });
        self.stats.add(timing);

        Ok(interval)
    }

    /// Optional offer-text gate, then dispatch.
    fn gate_and_dispatch(&mut self, frame: &Arc<Frame>, candidates: &[Candidate]) -> AppResult<()> {
        let mut context: Option<OfferDetails> = None;

        if let Some(recognizer) = self.recognizer.as_mut() {
            let tokens = match recognizer.recognize(frame) {
                Ok(tokens) => tokens,
                Err(e) => {
                    // Same policy as a missing frame: skip rather than
                    // dispatch on an offer we could not read.
                    tracing::debug!("text recognition failed, skipping dispatch: {e}");
                    return Ok(());
                }
            };
            let verdict = self.evaluator.evaluate(&tokens);
            context = Some(verdict.details.clone());

            if !verdict.accepted {
                tracing::debug!(
                    "candidate rejected by filter: amount {:?}, distance {:?}",
                    verdict.details.amount,
                    verdict.details.distance
                );
                self.bus.publish(EngineEvent::CandidateRejected {
                    details: verdict.details,
                });
                return Ok(());
            }
            if verdict.bypassed {
                tracing::warn!("filter criteria not met but bypass is enabled, dispatching anyway");
            }
        }

        self.dispatcher.dispatch(
            frame,
            candidates,
            &mut self.dedup,
            &self.stop,
            context.as_ref(),
            Instant::now(),
        );
        Ok(())
    }

    fn advance_scheduler(&mut self, target_active: bool, found: bool) -> Duration {
        let before = self.scheduler.mode();
        let interval = self.scheduler.advance(target_active, found, Instant::now());
        let after = self.scheduler.mode();
        if before != after {
            tracing::info!("mode {} -> {}", before.description(), after.description());
            self.bus.publish(EngineEvent::ModeChanged {
                from: before,
                to: after,
            });
        }
        interval
    }

    /// Sleep in small slices so a stop request is honored promptly even in
    /// idle cadence.
    fn sleep_interruptible(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        while !self.stop.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }
}
