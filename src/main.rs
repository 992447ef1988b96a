mod cancel;
mod capture;
mod config;
mod detection;
mod engine;
mod error;
mod filter;
mod frame;
mod messaging;
mod ocr;
mod pointer;
mod stats;

use display_info::DisplayInfo;
use sysinfo::System;

use capture::{CaptureRegion, MonitorSource};
use config::Config;
use detection::{CandidateMerger, RegionDetector};
use engine::{AppSignal, DetectionEngine};
use error::AppResult;
use filter::TextRecognizer;
use frame::FrameSource;
use messaging::EngineEvent;
use ocr::OcrRecognizer;
use pointer::SystemPointer;

const LOG_TARGET_STARTUP: &str = "offer_sniper::startup";

/// Initialize tracing with file rotation
///
/// Logs are written to:
/// - macOS: ~/Library/Application Support/OfferSniper/logs/
/// - Windows: %APPDATA%/OfferSniper/logs/
/// - Linux: ~/.config/OfferSniper/logs/
///
/// Log rotation:
/// - Daily rotation (new file each day)
///
/// Log output:
/// - Debug builds: Console + File
/// - Release builds: File only
fn initialize_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    use tracing_appender::rolling;

    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("OfferSniper").join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "offer-sniper.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

fn log_startup_info() {
    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::name().unwrap_or_else(|| "unknown".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "unknown".to_string());

    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Starting Offer Sniper v{}",
        version
    );
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Operating System: {} (kernel {})",
        os_name,
        kernel
    );

    if let Ok(displays) = DisplayInfo::all() {
        for disp in displays {
            tracing::debug!(
                target: LOG_TARGET_STARTUP,
                "Display: {}x{} at ({}, {}) primary={}",
                disp.width,
                disp.height,
                disp.x,
                disp.y,
                disp.is_primary
            );
        }
    }
}

fn main() {
    initialize_tracing();
    log_startup_info();

    // CONFIG_INVALID is the one fatal error class, and only at startup.
    let cfg = match Config::load().and_then(|cfg| cfg.validate().map(|_| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Config path: {}", Config::config_path_display());
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().collect();
    let result = if args.len() > 1 && args[1] == "--probe" {
        run_probe(&cfg)
    } else {
        run_engine(cfg)
    };

    if let Err(e) = result {
        eprintln!("Fatal: {e:#}");
        std::process::exit(1);
    }
}

/// Run the detection engine until Ctrl+C.
fn run_engine(cfg: Config) -> AppResult<()> {
    let region = CaptureRegion::from_array(cfg.capture_region);
    let frames = Box::new(MonitorSource::primary(region)?);
    let pointer = Box::new(SystemPointer::new());

    // The offer-text gate needs OCR; only pay for it when criteria (or the
    // bypass diagnostics) are configured.
    let recognizer: Option<Box<dyn TextRecognizer>> =
        if cfg.filter.is_restrictive() || cfg.filter.bypass {
            Some(Box::new(OcrRecognizer::new()?))
        } else {
            None
        };

    // The standalone binary has no embedder feeding app state, so the
    // watched region counts as always reachable. Embedders wire the real
    // signal through this handle instead.
    let signal = AppSignal::new();
    signal.set_active(true);

    let engine = DetectionEngine::new(cfg, frames, pointer, recognizer, signal)?;
    let bus = engine.bus();
    let (events, _subscription) = bus.subscribe();
    let stop = engine.stop_token();

    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        stop.cancel();
    })?;

    let handle = engine.start()?;

    // Surface engine events in the log until shutdown.
    for event in events.iter() {
        match &event {
            EngineEvent::DispatchAttempted { .. }
            | EngineEvent::ManualInterventionRequired { .. }
            | EngineEvent::ModeChanged { .. } => {
                tracing::info!("{}", event.description());
            }
            EngineEvent::Shutdown => break,
            _ => tracing::trace!("{}", event.description()),
        }
    }

    handle.stop();
    Ok(())
}

/// One-shot diagnostic: capture a single frame, run the detection stages
/// inline and print what would have been acted on. Never dispatches.
fn run_probe(cfg: &Config) -> AppResult<()> {
    println!("Offer Sniper probe");
    println!("  capture region: {:?}", cfg.capture_region);
    println!("  color variants: {}", cfg.detection.color_ranges.len());

    let region = CaptureRegion::from_array(cfg.capture_region);
    let mut source = MonitorSource::primary(region)?;
    let frame = source
        .latest_frame()?
        .ok_or_else(|| anyhow::anyhow!("frame source returned no frame"))?;
    println!("  captured {}x{}", frame.width(), frame.height());

    let screenshot_path = "probe-capture.png";
    frame.as_image().save(screenshot_path)?;
    println!("  saved {}", screenshot_path);

    let d = &cfg.detection;
    let detector = RegionDetector::new(d.color_ranges.clone(), d.grid_step);
    let merger = CandidateMerger::new(d.proximity_px, d.grid_step, d.shape, d.confidence_floor);

    let regions = detector.scan(&frame, &|| false);
    println!("  raw regions: {}", regions.len());

    let candidates = merger.candidates(frame.width(), frame.height(), merger.merge_regions(regions));
    println!("  candidates after merge/shape/score: {}", candidates.len());

    for (i, candidate) in candidates.iter().enumerate() {
        let (cx, cy) = candidate.centroid();
        println!(
            "    #{}: centroid ({}, {}), {}x{}, confidence {:.2}, color {:?}",
            i + 1,
            cx,
            cy,
            candidate.region.width(),
            candidate.region.height(),
            candidate.confidence,
            candidate.average_color
        );
    }

    if candidates.is_empty() {
        println!("  nothing to dispatch on this frame");
    }
    Ok(())
}
