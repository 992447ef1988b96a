use std::time::Instant;

/// Simple stopwatch for per-stage measurements.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1_000_000.0
    }
}

/// Timing measurements for a single detection cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleTiming {
    pub capture_us: f64,
    pub hash_us: f64,
    pub scan_us: f64,
    pub merge_us: f64,
    pub dispatch_us: f64,
    pub total_us: f64,
}

impl CycleTiming {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn total_ms(&self) -> f64 {
        self.total_us / 1000.0
    }
}

/// Statistics collector for cycle latency measurements
pub struct CycleStats {
    timings: Vec<CycleTiming>,
}

impl CycleStats {
    pub fn new() -> Self {
        Self {
            timings: Vec::new(),
        }
    }

    pub fn add(&mut self, timing: CycleTiming) {
        self.timings.push(timing);
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.timings.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx]
    }

    /// Calculate statistics for a specific stage
    fn stage_stats(&self, extract: impl Fn(&CycleTiming) -> f64) -> (f64, f64, f64, f64) {
        if self.timings.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut values: Vec<f64> = self.timings.iter().map(&extract).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let p50 = Self::percentile(&values, 50.0);
        let p95 = Self::percentile(&values, 95.0);
        let p99 = Self::percentile(&values, 99.0);

        (mean, p50, p95, p99)
    }

    /// Log a latency summary for the session.
    pub fn report(&self) {
        if self.timings.is_empty() {
            tracing::info!("no timing data collected");
            return;
        }

        tracing::info!("cycle latency over {} cycles:", self.timings.len());

        let stages: [(&str, fn(&CycleTiming) -> f64); 6] = [
            ("capture", |t| t.capture_us),
            ("hash", |t| t.hash_us),
            ("scan", |t| t.scan_us),
            ("merge", |t| t.merge_us),
            ("dispatch", |t| t.dispatch_us),
            ("total", |t| t.total_us),
        ];

        for (name, extract) in stages {
            let (mean, p50, p95, p99) = self.stage_stats(extract);
            tracing::info!(
                "  {:<9} mean {:>7.0}us  p50 {:>7.0}us  p95 {:>7.0}us  p99 {:>7.0}us",
                name,
                mean,
                p50,
                p95,
                p99
            );
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_timing_total_ms() {
        let timing = CycleTiming {
            total_us: 50_000.0,
            ..CycleTiming::new()
        };
        assert_eq!(timing.total_ms(), 50.0);
    }

    #[test]
    fn test_stats_collects() {
        let mut stats = CycleStats::new();
        assert!(stats.is_empty());

        stats.add(CycleTiming {
            capture_us: 10_000.0,
            scan_us: 15_000.0,
            total_us: 30_000.0,
            ..CycleTiming::new()
        });

        assert_eq!(stats.len(), 1);
        assert!(!stats.is_empty());
    }

    #[test]
    fn test_percentile_on_sorted_data() {
        let values: Vec<f64> = (0..100).map(|v| v as f64).collect();
        assert_eq!(CycleStats::percentile(&values, 50.0), 50.0);
        assert_eq!(CycleStats::percentile(&values, 99.0), 98.0);
        assert_eq!(CycleStats::percentile(&[], 50.0), 0.0);
    }
}
