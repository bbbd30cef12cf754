//! Performance monitoring for retrieval and storage operations.
//!
//! Wraps units of work, records their wall-clock duration, warns when an
//! operation runs longer than the configured threshold, and aggregates
//! per-operation statistics on demand.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;

/// Samples retained per operation name. Oldest are dropped first.
const MAX_SAMPLES_PER_OPERATION: usize = 1000;

/// One timed execution of a named operation.
#[derive(Debug, Clone)]
pub struct PerformanceSample {
    pub duration: Duration,
    pub at: Instant,
    pub success: bool,
}

/// Aggregate statistics for one operation name, recomputed on demand.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationStats {
    pub count: usize,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub slow_count: usize,
}

/// Records operation timings and classifies slow calls.
pub struct PerformanceMonitor {
    enabled: bool,
    slow_threshold: Duration,
    clock: Arc<dyn Clock>,
    samples: Mutex<HashMap<String, VecDeque<PerformanceSample>>>,
}

impl PerformanceMonitor {
    pub fn new(enabled: bool, slow_threshold: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled,
            slow_threshold,
            clock,
            samples: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a duration counts as slow. Strictly greater than the
    /// threshold; running at exactly the threshold is acceptable.
    pub fn is_slow(&self, duration: Duration) -> bool {
        duration > self.slow_threshold
    }

    /// Execute `work`, record its duration and outcome, and return its
    /// result. Failures are recorded with the time-to-failure and the error
    /// is passed straight back to the caller.
    ///
    /// When monitoring is disabled the work still runs; nothing is timed.
    pub async fn measure<T, E, F>(&self, operation: &str, work: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        if !self.enabled {
            return work.await;
        }

        let start = self.clock.now();
        let outcome = work.await;
        let elapsed = self.clock.now().saturating_duration_since(start);
        self.record_sample(operation, elapsed, outcome.is_ok());
        outcome
    }

    /// Append one sample for `operation`, warning if it was slow.
    pub fn record_sample(&self, operation: &str, duration: Duration, success: bool) {
        if !self.enabled {
            return;
        }

        if self.is_slow(duration) {
            warn!(
                operation,
                duration_ms = duration.as_millis() as u64,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                success,
                "slow operation"
            );
        }

        let mut samples = self.lock_samples();
        let buffer = samples.entry(operation.to_string()).or_default();
        buffer.push_back(PerformanceSample {
            duration,
            at: self.clock.now(),
            success,
        });
        while buffer.len() > MAX_SAMPLES_PER_OPERATION {
            buffer.pop_front();
        }
    }

    /// Aggregate the retained samples for one operation name.
    pub fn stats_for(&self, operation: &str) -> OperationStats {
        let samples = self.lock_samples();
        let Some(buffer) = samples.get(operation) else {
            return OperationStats::default();
        };
        if buffer.is_empty() {
            return OperationStats::default();
        }

        let count = buffer.len();
        let total_ms: f64 = buffer
            .iter()
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .sum();
        let max_ms = buffer
            .iter()
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .fold(0.0_f64, f64::max);
        let slow_count = buffer.iter().filter(|s| self.is_slow(s.duration)).count();

        OperationStats {
            count,
            mean_ms: total_ms / count as f64,
            max_ms,
            slow_count,
        }
    }

    /// Names of every operation with at least one retained sample.
    pub fn operation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_samples().keys().cloned().collect();
        names.sort();
        names
    }

    /// Log an info-level summary of every tracked operation.
    pub fn log_summary(&self) {
        if !self.enabled {
            return;
        }
        for name in self.operation_names() {
            let stats = self.stats_for(&name);
            if stats.count == 0 {
                continue;
            }
            info!(
                operation = name.as_str(),
                count = stats.count,
                mean_ms = format!("{:.2}", stats.mean_ms),
                max_ms = format!("{:.2}", stats.max_ms),
                slow_count = stats.slow_count,
                "operation statistics"
            );
        }
    }

    fn lock_samples(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<PerformanceSample>>> {
        // Samples are plain data; a panic elsewhere cannot leave them in a
        // logically invalid state, so poisoning degrades to the inner value.
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
