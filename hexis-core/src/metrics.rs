//! Runtime metrics and instrumentation.
//!
//! Lightweight atomic counters for effect life-cycle events, a pulse budget
//! monitor for the world tick, and span names used by `tracing`.
//!
//! Counters are `AtomicU64` so a dashboard thread can snapshot them while
//! the tick owns the world. The pulse history uses a `parking_lot::Mutex`
//! because it is read rarely.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for effect engine events.
#[derive(Debug)]
pub struct EngineCounters {
    /// Effects attached (including loads and transforms).
    pub added: AtomicU64,
    /// Effects terminated by explicit removal or owner events.
    pub removed: AtomicU64,
    /// Effects terminated because their due time arrived.
    pub expired: AtomicU64,
    /// Effects cancelled before their due time.
    pub cancelled: AtomicU64,
    /// Due-time changes applied.
    pub rescheduled: AtomicU64,
    /// Hook invocations that panicked.
    pub faulted: AtomicU64,
    /// Persisted effects skipped during load.
    pub loads_skipped: AtomicU64,
    /// Subscriptions left behind by terminated effects.
    pub zombie_subscriptions: AtomicU64,
    /// Hook commands dropped by the cascade limit.
    pub commands_dropped: AtomicU64,
    /// World pulses processed.
    pub pulses: AtomicU64,
}

impl EngineCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            added: AtomicU64::new(0),
            removed: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            rescheduled: AtomicU64::new(0),
            faulted: AtomicU64::new(0),
            loads_skipped: AtomicU64::new(0),
            zombie_subscriptions: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
            pulses: AtomicU64::new(0),
        }
    }

    /// Increment a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment a counter by `n`.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            added: self.added.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rescheduled: self.rescheduled.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
            loads_skipped: self.loads_skipped.load(Ordering::Relaxed),
            zombie_subscriptions: self.zombie_subscriptions.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            pulses: self.pulses.load(Ordering::Relaxed),
        }
    }
}

impl Default for EngineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    /// Effects attached.
    pub added: u64,
    /// Effects removed.
    pub removed: u64,
    /// Effects expired.
    pub expired: u64,
    /// Effects cancelled.
    pub cancelled: u64,
    /// Due-time changes.
    pub rescheduled: u64,
    /// Panicking hook invocations.
    pub faulted: u64,
    /// Skipped persisted effects.
    pub loads_skipped: u64,
    /// Leftover subscriptions purged at termination.
    pub zombie_subscriptions: u64,
    /// Commands dropped by the cascade limit.
    pub commands_dropped: u64,
    /// Pulses processed.
    pub pulses: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows = [
            ("hexis_effects_added_total", "Effects attached", self.added),
            ("hexis_effects_removed_total", "Effects removed", self.removed),
            ("hexis_effects_expired_total", "Effects expired at their due time", self.expired),
            (
                "hexis_effects_cancelled_total",
                "Effects cancelled before their due time",
                self.cancelled,
            ),
            ("hexis_effects_rescheduled_total", "Due-time changes applied", self.rescheduled),
            ("hexis_hook_faults_total", "Hook invocations that panicked", self.faulted),
            ("hexis_loads_skipped_total", "Persisted effects skipped on load", self.loads_skipped),
            (
                "hexis_zombie_subscriptions_total",
                "Subscriptions purged after their effect terminated",
                self.zombie_subscriptions,
            ),
            (
                "hexis_commands_dropped_total",
                "Hook commands dropped by the cascade limit",
                self.commands_dropped,
            ),
            ("hexis_pulses_total", "World pulses processed", self.pulses),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Pulse Budget Monitor
// ---------------------------------------------------------------------------

const HISTORY_LEN: usize = 256;

/// Tracks time spent per world pulse against a budget.
///
/// ```rust
/// # use hexis_core::metrics::PulseBudgetMonitor;
/// let monitor = PulseBudgetMonitor::new(5.0);
/// {
///     let _guard = monitor.begin_pulse();
///     // ... pulse work ...
/// }
/// assert_eq!(monitor.pulse_count(), 1);
/// ```
pub struct PulseBudgetMonitor {
    budget_ms: f64,
    history: Mutex<PulseHistory>,
}

struct PulseHistory {
    timings: Vec<f64>,
    write_idx: usize,
    count: u64,
    last_over_budget: bool,
}

impl PulseBudgetMonitor {
    /// Create a new monitor with the given budget (milliseconds).
    #[must_use]
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            history: Mutex::new(PulseHistory {
                timings: vec![0.0; HISTORY_LEN],
                write_idx: 0,
                count: 0,
                last_over_budget: false,
            }),
        }
    }

    /// Begin timing a pulse. The guard records elapsed time when dropped.
    pub fn begin_pulse(&self) -> PulseGuard<'_> {
        PulseGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a pulse timing manually (milliseconds).
    pub fn record(&self, ms: f64) {
        let mut h = self.history.lock();
        let idx = h.write_idx;
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % HISTORY_LEN;
        h.count += 1;
        h.last_over_budget = ms > self.budget_ms;
    }

    /// Last pulse's timing (milliseconds).
    #[must_use]
    pub fn last_pulse_ms(&self) -> f64 {
        let h = self.history.lock();
        if h.count == 0 {
            return 0.0;
        }
        h.timings[(h.write_idx + HISTORY_LEN - 1) % HISTORY_LEN]
    }

    /// Whether the last pulse exceeded the budget.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.history.lock().last_over_budget
    }

    /// P50, P95, P99 and max over the recorded history.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn percentiles(&self) -> PulsePercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).unwrap_or(usize::MAX).min(HISTORY_LEN);
        if n == 0 {
            return PulsePercentiles::default();
        }
        let mut sorted = h.timings[..n].to_vec();
        drop(h);
        sorted.sort_by(f64::total_cmp);

        let at = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        let over = sorted.iter().filter(|&&t| t > self.budget_ms).count();
        PulsePercentiles {
            p50: sorted[n / 2],
            p95: at(0.95),
            p99: at(0.99),
            max: sorted[n - 1],
            over_budget_ratio: over as f64 / n as f64,
        }
    }

    /// Total pulses recorded.
    #[must_use]
    pub fn pulse_count(&self) -> u64 {
        self.history.lock().count
    }

    /// The configured budget in milliseconds.
    #[must_use]
    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }
}

/// RAII guard that records elapsed time when dropped.
pub struct PulseGuard<'a> {
    monitor: &'a PulseBudgetMonitor,
    start: Instant,
}

impl Drop for PulseGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Percentile statistics for pulse timings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PulsePercentiles {
    /// Median in milliseconds.
    pub p50: f64,
    /// 95th percentile in milliseconds.
    pub p95: f64,
    /// 99th percentile in milliseconds.
    pub p99: f64,
    /// Maximum observed timing.
    pub max: f64,
    /// Fraction of pulses over budget (0.0–1.0).
    pub over_budget_ratio: f64,
}

impl PulsePercentiles {
    /// Human-readable summary.
    #[must_use]
    pub fn summary(&self, budget_ms: f64) -> String {
        format!(
            "P50={:.2}ms  P95={:.2}ms  P99={:.2}ms  Max={:.2}ms  \
             Budget={budget_ms:.1}ms  Over-budget={:.1}%",
            self.p50,
            self.p95,
            self.p99,
            self.max,
            self.over_budget_ratio * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Tracing Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// One world pulse.
    pub const PULSE: &str = "hexis::pulse";
    /// Heartbeat delivery inside a pulse.
    pub const HEARTBEAT: &str = "hexis::heartbeat";
    /// Owner event dispatch.
    pub const EMIT: &str = "hexis::emit";
    /// Restoring owners from records.
    pub const RESTORE: &str = "hexis::restore";
    /// Autosave pass.
    pub const AUTOSAVE: &str = "hexis::autosave";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_default_zero() {
        assert_eq!(EngineCounters::new().snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn counters_increment_and_snapshot() {
        let c = EngineCounters::new();
        EngineCounters::incr(&c.added);
        EngineCounters::incr(&c.added);
        EngineCounters::add(&c.zombie_subscriptions, 3);
        let snap = c.snapshot();
        assert_eq!(snap.added, 2);
        assert_eq!(snap.zombie_subscriptions, 3);
        assert_eq!(snap.removed, 0);
    }

    #[test]
    fn prometheus_format_valid() {
        let c = EngineCounters::new();
        EngineCounters::incr(&c.pulses);
        let text = c.snapshot().to_prometheus();
        assert!(text.contains("# TYPE hexis_pulses_total counter"));
        assert!(text.contains("hexis_pulses_total 1\n"));
        assert!(text.contains("hexis_effects_added_total 0\n"));
    }

    #[test]
    fn pulse_monitor_records() {
        let m = PulseBudgetMonitor::new(2.0);
        assert!(m.last_pulse_ms().abs() < f64::EPSILON);
        m.record(1.5);
        assert!((m.last_pulse_ms() - 1.5).abs() < f64::EPSILON);
        assert!(!m.is_over_budget());
        m.record(3.0);
        assert!(m.is_over_budget());
        assert_eq!(m.pulse_count(), 2);
    }

    #[test]
    fn percentiles_over_wrapped_history() {
        let m = PulseBudgetMonitor::new(100.0);
        for i in 0..(HISTORY_LEN as u32 + 44) {
            m.record(f64::from(i % 200));
        }
        let p = m.percentiles();
        assert!(p.p50 <= p.p95 && p.p95 <= p.p99 && p.p99 <= p.max);
        assert!(p.max <= 199.0);
        assert!(p.over_budget_ratio > 0.0 && p.over_budget_ratio < 1.0);
    }

    #[test]
    fn guard_records_on_drop() {
        let m = PulseBudgetMonitor::new(1000.0);
        {
            let _guard = m.begin_pulse();
        }
        assert_eq!(m.pulse_count(), 1);
        assert!(!m.is_over_budget());
    }
}
