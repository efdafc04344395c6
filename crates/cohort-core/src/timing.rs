//! Opt-in phase timing for rollout pipelines.
//!
//! A rollout runs each phase once (`store.read`, `graph.build`, `partition`,
//! `select`, `store.update`), so phases are folded into running totals as
//! they finish instead of being kept as individual samples.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

static ENABLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static PHASES: RefCell<BTreeMap<String, Tally>> = const { RefCell::new(BTreeMap::new()) };
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    runs: usize,
    total: Duration,
    slowest: Duration,
}

/// One row of a [`TimingReport`]. Durations serialize as whole microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseTiming {
    pub name: String,
    pub count: usize,
    #[serde(rename = "total_us", serialize_with = "as_micros")]
    pub total: Duration,
    #[serde(rename = "max_us", serialize_with = "as_micros")]
    pub max: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimingReport {
    pub phases: Vec<PhaseTiming>,
}

fn as_micros<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_micros()).unwrap_or(u64::MAX))
}

/// `COHORT_TIMING` set to `1`, `true`, `yes` or `on`.
#[must_use]
pub fn timing_enabled_from_env() -> bool {
    std::env::var("COHORT_TIMING").is_ok_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

pub fn set_timing_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        clear_timings();
    }
}

#[must_use]
pub fn is_timing_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn clear_timings() {
    PHASES.with_borrow_mut(BTreeMap::clear);
}

/// Run `f` and charge its wall time to `phase`. A no-op wrapper while timing
/// is disabled.
pub fn timed<R>(phase: &str, f: impl FnOnce() -> R) -> R {
    if !is_timing_enabled() {
        return f();
    }

    let started = Instant::now();
    let result = f();
    record(phase, started.elapsed());
    result
}

fn record(phase: &str, elapsed: Duration) {
    PHASES.with_borrow_mut(|phases| {
        let tally = phases.entry(phase.to_owned()).or_default();
        tally.runs += 1;
        tally.total += elapsed;
        tally.slowest = tally.slowest.max(elapsed);
    });
}

/// Take everything recorded on this thread, ordered by phase name.
#[must_use]
pub fn collect_report() -> TimingReport {
    let phases = PHASES.with_borrow_mut(std::mem::take);
    TimingReport {
        phases: phases
            .into_iter()
            .map(|(name, tally)| PhaseTiming {
                name,
                count: tally.runs,
                total: tally.total,
                max: tally.slowest,
            })
            .collect(),
    }
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Fixed-width table for stderr.
    #[must_use]
    pub fn display_table(&self) -> String {
        let width = self
            .phases
            .iter()
            .map(|phase| phase.name.len())
            .max()
            .unwrap_or(0)
            .max("phase".len());

        let mut out = format!("{:<width$}  {:>5}  {:>10}  {:>10}\n", "phase", "runs", "total", "max");
        for phase in &self.phases {
            let _ = writeln!(
                out,
                "{:<width$}  {:>5}  {:>10}  {:>10}",
                phase.name,
                phase.count,
                human(phase.total),
                human(phase.max)
            );
        }
        out
    }
}

fn human(duration: Duration) -> String {
    let micros = duration.as_micros();
    match micros {
        0..1_000 => format!("{micros}µs"),
        1_000..1_000_000 => format!("{:.3}ms", duration.as_secs_f64() * 1e3),
        _ => format!("{:.3}s", duration.as_secs_f64()),
    }
}
