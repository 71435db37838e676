//! Latency sampling for backend round-trips and CLI commands.
//!
//! Samples are kept per thread and only when collection is switched on
//! (`TOTE_TIMING=1` or the CLI `--timing` flag), so the hot path pays a single
//! atomic load otherwise.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;

/// Latency statistics grouped by operation name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    pub operations: Vec<OpTiming>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpTiming {
    pub name: String,
    pub p50: Duration,
    pub p95: Duration,
    pub max: Duration,
    pub count: usize,
}

thread_local! {
    static SAMPLES: RefCell<Vec<(String, Duration)>> = const { RefCell::new(Vec::new()) };
}

static ENABLED: AtomicBool = AtomicBool::new(false);

/// `TOTE_TIMING` truthiness: `1`, `true`, `yes`, `on` (any case).
#[must_use]
pub fn enabled_from_env() -> bool {
    std::env::var("TOTE_TIMING")
        .ok()
        .is_some_and(|value| is_truthy(&value))
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        clear();
    }
}

#[must_use]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn clear() {
    SAMPLES.with(|samples| samples.borrow_mut().clear());
}

/// Run `f`, recording its duration under `name` when collection is on.
pub fn timed<R>(name: &str, f: impl FnOnce() -> R) -> R {
    if !is_enabled() {
        return f();
    }

    let started = Instant::now();
    let result = f();
    record(name, started.elapsed());
    result
}

/// Drain this thread's samples into a report.
#[must_use]
pub fn collect_report() -> TimingReport {
    let samples = SAMPLES.with(|samples| std::mem::take(&mut *samples.borrow_mut()));

    let mut grouped: BTreeMap<String, Vec<Duration>> = BTreeMap::new();
    for (name, elapsed) in samples {
        grouped.entry(name).or_default().push(elapsed);
    }

    let operations = grouped
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            OpTiming {
                p50: percentile(&values, 50),
                p95: percentile(&values, 95),
                max: values.last().copied().unwrap_or_default(),
                count: values.len(),
                name,
            }
        })
        .collect();

    TimingReport { operations }
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let operations: Vec<_> = self
            .operations
            .iter()
            .map(|op| {
                json!({
                    "name": op.name,
                    "count": op.count,
                    "p50_us": op.p50.as_micros(),
                    "p95_us": op.p95.as_micros(),
                    "max_us": op.max.as_micros(),
                })
            })
            .collect();

        json!({ "operations": operations })
    }

    #[must_use]
    pub fn display_table(&self) -> String {
        if self.operations.is_empty() {
            return "No operations sampled.".to_string();
        }

        let mut out = String::new();
        out.push_str("operation                    count      p50      p95      max\n");
        out.push_str("--------------------------------------------------------------\n");
        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<28} {:>6} {:>8} {:>8} {:>8}",
                op.name,
                op.count,
                format_duration(op.p50),
                format_duration(op.p95),
                format_duration(op.max)
            );
        }
        out
    }
}

fn record(name: &str, elapsed: Duration) {
    SAMPLES.with(|samples| samples.borrow_mut().push((name.to_string(), elapsed)));
}

fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = pct.min(100).saturating_mul(sorted.len()).saturating_add(99) / 100;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros >= 1_000_000 {
        format!("{}.{:03}s", micros / 1_000_000, (micros % 1_000_000) / 1_000)
    } else if micros >= 1_000 {
        format!("{}.{:03}ms", micros / 1_000, micros % 1_000)
    } else {
        format!("{micros}µs")
    }
}

fn is_truthy(value: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|candidate| value.trim().eq_ignore_ascii_case(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    static GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn disabled_collection_records_nothing() {
        let _guard = GUARD.lock().expect("guard");
        set_enabled(false);

        assert_eq!(timed("backend.add_line", || 3_u8), 3);
        assert!(collect_report().is_empty());
    }

    #[test]
    fn enabled_collection_groups_by_operation() {
        let _guard = GUARD.lock().expect("guard");
        set_enabled(true);
        clear();

        record("backend.add_line", Duration::from_micros(3_000));
        record("backend.add_line", Duration::from_micros(1_000));
        record("backend.add_line", Duration::from_micros(2_000));
        record("backend.remove_line", Duration::from_micros(9_000));

        let report = collect_report();
        set_enabled(false);

        assert_eq!(report.operations.len(), 2);
        let add = &report.operations[0];
        assert_eq!(add.name, "backend.add_line");
        assert_eq!(add.count, 3);
        assert_eq!(add.p50, Duration::from_micros(2_000));
        assert_eq!(add.max, Duration::from_micros(3_000));
        assert_eq!(report.operations[1].p95, Duration::from_micros(9_000));
    }

    #[test]
    fn renders_table_and_json() {
        let _guard = GUARD.lock().expect("guard");
        clear();
        record("backend.update_line", Duration::from_micros(1_500));

        let report = collect_report();
        assert!(report.display_table().contains("backend.update_line"));
        assert!(report.display_table().contains("1.500ms"));

        let json = report.to_json();
        let ops = json["operations"].as_array().expect("operations array");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0]["count"], 1);
    }

    #[test]
    fn truthy_values() {
        assert!(is_truthy("ON"));
        assert!(is_truthy(" yes "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("off"));
    }
}
