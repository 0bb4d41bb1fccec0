// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram, register_int_counter_vec, Gauge,
    Histogram, IntCounterVec,
};

// --- Metric Statics ---
// Collectors are initialized exactly once by `install`.

static DATA_REQUESTS_TALLIED: OnceCell<Gauge> = OnceCell::new();
static DR_FLOW_HALT: OnceCell<Gauge> = OnceCell::new();
static FILTER_OUTCOMES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static END_BLOCK_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// A metrics sink backed by the global Prometheus registry.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Runs `$body` with the collector bound to `$m` if `install()` has been called.
/// Before installation every recording is silently dropped.
macro_rules! with_metric {
    ($metric:ident, $m:ident => $body:expr) => {
        if let Some($m) = $metric.get() {
            $body;
        }
    };
}

impl TallyMetricsSink for PrometheusSink {
    fn set_data_requests_tallied(&self, count: u64) {
        with_metric!(DATA_REQUESTS_TALLIED, m => m.set(count as f64));
    }
    fn set_dr_flow_halt(&self, halted: bool) {
        with_metric!(DR_FLOW_HALT, m => m.set(if halted { 1.0 } else { 0.0 }));
    }
    fn inc_filter_outcome(&self, outcome: &'static str) {
        with_metric!(FILTER_OUTCOMES_TOTAL, m => m.with_label_values(&[outcome]).inc());
    }
    fn observe_end_block_duration(&self, duration_secs: f64) {
        with_metric!(END_BLOCK_DURATION_SECONDS, m => m.observe(duration_secs));
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        with_metric!(ERRORS_TOTAL, m => m.with_label_values(&[kind, variant]).inc());
    }
}

fn already_initialized<T>(_: T) -> prometheus::Error {
    prometheus::Error::Msg("static already initialized".into())
}

/// Initializes all Prometheus metrics collectors and returns a static reference to the sink.
/// This function must be called only once at application startup.
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    DATA_REQUESTS_TALLIED
        .set(register_gauge!(
            "tally_data_requests_tallied",
            "Number of data requests tallied in the last end-block pass."
        )?)
        .map_err(already_initialized)?;
    DR_FLOW_HALT
        .set(register_gauge!(
            "tally_dr_flow_halt",
            "1 if the data request flow is halted because the ledger could not be reached."
        )?)
        .map_err(already_initialized)?;
    FILTER_OUTCOMES_TOTAL
        .set(register_int_counter_vec!(
            "tally_filter_outcomes_total",
            "Total filter runs, labeled by outcome.",
            &["outcome"]
        )?)
        .map_err(already_initialized)?;
    END_BLOCK_DURATION_SECONDS
        .set(register_histogram!(
            "tally_end_block_duration_seconds",
            "Latency of a single end-block tally pass.",
            exponential_buckets(0.001, 2.0, 15)?
        )?)
        .map_err(already_initialized)?;
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "tally_errors_total",
            "Total number of errors, categorized by type and variant.",
            &["kind", "variant"]
        )?)
        .map_err(already_initialized)?;

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_registers_tally_collectors() {
        let sink = install().unwrap();
        sink.set_data_requests_tallied(7);
        sink.set_dr_flow_halt(true);
        sink.inc_filter_outcome("no_consensus");
        sink.inc_error("tally", "TALLY_CORRUPT_REVEALS");

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        for expected in [
            "tally_data_requests_tallied",
            "tally_dr_flow_halt",
            "tally_filter_outcomes_total",
            "tally_errors_total",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(DATA_REQUESTS_TALLIED.get().unwrap().get(), 7.0);

        // A second installation cannot re-register the same collectors.
        assert!(install().is_err());
    }
}
