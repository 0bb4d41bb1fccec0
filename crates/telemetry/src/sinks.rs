// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured error metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured tally metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn tally_metrics() -> &'static dyn TallyMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics describing end-block tally passes.
pub trait TallyMetricsSink: Send + Sync + std::fmt::Debug {
    /// Sets the gauge for the number of requests tallied in the last pass.
    fn set_data_requests_tallied(&self, count: u64);
    /// Raises or clears the flag signalling that the request flow is halted
    /// because the ledger could not be reached.
    fn set_dr_flow_halt(&self, halted: bool);
    /// Increments a counter for filter outcomes, labeled by outcome.
    fn inc_filter_outcome(&self, outcome: &'static str);
    /// Observes the duration of a single end-block tally pass.
    fn observe_end_block_duration(&self, duration_secs: f64);
}
impl TallyMetricsSink for NopSink {
    fn set_data_requests_tallied(&self, _count: u64) {}
    fn set_dr_flow_halt(&self, _halted: bool) {}
    fn inc_filter_outcome(&self, _outcome: &'static str) {}
    fn observe_end_block_duration(&self, _duration_secs: f64) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and variant.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink: TallyMetricsSink + ErrorMetricsSink {}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T where T: TallyMetricsSink + ErrorMetricsSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_fall_back_to_nop_sink() {
        // Nothing in this crate's unit tests installs a global sink.
        tally_metrics().set_data_requests_tallied(3);
        tally_metrics().inc_filter_outcome("success");
        error_metrics().inc_error("tally", "TALLY_NO_CONSENSUS");
    }
}
