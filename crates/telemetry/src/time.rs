// Path: crates/telemetry/src/time.rs
//! Timing of end-block tally passes.

use crate::sinks::TallyMetricsSink;
use std::time::{Duration, Instant};

/// Measures a single end-block pass.
///
/// The duration is reported when the timer is dropped, so a pass that aborts or
/// unwinds is observed as well.
pub struct PassTimer<'a> {
    sink: &'a dyn TallyMetricsSink,
    start: Instant,
}

impl<'a> PassTimer<'a> {
    /// Starts timing a pass that reports into `sink`.
    pub fn start(sink: &'a dyn TallyMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }

    /// Time elapsed since the pass started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PassTimer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_end_block_duration(self.elapsed().as_secs_f64());
    }
}
