//! Stage metrics.
//!
//! Every façade operation can report how long it took and how many rows went
//! in and came out. The CLI prints these in its timing block; library callers
//! can ignore them.

use std::time::{Duration, Instant};

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StageMetrics {
    /// Stage name as shown in reports, e.g. `"gold"`.
    pub stage: &'static str,
    pub duration: Duration,
    pub input_rows: usize,
    pub output_rows: usize,
}

impl StageMetrics {
    /// Run `f`, timing it. `count` extracts the output row count.
    pub fn measure<T>(
        stage: &'static str,
        input_rows: usize,
        f: impl FnOnce() -> T,
        count: impl FnOnce(&T) -> usize,
    ) -> (T, StageMetrics) {
        let started = Instant::now();
        let out = f();
        let duration = started.elapsed();
        let output_rows = count(&out);
        (out, StageMetrics { stage, duration, input_rows, output_rows })
    }

    /// Rows per second over the input, `None` for instantaneous runs.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.duration.as_secs_f64();
        (secs > 0.0).then(|| self.input_rows as f64 / secs)
    }
}
