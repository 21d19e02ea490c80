//! Confirmation latency histogram using HdrHistogram
//!
//! Tracks the time between a transaction's own timestamp and the timestamp of
//! the block that included it, in milliseconds.
//!
//! # Range
//!
//! - **Minimum**: 1 ms (a zero latency is recorded as 1 ms)
//! - **Maximum**: 24 hours, larger values are clamped
//! - **Precision**: 3 significant digits
//!
//! # Example
//!
//! ```
//! use shardbench::stats::histogram::ConfirmationHistogram;
//!
//! let mut hist = ConfirmationHistogram::new().unwrap();
//! hist.record_ms(120);
//! hist.record_ms(480);
//!
//! assert_eq!(hist.len(), 2);
//! assert!(hist.percentile_ms(50.0).is_some());
//! ```

use hdrhistogram::{CreationError, Histogram};

const MAX_LATENCY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug)]
pub struct ConfirmationHistogram {
    histogram: Histogram<u64>,
}

impl ConfirmationHistogram {
    pub fn new() -> Result<Self, CreationError> {
        let histogram = Histogram::new_with_bounds(1, MAX_LATENCY_MS, 3)?;
        Ok(Self { histogram })
    }

    /// Record one confirmation latency, clamped into the histogram range
    #[inline]
    pub fn record_ms(&mut self, latency_ms: u64) {
        let value = latency_ms.clamp(1, MAX_LATENCY_MS);
        self.histogram.saturating_record(value);
    }

    /// Latency at `percentile` (0.0 - 100.0), or `None` when nothing was recorded
    pub fn percentile_ms(&self, percentile: f64) -> Option<u64> {
        if self.histogram.is_empty() {
            return None;
        }
        Some(self.histogram.value_at_percentile(percentile))
    }

    pub fn max_ms(&self) -> Option<u64> {
        if self.histogram.is_empty() {
            return None;
        }
        Some(self.histogram.max())
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }
}
