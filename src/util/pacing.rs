//! Deadline-based send pacing
//!
//! A load generator that issues `n` units over a fixed duration sleeps
//! `remaining_time / remaining_units` before each unit. Recomputing the delay
//! from the deadline absorbs scheduler jitter and slow iterations instead of
//! accumulating drift, so the last unit lands on the deadline.

use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Delay before the next unit, given `remaining` units left to issue
pub fn next_delay(deadline: Instant, now: Instant, remaining: u64) -> Duration {
    if remaining == 0 {
        return Duration::ZERO;
    }
    let left = deadline.saturating_duration_since(now);
    Duration::from_secs_f64(left.as_secs_f64() / remaining as f64)
}

/// Paces `total` units over `duration`
#[derive(Debug)]
pub struct DeadlinePacer {
    deadline: Instant,
    total: u64,
    issued: u64,
}

impl DeadlinePacer {
    pub fn new(duration: Duration, total: u64) -> Self {
        Self {
            deadline: Instant::now() + duration,
            total,
            issued: 0,
        }
    }

    /// Wait for the next slot and return its index, or `None` once all units
    /// have been issued
    pub async fn tick(&mut self) -> Option<u64> {
        if self.issued >= self.total {
            return None;
        }
        let delay = next_delay(self.deadline, Instant::now(), self.total - self.issued);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let index = self.issued;
        self.issued += 1;
        Some(index)
    }
}
