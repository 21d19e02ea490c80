//! Time helpers
//!
//! Wall-clock timestamps are Unix milliseconds (`u64`) everywhere in the
//! harness: transaction timestamps, block timestamps and monitoring windows
//! all share that unit.

use chrono::{Local, TimeZone};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Elapsed run time as `mm:ss`
///
/// Minutes are not wrapped into hours, so a 75 minute run prints `75:00`.
pub fn format_running_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Local wall-clock time of a Unix-ms timestamp as `HH:MM:SS`
pub fn format_clock(timestamp_ms: u64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms as i64).single() {
        Some(t) => t.format("%H:%M:%S").to_string(),
        None => timestamp_ms.to_string(),
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
