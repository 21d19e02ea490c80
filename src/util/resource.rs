//! Process memory usage
//!
//! Reads `/proc/self/status` on Linux to report the worker's memory footprint
//! in `GET /status`. On other platforms the snapshot is unavailable and the
//! status endpoint reports zeros.

use std::fs;

const MIB: f64 = 1024.0 * 1024.0;

/// Memory snapshot of the current process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySnapshot {
    /// Resident Set Size (RSS) in bytes
    pub rss_bytes: u64,
    /// Virtual Memory Size (VmSize) in bytes
    pub vm_bytes: u64,
}

impl MemorySnapshot {
    /// Take a snapshot, or `None` when /proc is not readable
    pub fn take() -> Option<Self> {
        let status = fs::read_to_string("/proc/self/status").ok()?;
        Self::parse(&status)
    }

    /// Parse the `VmRSS:` and `VmSize:` lines of a /proc status file
    pub fn parse(status: &str) -> Option<Self> {
        let mut rss_kb = None;
        let mut vm_kb = None;

        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                rss_kb = parse_kb(rest);
            } else if let Some(rest) = line.strip_prefix("VmSize:") {
                vm_kb = parse_kb(rest);
            }

            if rss_kb.is_some() && vm_kb.is_some() {
                break;
            }
        }

        Some(Self {
            rss_bytes: rss_kb? * 1024,
            vm_bytes: vm_kb? * 1024,
        })
    }

    pub fn rss_mib(&self) -> f64 {
        self.rss_bytes as f64 / MIB
    }

    pub fn vm_mib(&self) -> f64 {
        self.vm_bytes as f64 / MIB
    }
}

// "    12345 kB"
fn parse_kb(rest: &str) -> Option<u64> {
    rest.split_whitespace().next()?.parse().ok()
}
