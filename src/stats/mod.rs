//! Statistics aggregation
//!
//! Workers report per-shard statistics; this module combines them into the
//! run-level figures the coordinator prints and writes out.
//!
//! - **TPS**: sum of per-shard TPS, pooled timeout/transaction counts, loss
//!   rate and the number of distinct chain endpoints
//! - **QPS**: sum of per-shard QPS and call counts
//! - **Cross-shard**: weighted finalization latency over reconstructed rounds
//!   (see [`rounds`])
//!
//! Shards whose job did not succeed contribute nothing to the totals but are
//! still counted as shards.
//!
//! # Example
//!
//! ```
//! use shardbench::stats::{format_loss_rate, TpsAggregator};
//!
//! let mut aggregator = TpsAggregator::new();
//! aggregator.add_shard("http://chain-a", None);
//! aggregator.add_shard("http://chain-b", None);
//!
//! let summary = aggregator.summary();
//! assert_eq!(summary.number_of_shards, 2);
//! assert_eq!(summary.total_tps, 0.0);
//! assert_eq!(format_loss_rate(0, 0), "0%");
//! ```

pub mod histogram;
pub mod rounds;

use crate::job::call::CallStatistics;
use crate::job::confirm::ConfirmStatistics;
use crate::util::time::round_to;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Timeout share in percent, 5 decimals; 0 when nothing was counted
pub fn loss_rate_percent(timeout_count: u64, total_count: u64) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    round_to(timeout_count as f64 / total_count as f64 * 100.0, 5)
}

/// [`loss_rate_percent`] as a `"N%"` string
pub fn format_loss_rate(timeout_count: u64, total_count: u64) -> String {
    format!("{}%", loss_rate_percent(timeout_count, total_count))
}

/// Time window handed to the external monitoring collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringWindow {
    pub start_time: u64,
    pub end_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpsSummary {
    pub total_tps: f64,
    pub total_timeout_tx_count: u64,
    pub total_tx_count: u64,
    /// percent
    pub loss_rate: f64,
    pub number_of_shards: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QpsSummary {
    pub total_qps: f64,
    pub total_success: u64,
    pub total_error: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossShardSummary {
    pub number_of_rounds: usize,
    pub total_checkin_tx_count: u64,
    pub total_average_of_finalization_time: f64,
}

/// Run-level result of one benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunSummary {
    Tps(TpsSummary),
    Qps(QpsSummary),
    CrossShard(CrossShardSummary),
}

/// Combines CONFIRM statistics of every shard
#[derive(Debug, Default)]
pub struct TpsAggregator {
    endpoints: HashSet<String>,
    total_tps: f64,
    total_tx_count: u64,
    total_timeout_tx_count: u64,
}

impl TpsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one shard; `stats` is `None` when its CONFIRM job did not succeed
    pub fn add_shard(&mut self, chain_endpoint: &str, stats: Option<&ConfirmStatistics>) {
        self.endpoints.insert(chain_endpoint.to_string());
        if let Some(stats) = stats {
            self.total_tps += stats.tps;
            self.total_tx_count += stats.transaction_count;
            self.total_timeout_tx_count += stats.timeout_transaction_count;
        }
    }

    pub fn summary(&self) -> TpsSummary {
        TpsSummary {
            total_tps: round_to(self.total_tps, 5),
            total_timeout_tx_count: self.total_timeout_tx_count,
            total_tx_count: self.total_tx_count,
            loss_rate: loss_rate_percent(self.total_timeout_tx_count, self.total_tx_count),
            number_of_shards: self.endpoints.len(),
            monitoring: None,
        }
    }
}

/// Combines CALL statistics of every shard
#[derive(Debug, Default)]
pub struct QpsAggregator {
    total_qps: f64,
    total_success: u64,
    total_error: u64,
}

impl QpsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shard(&mut self, stats: Option<&CallStatistics>) {
        if let Some(stats) = stats {
            self.total_qps += stats.qps;
            self.total_success += stats.success;
            self.total_error += stats.error;
        }
    }

    pub fn summary(&self) -> QpsSummary {
        QpsSummary {
            total_qps: round_to(self.total_qps, 5),
            total_success: self.total_success,
            total_error: self.total_error,
        }
    }
}
