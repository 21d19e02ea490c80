//! `CONFIRM` strategy
//!
//! Scans the block range a `SEND` job produced and measures, for every
//! transaction written under the benchmark path, the time between the
//! transaction timestamp and the timestamp of the block that included it.
//! Transactions slower than `confirmTimeoutMs` count as timed out (lost).

use super::{parse_config, JobError};
use crate::chain::{ChainClient, ChainConnector, ChainTransaction};
use crate::distributed::protocol::JobConfig;
use crate::stats::format_loss_rate;
use crate::stats::histogram::ConfirmationHistogram;
use crate::util::time::round_to;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const REQUIRED_PROPERTIES: &[&str] = &[
    "chainEndpoint",
    "startBlockNumber",
    "finishBlockNumber",
    "transactionOperationRef",
    "sendSuccess",
    "sendStartTime",
];

fn default_confirm_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmConfig {
    pub chain_endpoint: String,
    pub start_block_number: u64,
    pub finish_block_number: u64,
    pub transaction_operation_ref: String,
    pub send_success: u64,
    pub send_start_time: u64,
    #[serde(default)]
    pub save_txs: bool,
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmStatistics {
    pub tps: f64,
    pub loss_rate: String,
    pub transaction_count: u64,
    pub timeout_transaction_count: u64,
    pub total_confirmed_time: u64,
    pub average_confirmed_time: f64,
    pub p50_confirmed_time: Option<u64>,
    pub p99_confirmed_time: Option<u64>,
    pub send_success: u64,
    pub send_start_time: u64,
    pub finish_block_finalized_at: u64,
    /// ms between the first send and the finish block
    pub send_duration: i64,
    pub block_error: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOutput {
    pub message: String,
    pub statistics: ConfirmStatistics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_list: Option<Vec<ChainTransaction>>,
}

pub struct ConfirmJob {
    config: ConfirmConfig,
    chain: Arc<dyn ChainClient>,
}

#[derive(Default)]
struct Scan {
    transaction_count: u64,
    timeout_count: u64,
    total_confirmed_time: u64,
    block_error: u64,
    finish_timestamp: Option<u64>,
    last_timestamp: Option<u64>,
    transactions: Vec<ChainTransaction>,
}

impl ConfirmJob {
    pub fn new(config: &JobConfig, connector: &dyn ChainConnector) -> Result<Self, JobError> {
        let config: ConfirmConfig = parse_config(config, REQUIRED_PROPERTIES)?;
        let chain = connector.connect(&config.chain_endpoint, None)?;
        Ok(Self { config, chain })
    }

    pub async fn process(self) -> Result<ConfirmOutput, JobError> {
        let mut histogram =
            ConfirmationHistogram::new().map_err(|e| JobError::Setup(e.to_string()))?;
        let mut scan = self.scan_blocks(&mut histogram).await;

        let finish_timestamp = match scan.finish_timestamp {
            Some(ts) => Some(ts),
            None => match self.chain.get_block(self.config.finish_block_number, false).await {
                Ok(block) => Some(block.timestamp),
                Err(e) => {
                    warn!(
                        error = %e,
                        block = self.config.finish_block_number,
                        "Failed to get finish block"
                    );
                    scan.block_error += 1;
                    None
                }
            },
        };

        // without the finish block there is no send window, so tps stays 0
        let send_duration = match finish_timestamp.or(scan.last_timestamp) {
            Some(ts) => ts as i64 - self.config.send_start_time as i64,
            None => 0,
        };
        let tps = if finish_timestamp.is_some() && send_duration > 0 {
            scan.transaction_count as f64 / (send_duration as f64 / 1000.0)
        } else {
            0.0
        };
        let confirmed = scan.transaction_count - scan.timeout_count;
        let average_confirmed_time = if confirmed > 0 {
            round_to(scan.total_confirmed_time as f64 / confirmed as f64, 2)
        } else {
            0.0
        };

        info!(
            endpoint = %self.config.chain_endpoint,
            transactions = scan.transaction_count,
            timeouts = scan.timeout_count,
            tps,
            "Confirmed block range {}..={}",
            self.config.start_block_number,
            self.config.finish_block_number
        );

        let statistics = ConfirmStatistics {
            tps,
            loss_rate: format_loss_rate(scan.timeout_count, scan.transaction_count),
            transaction_count: scan.transaction_count,
            timeout_transaction_count: scan.timeout_count,
            total_confirmed_time: scan.total_confirmed_time,
            average_confirmed_time,
            p50_confirmed_time: histogram.percentile_ms(50.0),
            p99_confirmed_time: histogram.percentile_ms(99.0),
            send_success: self.config.send_success,
            send_start_time: self.config.send_start_time,
            finish_block_finalized_at: finish_timestamp.unwrap_or(0),
            send_duration,
            block_error: scan.block_error,
        };

        let transaction_list = if self.config.save_txs {
            Some(std::mem::take(&mut scan.transactions))
        } else {
            None
        };

        Ok(ConfirmOutput {
            message: String::new(),
            statistics,
            transaction_list,
        })
    }

    async fn scan_blocks(&self, histogram: &mut ConfirmationHistogram) -> Scan {
        let mut scan = Scan::default();
        let start = self.config.start_block_number;
        let finish = self.config.finish_block_number;

        for number in start..=finish {
            let block = match self.chain.get_block(number, true).await {
                Ok(block) => block,
                Err(e) => {
                    warn!(error = %e, block = number, "Failed to get block");
                    scan.block_error += 1;
                    continue;
                }
            };
            scan.last_timestamp = Some(block.timestamp);
            if number == finish {
                scan.finish_timestamp = Some(block.timestamp);
            }

            for tx in block.transactions {
                let matches = tx
                    .operation_ref()
                    .is_some_and(|r| r.starts_with(&self.config.transaction_operation_ref));
                if !matches {
                    continue;
                }
                scan.transaction_count += 1;
                let latency = block.timestamp.saturating_sub(tx.timestamp);
                if latency > self.config.confirm_timeout_ms {
                    scan.timeout_count += 1;
                } else {
                    scan.total_confirmed_time += latency;
                    histogram.record_ms(latency);
                }
                if self.config.save_txs {
                    scan.transactions.push(tx);
                }
            }
        }
        scan
    }
}
