//! `CROSS_SHARD_TEST` strategy
//!
//! Sends check-in transactions from a shard to its parent chain and measures
//! how long the parent takes to finalize the matching transfer.
//!
//! Each check-in wraps a payload transaction
//! `/transfer/{address}/{shardOwner}/{timestamp}/value` and is written under
//! `{shardingPath}/checkin/{address}/{timestamp}/request`. The parent chain
//! answers with a transfer at
//! `/apps/{app}/transfer/{from}/{to}/checkin_{timestamp}/value`, whose last
//! path component identifies the check-in.
//!
//! Shards are started in rounds: a shard with a larger `startRound` waits
//! `wait` seconds first and then spreads its check-ins more tightly, so later
//! rounds add load on top of the earlier ones.

use super::{parse_config, recent_block_with_retry, wallet, JobError, RETRY_DELAY};
use crate::chain::{ChainClient, ChainConnector, ChainError, ChainTransaction};
use crate::distributed::protocol::JobConfig;
use crate::util::pacing::DeadlinePacer;
use crate::util::time::now_ms;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const REQUIRED_PROPERTIES: &[&str] = &[
    "duration",
    "numberOfTransactions",
    "chainEndpoint",
    "address",
    "privateKey",
    "shardOwnerAddress",
    "wait",
    "shardingPath",
    "startRound",
];

/// Highest round a shard may start in
pub const MAX_ROUNDS: u32 = 20;

/// Finalization is polled at most this many times after the first check
const FINALIZATION_RETRIES: u32 = 10;

fn default_finalization_poll_ms() -> u64 {
    5_000
}

fn default_settle_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossShardTestConfig {
    pub duration: u64,
    pub number_of_transactions: u64,
    pub chain_endpoint: String,
    pub address: String,
    pub private_key: String,
    pub shard_owner_address: String,
    /// seconds to wait before sending
    pub wait: u64,
    pub sharding_path: String,
    pub start_round: u32,
    #[serde(default = "default_finalization_poll_ms")]
    pub finalization_poll_ms: u64,
    /// how long to let the parent chain relay transfers before scanning
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossShardStatistics {
    pub send_error: u64,
    pub checkin_error: u64,
    pub checkin_success: u64,
    pub block_error: u64,
}

/// A check-in matched with the parent-chain transfer it triggered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedEvent {
    pub checkin_tx: Value,
    pub transfer_tx: ChainTransaction,
    pub sent_at: u64,
    pub finalized_at: u64,
    pub duration_of_finalization: i64,
    /// 1-based shard index, set by the coordinator when grouping rounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_number: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossShardOutput {
    pub message: String,
    pub statistics: CrossShardStatistics,
    pub matched_list: Vec<MatchedEvent>,
    #[serde(default)]
    pub transaction_list: Vec<ChainTransaction>,
}

pub struct CrossShardTestJob {
    config: CrossShardTestConfig,
    chain: Arc<dyn ChainClient>,
}

impl CrossShardTestJob {
    pub fn new(config: &JobConfig, connector: &dyn ChainConnector) -> Result<Self, JobError> {
        let config: CrossShardTestConfig = parse_config(config, REQUIRED_PROPERTIES)?;
        if config.start_round == 0 || config.start_round > MAX_ROUNDS {
            return Err(JobError::InvalidConfig(format!(
                "startRound must be between 1 and {} (got {})",
                MAX_ROUNDS, config.start_round
            )));
        }
        let chain = connector.connect(
            &config.chain_endpoint,
            wallet(Some(&config.address), Some(&config.private_key)),
        )?;
        Ok(Self { config, chain })
    }

    pub async fn process(self) -> Result<CrossShardOutput, JobError> {
        self.verify_sharding_path().await?;

        sleep(round_wait_time(
            self.config.duration,
            self.config.number_of_transactions,
            self.config.start_round,
        ))
        .await;
        sleep(Duration::from_secs(self.config.wait)).await;

        let mut statistics = CrossShardStatistics::default();
        let start_block = recent_block_with_retry(&*self.chain, RETRY_DELAY).await?;
        let checkins = self.send_checkins(&mut statistics).await;

        sleep(Duration::from_millis(self.config.settle_ms)).await;
        let finish_block = recent_block_with_retry(&*self.chain, RETRY_DELAY).await?;

        let transaction_list = self
            .request_tx_list(start_block.number, finish_block.number, &mut statistics)
            .await;
        let transfers: Vec<(u64, &ChainTransaction)> = transaction_list
            .iter()
            .filter_map(|tx| tx.operation_ref().and_then(parse_checkin_id).map(|id| (id, tx)))
            .collect();

        let matched_list = self.match_checkins(&checkins, &transfers, &mut statistics).await;
        statistics.checkin_success = matched_list.len() as u64;

        info!(
            endpoint = %self.config.chain_endpoint,
            send_error = statistics.send_error,
            checkin_error = statistics.checkin_error,
            checkin_success = statistics.checkin_success,
            "Cross-shard test finished"
        );

        Ok(CrossShardOutput {
            message: String::new(),
            statistics,
            matched_list,
            transaction_list,
        })
    }

    /// The sharding path must exist on the shard before check-ins make sense
    async fn verify_sharding_path(&self) -> Result<(), JobError> {
        let value = self
            .chain
            .get_value(&self.config.sharding_path)
            .await
            .map_err(|e| JobError::Setup(format!("Failed to read sharding path ({})", e)))?;
        if value.is_null() {
            return Err(JobError::Setup(format!(
                "Sharding path {} does not exist",
                self.config.sharding_path
            )));
        }
        Ok(())
    }

    async fn send_checkins(&self, statistics: &mut CrossShardStatistics) -> Vec<Value> {
        let mut pacer = DeadlinePacer::new(
            Duration::from_secs(self.config.duration),
            self.config.number_of_transactions,
        );
        let mut handles = Vec::with_capacity(self.config.number_of_transactions as usize);

        while pacer.tick().await.is_some() {
            let chain = Arc::clone(&self.chain);
            let config = self.config.clone();
            let timestamp = now_ms();
            handles.push(tokio::spawn(async move {
                send_checkin(&*chain, &config, timestamp).await
            }));
        }

        let mut checkins = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(checkin)) => checkins.push(checkin),
                Ok(Err(e)) => {
                    debug!(error = %e, "Check-in failed");
                    statistics.send_error += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Check-in task aborted");
                    statistics.send_error += 1;
                }
            }
        }
        checkins
    }

    async fn request_tx_list(
        &self,
        from: u64,
        to: u64,
        statistics: &mut CrossShardStatistics,
    ) -> Vec<ChainTransaction> {
        let mut transactions = Vec::new();
        for number in from..=to {
            match self.chain.get_block(number, true).await {
                Ok(block) => transactions.extend(block.transactions),
                Err(e) => {
                    warn!(error = %e, block = number, "Failed to get block");
                    statistics.block_error += 1;
                }
            }
        }
        transactions
    }

    async fn match_checkins(
        &self,
        checkins: &[Value],
        transfers: &[(u64, &ChainTransaction)],
        statistics: &mut CrossShardStatistics,
    ) -> Vec<MatchedEvent> {
        let mut matched = Vec::new();
        for checkin in checkins {
            let Some(sent_at) = checkin.get("timestamp").and_then(Value::as_u64) else {
                statistics.checkin_error += 1;
                continue;
            };
            let Some((_, transfer)) = transfers.iter().find(|(id, _)| *id == sent_at) else {
                statistics.checkin_error += 1;
                continue;
            };

            let finalized_at = match self.chain.get_transaction(&transfer.hash).await {
                Ok(Some(status)) => status.finalized_at,
                Ok(None) => None,
                Err(e) => {
                    debug!(error = %e, hash = %transfer.hash, "Failed to get transfer");
                    None
                }
            };
            let Some(finalized_at) = finalized_at else {
                continue;
            };

            matched.push(MatchedEvent {
                checkin_tx: checkin.clone(),
                transfer_tx: (*transfer).clone(),
                sent_at,
                finalized_at,
                duration_of_finalization: finalized_at as i64 - sent_at as i64,
                shard_number: None,
            });
        }
        matched
    }
}

/// Extra delay before a round starts: one send interval split over the rounds
/// still to come
pub fn round_wait_time(duration_secs: u64, number_of_transactions: u64, start_round: u32) -> Duration {
    if number_of_transactions == 0 {
        return Duration::ZERO;
    }
    let interval_ms = duration_secs as f64 * 1000.0 / number_of_transactions as f64;
    let remaining_rounds = (MAX_ROUNDS + 1).saturating_sub(start_round).max(1);
    Duration::from_secs_f64(interval_ms / remaining_rounds as f64 / 1000.0)
}

/// Check-in timestamp of a parent-chain transfer path
///
/// Matches `/apps/{app}/transfer/{from}/{to}/checkin_{timestamp}/value` (exactly
/// eight `/`-separated segments).
pub fn parse_checkin_id(path: &str) -> Option<u64> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() != 8 || segments[3] != "transfer" || !segments[6].contains("checkin") {
        return None;
    }
    segments[6].get("checkin_".len()..)?.parse().ok()
}

pub fn build_payload_transaction(from: &str, to: &str, amount: u64, timestamp: u64) -> Value {
    json!({
        "operation": {
            "type": "SET_VALUE",
            "ref": format!("/transfer/{}/{}/{}/value", from, to, timestamp),
            "value": amount,
            "is_global": true,
        },
        "timestamp": timestamp,
        "nonce": -1,
        "address": from,
    })
}

pub fn build_checkin_transaction(sharding_path: &str, address: &str, payload: Value, timestamp: u64) -> Value {
    json!({
        "operation": {
            "type": "SET_VALUE",
            "ref": format!("{}/checkin/{}/{}/request", sharding_path, address, timestamp),
            "value": { "payload": payload },
            "is_global": true,
        },
        "timestamp": timestamp,
        "nonce": -1,
        "address": address,
    })
}

/// Send one check-in and wait for it to finalize; returns the check-in transaction
async fn send_checkin(
    chain: &dyn ChainClient,
    config: &CrossShardTestConfig,
    timestamp: u64,
) -> Result<Value, JobError> {
    let payload = build_payload_transaction(&config.address, &config.shard_owner_address, 1, timestamp);
    let signed_payload = chain.sign_transaction(&payload).await?;
    let checkin = build_checkin_transaction(
        &config.sharding_path,
        &config.address,
        signed_payload.signed_tx,
        timestamp,
    );
    let signed_checkin = chain.sign_transaction(&checkin).await?;

    let result = chain.send_signed_transaction(&signed_checkin).await?;
    if !result.is_accepted() {
        return Err(ChainError::Rpc {
            method: "ain_sendSignedTransaction".to_string(),
            message: format!("check-in {} was rejected", signed_checkin.tx_hash),
        }
        .into());
    }

    let poll = Duration::from_millis(config.finalization_poll_ms);
    if !wait_finalization(chain, &signed_checkin.tx_hash, poll).await {
        return Err(ChainError::NotFinalized {
            tx_hash: signed_checkin.tx_hash,
        }
        .into());
    }
    Ok(checkin)
}

async fn wait_finalization(chain: &dyn ChainClient, tx_hash: &str, poll: Duration) -> bool {
    for _ in 0..=FINALIZATION_RETRIES {
        sleep(poll).await;
        match chain.get_transaction(tx_hash).await {
            Ok(Some(status)) if status.is_finalized => return true,
            Ok(_) => {}
            Err(e) => debug!(error = %e, tx_hash, "Failed to get transaction"),
        }
    }
    false
}
