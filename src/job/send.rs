//! `SEND` strategy
//!
//! Issues `numberOfTransactions` copies of `transactionOperation` over
//! `duration` seconds. Transaction `i` carries timestamp `timestamp + i` so the
//! matching `CONFIRM` job can measure confirmation latency from the block data
//! alone.
//!
//! Sends are fanned out as background tasks. A counting semaphore bounds the
//! number of in-flight sends; a slot that finds no free permit is skipped and
//! counted as `pass`.

use super::{parse_config, recent_block_with_retry, wallet, JobError, RETRY_DELAY};
use crate::chain::{BlockHeader, ChainClient, ChainConnector};
use crate::distributed::protocol::JobConfig;
use crate::util::pacing::DeadlinePacer;
use crate::util::time::now_ms;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

pub const REQUIRED_PROPERTIES: &[&str] = &[
    "duration",
    "numberOfTransactions",
    "chainEndpoint",
    "transactionOperation",
    "timestamp",
];

fn default_max_in_flight() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendConfig {
    pub duration: u64,
    pub number_of_transactions: u64,
    pub chain_endpoint: String,
    pub transaction_operation: Value,
    pub timestamp: u64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendStatistics {
    pub success: u64,
    pub pass: u64,
    pub error: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutput {
    pub message: String,
    pub statistics: SendStatistics,
    pub send_start_time: u64,
    pub send_finish_time: u64,
    pub start_block_number: u64,
    pub finish_block_number: u64,
    /// Average ms per block produced while sending, 0 when no block was produced
    pub block_duration: f64,
}

pub struct SendJob {
    config: SendConfig,
    operation_ref: String,
    chain: Arc<dyn ChainClient>,
    retry_delay: Duration,
}

impl SendJob {
    pub fn new(config: &JobConfig, connector: &dyn ChainConnector) -> Result<Self, JobError> {
        let config: SendConfig = parse_config(config, REQUIRED_PROPERTIES)?;
        let operation_ref = config
            .transaction_operation
            .get("ref")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| JobError::InvalidConfig("transactionOperation.ref is required".to_string()))?;
        if config.max_in_flight == 0 {
            return Err(JobError::InvalidConfig("maxInFlight must be > 0".to_string()));
        }

        let chain = connector.connect(
            &config.chain_endpoint,
            wallet(config.address.as_ref(), config.private_key.as_ref()),
        )?;

        Ok(Self {
            config,
            operation_ref,
            chain,
            retry_delay: RETRY_DELAY,
        })
    }

    pub async fn process(self) -> Result<SendOutput, JobError> {
        // health check
        recent_block_with_retry(&*self.chain, self.retry_delay).await?;
        self.init_permission().await?;

        let start_block = recent_block_with_retry(&*self.chain, self.retry_delay).await?;
        let send_start_time = now_ms();
        let statistics = self.send_transactions().await;
        let send_finish_time = now_ms();
        let finish_block = recent_block_with_retry(&*self.chain, self.retry_delay).await?;

        info!(
            endpoint = %self.config.chain_endpoint,
            success = statistics.success,
            pass = statistics.pass,
            error = statistics.error,
            "Finished sending transactions"
        );

        if statistics.success == 0 && self.config.number_of_transactions > 0 {
            return Err(JobError::ZeroSuccess {
                attempted: self.config.number_of_transactions,
            });
        }

        Ok(SendOutput {
            message: String::new(),
            statistics,
            send_start_time,
            send_finish_time,
            // blocks committed after `start_block` hold this job's transactions
            start_block_number: start_block.number + 1,
            finish_block_number: finish_block.number,
            block_duration: block_duration(&start_block, &finish_block),
        })
    }

    /// Take ownership of the operation path and restrict writes to our address
    async fn init_permission(&self) -> Result<(), JobError> {
        let Some(address) = self.config.address.as_deref() else {
            debug!("No address configured, skipping permission setup");
            return Ok(());
        };

        let batch = [
            set_owner_transaction(&self.operation_ref, address),
            set_rule_transaction(&self.operation_ref, address),
        ];
        let results = self
            .chain
            .send_transaction_batch(&batch)
            .await
            .map_err(|e| JobError::Setup(format!("Failed to initialize permission ({})", e)))?;
        if results.len() != batch.len() || results.iter().any(|r| !r.is_accepted()) {
            return Err(JobError::Setup(format!(
                "Permission transactions were rejected on {}",
                self.operation_ref
            )));
        }

        let writable = self
            .chain
            .eval_rule(&self.operation_ref, address)
            .await
            .map_err(|e| JobError::Setup(format!("Failed to verify permission ({})", e)))?;
        if !writable {
            return Err(JobError::Setup(format!(
                "No write permission on {} for {}",
                self.operation_ref, address
            )));
        }
        Ok(())
    }

    async fn send_transactions(&self) -> SendStatistics {
        let limiter = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut pacer = DeadlinePacer::new(
            Duration::from_secs(self.config.duration),
            self.config.number_of_transactions,
        );
        let mut statistics = SendStatistics::default();
        let mut handles = Vec::with_capacity(self.config.number_of_transactions as usize);

        while let Some(i) = pacer.tick().await {
            let Ok(permit) = Arc::clone(&limiter).try_acquire_owned() else {
                statistics.pass += 1;
                continue;
            };
            let tx = self.build_transaction(i);
            let chain = Arc::clone(&self.chain);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match chain.send_transaction(&tx).await {
                    Ok(result) if result.is_accepted() => true,
                    Ok(result) => {
                        debug!(?result, "Transaction rejected");
                        false
                    }
                    Err(e) => {
                        debug!(error = %e, "Failed to send transaction");
                        false
                    }
                }
            }));
        }

        for joined in join_all(handles).await {
            match joined {
                Ok(true) => statistics.success += 1,
                _ => statistics.error += 1,
            }
        }
        statistics
    }

    fn build_transaction(&self, index: u64) -> Value {
        let mut tx = json!({
            "operation": self.config.transaction_operation,
            "timestamp": self.config.timestamp + index,
            "nonce": -1,
        });
        if let Some(address) = &self.config.address {
            tx["address"] = Value::String(address.clone());
        }
        tx
    }
}

/// `(finish.timestamp - start.timestamp) / (finish.number - start.number)`
pub fn block_duration(start: &BlockHeader, finish: &BlockHeader) -> f64 {
    if finish.number <= start.number {
        return 0.0;
    }
    finish.timestamp.saturating_sub(start.timestamp) as f64 / (finish.number - start.number) as f64
}

fn set_owner_transaction(path: &str, address: &str) -> Value {
    json!({
        "operation": {
            "type": "SET_OWNER",
            "ref": path,
            "value": {
                ".owner": {
                    "owners": {
                        address: {
                            "write_owner": true,
                            "write_rule": true,
                            "write_function": true,
                            "branch_owner": true,
                        }
                    }
                }
            },
        },
        "nonce": -1,
        "address": address,
    })
}

fn set_rule_transaction(path: &str, address: &str) -> Value {
    json!({
        "operation": {
            "type": "SET_RULE",
            "ref": path,
            "value": { ".write": format!("auth === '{}'", address) },
        },
        "nonce": -1,
        "address": address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, MockConnector};
    use crate::distributed::protocol::JobConfig;

    const ENDPOINT: &str = "http://shard-1";

    fn connector(chain: &MockChain) -> MockConnector {
        let connector = MockConnector::new();
        connector.register(ENDPOINT, chain.clone());
        connector
    }

    fn config(number: u64, address: Option<&str>) -> JobConfig {
        let mut config = json!({
            "duration": 1,
            "numberOfTransactions": number,
            "chainEndpoint": ENDPOINT,
            "transactionOperation": {"type": "SET_VALUE", "ref": "/apps/bench/tps", "value": 1},
            "timestamp": 1_000_000,
        });
        if let Some(address) = address {
            config["address"] = json!(address);
            config["privateKey"] = json!("secret");
        }
        match config {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_block_duration() {
        let start = BlockHeader { number: 10, timestamp: 1000 };
        let finish = BlockHeader { number: 14, timestamp: 3000 };
        assert_eq!(block_duration(&start, &finish), 500.0);
        assert_eq!(block_duration(&start, &start), 0.0);
    }

    #[test]
    fn test_missing_operation_ref() {
        let chain = MockChain::new();
        let mut cfg = config(5, None);
        cfg.insert("transactionOperation".to_string(), json!({"type": "SET_VALUE"}));
        match SendJob::new(&cfg, &connector(&chain)) {
            Err(JobError::InvalidConfig(message)) => assert!(message.contains("ref")),
            _ => panic!("Expected InvalidConfig"),
        }
    }

    #[tokio::test]
    async fn test_send_all_transactions() {
        let chain = MockChain::new();
        let job = SendJob::new(&config(5, Some("0xabc")), &connector(&chain)).unwrap();
        let output = job.process().await.unwrap();

        assert_eq!(output.statistics, SendStatistics { success: 5, pass: 0, error: 0 });
        assert!(output.send_finish_time >= output.send_start_time);

        // genesis + permission batch (2 blocks) + 5 sends
        assert_eq!(output.start_block_number, 3);
        assert_eq!(output.finish_block_number, 7);
        assert_eq!(chain.tip(), 7);

        let timestamps: Vec<u64> = chain
            .transactions()
            .iter()
            .filter(|tx| tx.operation["type"] == "SET_VALUE")
            .map(|tx| tx.timestamp)
            .collect();
        let mut sorted = timestamps.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1_000_000..1_000_005).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_fatal() {
        let chain = MockChain::new();
        chain.fail_first_sends(3);
        let job = SendJob::new(&config(10, None), &connector(&chain)).unwrap();
        let output = job.process().await.unwrap();
        assert_eq!(output.statistics.success, 7);
        assert_eq!(output.statistics.error, 3);
        assert_eq!(output.finish_block_number - output.start_block_number + 1, 7);
    }

    #[tokio::test]
    async fn test_zero_success() {
        let chain = MockChain::new();
        chain.fail_first_sends(4);
        let job = SendJob::new(&config(4, None), &connector(&chain)).unwrap();
        match job.process().await {
            Err(JobError::ZeroSuccess { attempted }) => assert_eq!(attempted, 4),
            _ => panic!("Expected ZeroSuccess"),
        }
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let chain = MockChain::new();
        chain.deny_rules();
        let job = SendJob::new(&config(2, Some("0xabc")), &connector(&chain)).unwrap();
        match job.process().await {
            Err(JobError::Setup(message)) => assert!(message.contains("No write permission")),
            _ => panic!("Expected Setup error"),
        }
        assert_eq!(chain.send_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_control_counts_pass() {
        // slots at 250/500/750/1000ms; the first send holds the only permit until 850ms
        let chain = MockChain::new();
        chain.delay_sends(Duration::from_millis(600));
        let mut cfg = config(4, None);
        cfg.insert("maxInFlight".to_string(), json!(1));
        let job = SendJob::new(&cfg, &connector(&chain)).unwrap();
        let stats = job.send_transactions().await;

        assert_eq!(stats, SendStatistics { success: 2, pass: 2, error: 0 });
        // skipped slots never reach the chain
        assert_eq!(chain.send_attempts(), 2);
    }
}
