//! Job strategies
//!
//! A job is one unit of load or measurement work executed by a worker. The
//! worker turns a [`JobInput`] into a [`JobStrategy`] when the job is
//! submitted (validating its config up front) and runs
//! [`JobStrategy::process`] in the background.
//!
//! # Strategies
//!
//! | Type               | Work                                                     |
//! |--------------------|----------------------------------------------------------|
//! | `SEND`             | paced write transactions against one chain endpoint      |
//! | `CONFIRM`          | scans the blocks a `SEND` produced, computes TPS/latency |
//! | `CROSS_SHARD_TEST` | paced check-ins, matched with parent-chain transfers     |
//! | `CALL`             | paced HTTP calls, computes QPS                           |

pub mod call;
pub mod confirm;
pub mod cross_shard;
pub mod send;

use crate::chain::{BlockHeader, ChainClient, ChainConnector, ChainError, Wallet};
use crate::distributed::protocol::{JobConfig, JobInput, JobType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub use call::CallJob;
pub use confirm::ConfirmJob;
pub use cross_shard::CrossShardTestJob;
pub use send::SendJob;

/// Head lookups are retried this many times before a job gives up
pub const RETRY_THRESHOLD: u32 = 3;

pub(crate) const RETRY_DELAY: Duration = Duration::from_secs(6);

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Missing required config property '{property}'")]
    MissingProperty { property: String },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Success rate 0% ({attempted} transactions attempted)")]
    ZeroSuccess { attempted: u64 },

    #[error("{0}")]
    Setup(String),

    #[error(transparent)]
    Upstream(#[from] ChainError),

    #[error("Failed to encode job output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Fail with [`JobError::MissingProperty`] for the first absent or null key
pub fn validate_required(config: &JobConfig, properties: &[&str]) -> Result<(), JobError> {
    for property in properties {
        match config.get(*property) {
            None | Some(Value::Null) => {
                return Err(JobError::MissingProperty {
                    property: property.to_string(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Check required keys, then deserialize the config into a typed struct
pub(crate) fn parse_config<T: DeserializeOwned>(
    config: &JobConfig,
    required: &[&str],
) -> Result<T, JobError> {
    validate_required(config, required)?;
    serde_json::from_value(Value::Object(config.clone()))
        .map_err(|e| JobError::InvalidConfig(e.to_string()))
}

pub(crate) fn wallet(address: Option<&String>, private_key: Option<&String>) -> Option<Wallet> {
    Some(Wallet {
        address: address?.clone(),
        private_key: private_key?.clone(),
    })
}

/// `get_recent_block` with up to [`RETRY_THRESHOLD`] retries
pub(crate) async fn recent_block_with_retry(
    chain: &dyn ChainClient,
    retry_delay: Duration,
) -> Result<BlockHeader, JobError> {
    let mut retries = 0;
    loop {
        match chain.get_recent_block().await {
            Ok(header) => return Ok(header),
            Err(e) if retries < RETRY_THRESHOLD => {
                warn!(error = %e, retry = retries, "Failed to get recent block");
                retries += 1;
                tokio::time::sleep(retry_delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// A validated job ready to run
pub enum JobStrategy {
    Send(SendJob),
    Confirm(ConfirmJob),
    CrossShardTest(CrossShardTestJob),
    Call(CallJob),
}

impl JobStrategy {
    /// Validate the input and build the matching strategy
    pub fn from_input(input: &JobInput, connector: &dyn ChainConnector) -> Result<Self, JobError> {
        let strategy = match input.job_type {
            JobType::Send => JobStrategy::Send(SendJob::new(&input.config, connector)?),
            JobType::Confirm => JobStrategy::Confirm(ConfirmJob::new(&input.config, connector)?),
            JobType::CrossShardTest => {
                JobStrategy::CrossShardTest(CrossShardTestJob::new(&input.config, connector)?)
            }
            JobType::Call => JobStrategy::Call(CallJob::new(&input.config)?),
        };
        Ok(strategy)
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobStrategy::Send(_) => JobType::Send,
            JobStrategy::Confirm(_) => JobType::Confirm,
            JobStrategy::CrossShardTest(_) => JobType::CrossShardTest,
            JobStrategy::Call(_) => JobType::Call,
        }
    }

    /// Run the job to completion and return its output document
    pub async fn process(self) -> Result<Value, JobError> {
        match self {
            JobStrategy::Send(job) => to_output(job.process().await?),
            JobStrategy::Confirm(job) => to_output(job.process().await?),
            JobStrategy::CrossShardTest(job) => to_output(job.process().await?),
            JobStrategy::Call(job) => to_output(job.process().await?),
        }
    }
}

fn to_output<T: Serialize>(output: T) -> Result<Value, JobError> {
    Ok(serde_json::to_value(output)?)
}
