//! Configuration module
//!
//! Handles CLI argument parsing, benchmark config files (JSON or TOML), and
//! validation.
//!
//! # Benchmark config
//!
//! ```json
//! {
//!   "testType": "TPS",
//!   "duration": 60,
//!   "numberOfTransactions": 6000,
//!   "saveTxs": false,
//!   "targetList": [
//!     {
//!       "workerUrl": "http://10.0.1.10:3000",
//!       "chainEndpoint": "http://10.0.2.10:8080",
//!       "transactionOperation": {"type": "SET_VALUE", "ref": "/apps/bench/s1", "value": 1}
//!     }
//!   ]
//! }
//! ```
//!
//! Target entries may carry any additional keys (`address`, `privateKey`,
//! `method`, `body`, `shardingPath`, ...). They are passed through to the
//! worker untouched as part of the job config.

pub mod cli;
pub mod file;
pub mod validator;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

/// Benchmark selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    /// SEND then CONFIRM on every target
    #[serde(alias = "SHARD")]
    Tps,
    /// CALL on every target
    Qps,
    /// CROSS_SHARD_TEST on every target, then round matching
    CrossShard,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestType::Tps => "TPS",
            TestType::Qps => "QPS",
            TestType::CrossShard => "CROSS_SHARD",
        };
        f.write_str(name)
    }
}

/// Complete benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkConfig {
    #[serde(default)]
    pub test_type: Option<TestType>,

    /// Load window in seconds
    pub duration: u64,

    #[serde(default)]
    pub number_of_transactions: Option<u64>,

    #[serde(default)]
    pub number_of_calls: Option<u64>,

    /// Keep CONFIRM transaction lists and write them out
    #[serde(default)]
    pub save_txs: bool,

    pub target_list: Vec<TargetConfig>,

    #[serde(default)]
    pub monitoring: Option<MonitoringConfig>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_job_timeout_secs() -> u64 {
    DEFAULT_JOB_TIMEOUT_SECS
}

impl BenchmarkConfig {
    /// Configured test type, TPS when none is given
    pub fn test_type(&self) -> TestType {
        match self.test_type {
            Some(test_type) => test_type,
            None => {
                warn!("testType config is missing, proceeding with default test type (TPS)");
                TestType::Tps
            }
        }
    }

    /// Whether monitoring settle windows apply
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enable).unwrap_or(false)
    }
}

/// One shard under test: a worker and the chain endpoint it drives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub worker_url: String,

    #[serde(alias = "ainUrl")]
    pub chain_endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_operation: Option<Value>,

    /// Strategy specific keys passed through to the worker
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TargetConfig {
    /// `ref` of the configured transaction operation
    pub fn operation_ref(&self) -> Option<&str> {
        self.transaction_operation
            .as_ref()
            .and_then(|op| op.get("ref"))
            .and_then(Value::as_str)
    }
}

/// External monitoring collaborator settings
///
/// Only the time window is recorded; the cloud query itself runs elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub key_filename: Option<String>,
}

impl MonitoringConfig {
    pub fn is_complete(&self) -> bool {
        self.project_id.is_some() && self.instance_name.is_some() && self.key_filename.is_some()
    }
}
