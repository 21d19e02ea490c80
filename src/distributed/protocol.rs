//! Coordinator/worker protocol
//!
//! Workers expose a small JSON-over-HTTP API. The coordinator submits one job
//! at a time per worker and polls it until it reaches a terminal status.
//!
//! # Endpoints
//!
//! ```text
//! POST   /job        JobInput           -> 200 {id}          | 409 busy | 400 invalid
//! GET    /job/:id                       -> 200 JobSnapshot   | 404
//! DELETE /job/:id                       -> 200 {id}          | 404 | 409 not deletable
//! GET    /status                        -> 200 StatusResponse
//! ```
//!
//! Every error body is `{"message": "..."}`.
//!
//! # Job lifecycle
//!
//! ```text
//! Coordinator                     Worker
//!     |                              |
//!     |-- POST /job ---------------->|  PROGRESS
//!     |<------------- {id} ----------|
//!     |                              |
//!     |-- GET /job/:id ------------->|  (repeat every poll interval)
//!     |<--- {status, input, output} -|  SUCCESS | FAIL
//!     |                              |
//!     |-- DELETE /job/:id ---------->|  DELETE (SUCCESS jobs only)
//! ```
//!
//! `PASS` never reaches a worker: the coordinator assigns it to jobs it
//! decides not to dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Strategy-specific key/value configuration of a job
pub type JobConfig = Map<String, Value>;

/// Job strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Send,
    Confirm,
    CrossShardTest,
    Call,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobType::Send => "SEND",
            JobType::Confirm => "CONFIRM",
            JobType::CrossShardTest => "CROSS_SHARD_TEST",
            JobType::Call => "CALL",
        };
        f.write_str(name)
    }
}

/// Job status
///
/// `PROGRESS` moves to exactly one of `SUCCESS` or `FAIL`. Only `SUCCESS`
/// moves on to `DELETE`. `PASS` is assigned by the coordinator only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Progress,
    Success,
    Fail,
    Pass,
    Delete,
}

impl JobStatus {
    /// Whether the job stopped running
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Progress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Progress => "PROGRESS",
            JobStatus::Success => "SUCCESS",
            JobStatus::Fail => "FAIL",
            JobStatus::Pass => "PASS",
            JobStatus::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Body of `POST /job`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub config: JobConfig,
}

impl JobInput {
    pub fn new(job_type: JobType, config: JobConfig) -> Self {
        Self { job_type, config }
    }
}

/// Response of `POST /job` and `DELETE /job/:id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobIdResponse {
    pub id: u64,
}

/// Response of `GET /job/:id`
///
/// `input` and `output` are `{}` once the job has been deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    #[serde(default = "empty_object")]
    pub input: Value,
    #[serde(default = "empty_object")]
    pub output: Value,
}

/// Error body of every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Response of `GET /status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub memory: MemoryStatus,
    pub node: String,
    pub current_job: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatus {
    #[serde(rename = "heapUsedMiB")]
    pub heap_used_mib: f64,
    #[serde(rename = "heapTotalMiB")]
    pub heap_total_mib: f64,
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// `{"message": message}`
pub fn message_output(message: impl Into<String>) -> Value {
    json!({ "message": message.into() })
}
