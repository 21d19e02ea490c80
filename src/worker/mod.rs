//! Worker job slot
//!
//! A worker executes at most one job at a time. [`Worker`] owns the table of
//! jobs it has accepted, the id of the job currently running and the chain
//! connector strategies use. The HTTP layer in
//! [`crate::distributed::node_service`] is a thin adapter over it.
//!
//! # State machine
//!
//! ```text
//!            submit                finish(Ok)            delete
//!   (none) ---------> PROGRESS ----------------> SUCCESS --------> DELETE
//!                        |
//!                        |  finish(Err) / panic
//!                        +-------------------> FAIL
//! ```
//!
//! The busy check, config validation, id allocation and slot occupation all
//! happen under one lock, so two concurrent submits can never both be
//! accepted. The slot is released when the job reaches a terminal status.
//!
//! # Example
//!
//! ```no_run
//! use shardbench::chain::json_rpc::JsonRpcConnector;
//! use shardbench::worker::Worker;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let worker = Worker::new(Arc::new(JsonRpcConnector::new(Duration::from_secs(60))));
//! assert_eq!(worker.current_job(), None);
//! ```

use crate::chain::ChainConnector;
use crate::distributed::protocol::{empty_object, JobInput, JobSnapshot, JobStatus};
use crate::job::{JobError, JobStrategy};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker is busy now (job:{current})")]
    Busy { current: u64 },

    #[error("Can't find {id}")]
    NotFound { id: String },

    #[error("Job {id} is {status}, only SUCCESS jobs can be deleted")]
    NotDeletable { id: u64, status: JobStatus },

    #[error(transparent)]
    InvalidJob(#[from] JobError),
}

/// One accepted job
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub status: JobStatus,
    pub input: Value,
    pub output: Value,
}

impl JobRecord {
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            input: self.input.clone(),
            output: self.output.clone(),
        }
    }
}

/// FAIL and DELETE records kept for polling; older ones are pruned
pub const RETAINED_FINISHED_JOBS: usize = 256;

struct SlotTable {
    jobs: HashMap<u64, JobRecord>,
    current: Option<u64>,
    next_id: u64,
}

pub struct Worker {
    table: Mutex<SlotTable>,
    connector: Arc<dyn ChainConnector>,
}

impl Worker {
    pub fn new(connector: Arc<dyn ChainConnector>) -> Self {
        Self {
            table: Mutex::new(SlotTable {
                jobs: HashMap::new(),
                current: None,
                next_id: 1,
            }),
            connector,
        }
    }

    fn table(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept a job and start it in the background
    ///
    /// Fails with [`WorkerError::Busy`] while another job is running and with
    /// [`WorkerError::InvalidJob`] when the config does not validate. In both
    /// cases no job is created.
    pub fn submit(self: &Arc<Self>, input: JobInput) -> Result<u64, WorkerError> {
        let (id, job_type) = {
            let mut table = self.table();
            if let Some(current) = table.current {
                return Err(WorkerError::Busy { current });
            }
            let strategy = JobStrategy::from_input(&input, self.connector.as_ref())?;
            let job_type = strategy.job_type();

            let id = table.next_id;
            table.next_id += 1;
            table.current = Some(id);
            table.jobs.insert(
                id,
                JobRecord {
                    status: JobStatus::Progress,
                    input: serde_json::to_value(&input).unwrap_or_else(|_| empty_object()),
                    output: empty_object(),
                },
            );
            prune_finished(&mut table.jobs, RETAINED_FINISHED_JOBS);
            self.spawn(id, strategy);
            (id, job_type)
        };
        info!(id, %job_type, "Start job");
        Ok(id)
    }

    fn spawn(self: &Arc<Self>, id: u64, strategy: JobStrategy) {
        let worker = Arc::clone(self);
        let job = tokio::spawn(strategy.process());
        tokio::spawn(async move {
            let result = match job.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("Job aborted ({})", e)),
            };
            worker.finish(id, result);
        });
    }

    fn finish(&self, id: u64, result: Result<Value, String>) {
        let mut table = self.table();
        if let Some(record) = table.jobs.get_mut(&id) {
            match result {
                Ok(output) => {
                    record.output = output;
                    record.status = JobStatus::Success;
                    info!(id, "Finish job");
                }
                Err(message) => {
                    if !record.output.is_object() {
                        record.output = empty_object();
                    }
                    record.output["message"] = Value::String(message.clone());
                    record.status = JobStatus::Fail;
                    error!(id, %message, "Fail job");
                }
            }
        } else {
            warn!(id, "Finished job is no longer tracked");
        }
        if table.current == Some(id) {
            table.current = None;
        }
    }

    /// Snapshot of a job; `id` is the raw path segment
    pub fn get(&self, id: &str) -> Result<JobRecord, WorkerError> {
        let table = self.table();
        parse_id(id)
            .and_then(|id| table.jobs.get(&id))
            .cloned()
            .ok_or_else(|| WorkerError::NotFound { id: id.to_string() })
    }

    /// Purge a finished job's data; only SUCCESS jobs can be deleted
    pub fn delete(&self, id: &str) -> Result<u64, WorkerError> {
        let mut table = self.table();
        let not_found = || WorkerError::NotFound { id: id.to_string() };
        let key = parse_id(id).ok_or_else(not_found)?;
        let record = table.jobs.get_mut(&key).ok_or_else(not_found)?;
        if record.status != JobStatus::Success {
            return Err(WorkerError::NotDeletable {
                id: key,
                status: record.status,
            });
        }
        record.status = JobStatus::Delete;
        record.input = empty_object();
        record.output = empty_object();
        info!(id = key, "Delete job");
        Ok(key)
    }

    /// Id of the running job, if any
    pub fn current_job(&self) -> Option<u64> {
        self.table().current
    }
}

fn parse_id(id: &str) -> Option<u64> {
    id.parse().ok()
}

/// Drop the oldest FAIL/DELETE records beyond `keep`
///
/// PROGRESS and SUCCESS records are never pruned: the coordinator still has
/// to poll or delete them.
fn prune_finished(jobs: &mut HashMap<u64, JobRecord>, keep: usize) {
    let mut finished: Vec<u64> = jobs
        .iter()
        .filter(|(_, r)| matches!(r.status, JobStatus::Fail | JobStatus::Delete))
        .map(|(id, _)| *id)
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_unstable();
    let excess = finished.len() - keep;
    for id in &finished[..excess] {
        jobs.remove(id);
    }
}
