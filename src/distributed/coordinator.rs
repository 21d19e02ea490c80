//! Distributed coordinator
//!
//! This module implements the coordinator for distributed mode.
//! The coordinator:
//! - Builds one [`Test`] per target from the benchmark config
//! - Dispatches each phase's jobs to every worker (`POST /job`)
//! - Polls every running job until it reaches a terminal status
//! - Aggregates per-shard results and writes them out
//! - Asks workers to purge finished jobs
//!
//! # Pipelines
//!
//! ```text
//! TPS          SEND ──poll──> CONFIRM ──poll──> aggregate TPS / loss rate
//! QPS          CALL ──poll──> aggregate QPS
//! CROSS_SHARD  CROSS_SHARD_TEST ──poll──> round matching
//! ```
//!
//! A phase's job for shard `i` is always `tests[i].job_list[phase]`. A job
//! the coordinator decides not to dispatch (for example a CONFIRM whose SEND
//! failed) is marked `PASS` and skipped by both submit and poll.
//!
//! Every worker call failure is recorded on the job as `FAIL` with the error
//! text in `output.message`; it never aborts the run.

use crate::config::validator::validate_config;
use crate::config::{BenchmarkConfig, TargetConfig, TestType};
use crate::distributed::client::{WorkerClient, REQUEST_TIMEOUT};
use crate::distributed::protocol::{
    empty_object, message_output, JobConfig, JobInput, JobStatus, JobType,
};
use crate::job::call::CallOutput;
use crate::job::confirm::ConfirmOutput;
use crate::job::cross_shard::{CrossShardOutput, MatchedEvent};
use crate::job::send::SendOutput;
use crate::output::{json, text};
use crate::stats::rounds::{make_round_list, total_average_of_finalization_time, Round};
use crate::stats::{
    CrossShardSummary, MonitoringWindow, QpsAggregator, RunSummary, TpsAggregator,
};
use crate::util::time::{format_running_time, now_ms, round_to};
use anyhow::{Context, Result};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

/// Lead time before the first CROSS_SHARD target starts
pub const CROSS_SHARD_START_DELAY_MS: u64 = 20_000;

/// Settle windows around the SEND phase when monitoring is enabled
const MONITORING_LEAD: Duration = Duration::from_secs(60);
const MONITORING_SETTLE: Duration = Duration::from_secs(180);

/// One job as tracked by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub worker_url: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// The submitted [`JobInput`], `{}` once purged
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub output: Value,
}

impl Job {
    pub fn new(worker_url: &str, input: JobInput) -> Self {
        let job_type = input.job_type;
        Self {
            worker_url: worker_url.to_string(),
            job_type,
            input: serde_json::to_value(&input).unwrap_or_else(|_| empty_object()),
            status: None,
            id: None,
            output: empty_object(),
        }
    }

    /// A job that is never sent to its worker
    pub fn pass(worker_url: &str, job_type: JobType, message: &str) -> Self {
        Self {
            worker_url: worker_url.to_string(),
            job_type,
            input: serde_json::json!({ "type": job_type }),
            status: Some(JobStatus::Pass),
            id: None,
            output: message_output(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(JobStatus::Success)
    }

    /// Output decoded as a strategy output, only for SUCCESS jobs
    pub fn output_as<T: DeserializeOwned>(&self) -> Option<T> {
        if !self.is_success() {
            return None;
        }
        serde_json::from_value(self.output.clone()).ok()
    }

    /// `output.message`, or an empty string
    pub fn message(&self) -> &str {
        self.output
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn fail(&mut self, message: String) {
        self.status = Some(JobStatus::Fail);
        if !self.output.is_object() {
            self.output = empty_object();
        }
        self.output["message"] = Value::String(message);
    }
}

/// Per-target test configuration sent to the worker as job config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_transactions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_calls: Option<u64>,
    #[serde(default)]
    pub save_txs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    /// Target keys last, so they win over run-level values
    #[serde(flatten)]
    pub target: TargetConfig,
}

impl TestConfig {
    fn from_target(config: &BenchmarkConfig, target: &TargetConfig) -> Self {
        Self {
            duration: config.duration,
            number_of_transactions: config.number_of_transactions,
            number_of_calls: config.number_of_calls,
            save_txs: config.save_txs,
            wait: None,
            start_round: None,
            start_time: None,
            target: target.clone(),
        }
    }

    /// Job config: this test's keys as a JSON object
    pub fn to_job_config(&self) -> JobConfig {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => JobConfig::new(),
        }
    }
}

/// One shard under test and the jobs run against it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub config: TestConfig,
    pub job_list: Vec<Job>,
}

impl Test {
    fn new(config: TestConfig) -> Self {
        Self {
            config,
            job_list: Vec::new(),
        }
    }

    pub fn worker_url(&self) -> &str {
        &self.config.target.worker_url
    }

    pub fn chain_endpoint(&self) -> &str {
        &self.config.target.chain_endpoint
    }
}

/// Build the test list for a run started at `run_start` (ms)
///
/// CROSS_SHARD targets follow the incremental-stress schedule: target `i` of
/// `k` runs for `round2(1 - i/k)` of the duration and transactions, waits
/// out the rest, and starts at round `i + 1`.
pub fn make_test_list(config: &BenchmarkConfig, test_type: TestType, run_start: u64) -> Vec<Test> {
    let count = config.target_list.len();

    config
        .target_list
        .iter()
        .enumerate()
        .map(|(index, target)| {
            let mut test = TestConfig::from_target(config, target);
            if test_type == TestType::CrossShard {
                let rate = round_to(1.0 - index as f64 / count as f64, 2);
                let duration = (config.duration as f64 * rate).floor() as u64;
                let transactions = config.number_of_transactions.unwrap_or(0) as f64 * rate;
                let wait = config.duration.saturating_sub(duration);

                test.duration = duration;
                test.number_of_transactions = Some(transactions.floor() as u64);
                test.wait = Some(wait);
                test.start_round = Some(index as u32 + 1);
                test.start_time = Some(run_start + CROSS_SHARD_START_DELAY_MS + wait * 1000);
            }
            Test::new(test)
        })
        .collect()
}

/// Append a SEND job to every test; all share the base `timestamp`
pub fn add_send_jobs(tests: &mut [Test], timestamp: u64) {
    for test in tests {
        let mut config = test.config.to_job_config();
        config.insert("timestamp".to_string(), timestamp.into());
        let job = Job::new(test.worker_url(), JobInput::new(JobType::Send, config));
        test.job_list.push(job);
    }
}

/// Append a CONFIRM job built from each test's last job
pub fn add_confirm_jobs(tests: &mut [Test]) {
    for test in tests {
        let job = build_confirm_job(test);
        test.job_list.push(job);
    }
}

/// CONFIRM job for a test whose last job should be a successful SEND
///
/// Anything else gives a PASS job carrying the reason.
pub fn build_confirm_job(test: &Test) -> Job {
    let worker_url = test.worker_url();
    let previous = match test.job_list.last() {
        Some(job) => job,
        None => return Job::pass(worker_url, JobType::Confirm, "Previous job is not 'SEND' type"),
    };

    if previous.status == Some(JobStatus::Fail) {
        return Job::pass(worker_url, JobType::Confirm, "Previous job failed");
    }
    if previous.job_type != JobType::Send {
        return Job::pass(worker_url, JobType::Confirm, "Previous job is not 'SEND' type");
    }
    let send: SendOutput = match previous.output_as() {
        Some(output) => output,
        None => return Job::pass(worker_url, JobType::Confirm, "Previous job failed"),
    };
    let operation_ref = match test.config.target.operation_ref() {
        Some(r) => r,
        None => return Job::pass(worker_url, JobType::Confirm, "Previous job has no operation ref"),
    };

    let mut config = JobConfig::new();
    config.insert("chainEndpoint".into(), test.chain_endpoint().into());
    config.insert("sendStartTime".into(), send.send_start_time.into());
    config.insert("startBlockNumber".into(), send.start_block_number.into());
    config.insert("finishBlockNumber".into(), send.finish_block_number.into());
    config.insert("transactionOperationRef".into(), operation_ref.into());
    config.insert("sendSuccess".into(), send.statistics.success.into());
    config.insert("saveTxs".into(), test.config.save_txs.into());

    Job::new(worker_url, JobInput::new(JobType::Confirm, config))
}

/// Append a CALL job to every test
pub fn add_call_jobs(tests: &mut [Test], timestamp: u64) {
    for test in tests {
        let mut config = test.config.to_job_config();
        config.insert("timestamp".to_string(), timestamp.into());
        let job = Job::new(test.worker_url(), JobInput::new(JobType::Call, config));
        test.job_list.push(job);
    }
}

/// Append a CROSS_SHARD_TEST job to every test
pub fn add_cross_shard_jobs(tests: &mut [Test]) {
    for test in tests {
        let config = test.config.to_job_config();
        let job = Job::new(test.worker_url(), JobInput::new(JobType::CrossShardTest, config));
        test.job_list.push(job);
    }
}

async fn submit_job(client: &WorkerClient, job: &mut Job) {
    if job.status == Some(JobStatus::Pass) {
        return;
    }

    match client.submit(&job.worker_url, &job.input).await {
        Ok(id) => {
            info!(job_id = id, worker_url = %job.worker_url, job_type = %job.job_type, "Submitted job");
            job.status = Some(JobStatus::Progress);
            job.id = Some(id);
        }
        Err(e) => {
            warn!(worker_url = %job.worker_url, error = %e, "Error while requesting job");
            if e.status() == Some(StatusCode::CONFLICT) {
                log_busy_worker(client, &job.worker_url).await;
            }
            job.fail(e.to_string());
        }
    }
}

/// Log which job keeps a worker busy
async fn log_busy_worker(client: &WorkerClient, worker_url: &str) {
    match client.status(worker_url).await {
        Ok(status) => warn!(
            worker_url,
            node = %status.node,
            current_job = ?status.current_job,
            "Worker is still running another job"
        ),
        Err(e) => debug!(worker_url, error = %e, "Failed to read worker status"),
    }
}

/// Submit the phase's job to every worker concurrently
pub async fn submit_phase(client: &WorkerClient, tests: &mut [Test], phase: usize) {
    let submits = tests
        .iter_mut()
        .filter_map(|test| test.job_list.get_mut(phase))
        .map(|job| submit_job(client, job));
    join_all(submits).await;
}

/// Poll every PROGRESS job of the phase until none is left
///
/// Jobs still running after `job_timeout` are marked FAIL.
pub async fn poll_phase(
    client: &WorkerClient,
    tests: &mut [Test],
    phase: usize,
    poll_interval: Duration,
    job_timeout: Duration,
) {
    let started = Instant::now();
    let total = tests.len();
    let job_type = tests
        .first()
        .and_then(|t| t.job_list.get(phase))
        .map(|j| j.job_type.to_string())
        .unwrap_or_default();

    loop {
        let mut unfinished = 0;
        for test in tests.iter_mut() {
            let job = match test.job_list.get_mut(phase) {
                Some(job) if job.status == Some(JobStatus::Progress) => job,
                _ => continue,
            };
            let id = match job.id {
                Some(id) => id,
                None => {
                    job.fail("Job was never assigned an id".to_string());
                    continue;
                }
            };

            match client.poll(&job.worker_url, id).await {
                Ok(snapshot) => {
                    job.status = Some(snapshot.status);
                    job.output = snapshot.output;
                    if snapshot.status == JobStatus::Progress {
                        unfinished += 1;
                    }
                }
                Err(e) => {
                    warn!(job_id = id, worker_url = %job.worker_url, error = %e, "Error while polling job");
                    job.fail(e.to_string());
                }
            }
        }

        if unfinished == 0 {
            break;
        }

        if started.elapsed() >= job_timeout {
            let message = format!("Job timed out after {}s", job_timeout.as_secs());
            for job in tests.iter_mut().filter_map(|t| t.job_list.get_mut(phase)) {
                if job.status == Some(JobStatus::Progress) {
                    warn!(job_id = ?job.id, worker_url = %job.worker_url, "Job timed out");
                    job.fail(message.clone());
                }
            }
            break;
        }

        info!(
            "{} workers are still processing '{}' job ({}/{}) [{}]",
            unfinished,
            job_type,
            total - unfinished,
            total,
            format_running_time(started.elapsed())
        );
        sleep(poll_interval).await;
    }
}

/// DELETE every SUCCESS job on its worker
///
/// Purged jobs become `{status: DELETE, input: {}, output: {}}` locally.
/// Failures are logged and left as they are.
pub async fn cleanup(client: &WorkerClient, tests: &mut [Test]) {
    println!("- Request workers to cleanup data");
    for test in tests.iter_mut() {
        for job in test.job_list.iter_mut().filter(|job| job.is_success()) {
            let id = match job.id {
                Some(id) => id,
                None => continue,
            };
            match client.delete(&job.worker_url, id).await {
                Ok(_) => {
                    job.status = Some(JobStatus::Delete);
                    job.input = empty_object();
                    job.output = empty_object();
                }
                Err(e) => {
                    warn!(job_id = id, worker_url = %job.worker_url, error = %e, "Fail to cleanup data");
                }
            }
        }
    }
    println!("- Finish to cleanup data");
}

/// Coordinator tunables not carried by the benchmark config
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub output_dir: PathBuf,
    /// Keep finished jobs on the workers
    pub debug: bool,
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub tests: Vec<Test>,
    /// Cross-shard rounds, empty for other test types
    pub rounds: Vec<Round>,
    pub output_dir: PathBuf,
}

/// Distributed coordinator
///
/// Orchestrates one benchmark run across the configured workers.
pub struct Coordinator {
    config: BenchmarkConfig,
    test_type: TestType,
    options: CoordinatorOptions,
    client: WorkerClient,
    started: Instant,
}

impl Coordinator {
    /// Create a coordinator; the config is validated here
    pub fn new(config: BenchmarkConfig, options: CoordinatorOptions) -> Result<Self> {
        validate_config(&config).context("Invalid benchmark config")?;
        let client = WorkerClient::new(REQUEST_TIMEOUT).context("Failed to build HTTP client")?;
        let test_type = config.test_type();

        Ok(Self {
            config,
            test_type,
            options,
            client,
            started: Instant::now(),
        })
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs)
    }

    fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.config.job_timeout_secs)
    }

    /// Run the benchmark to completion
    pub async fn run(self) -> Result<RunReport> {
        info!(
            test_type = %self.test_type,
            targets = self.config.target_list.len(),
            output_dir = %self.options.output_dir.display(),
            "Starting benchmark"
        );
        json::init_output_dir(&self.options.output_dir)?;

        match self.test_type {
            TestType::Tps => self.run_tps().await,
            TestType::Qps => self.run_qps().await,
            TestType::CrossShard => self.run_cross_shard().await,
        }
    }

    async fn process_phase(&self, tests: &mut [Test], phase: usize) {
        if let Some(job_type) = tests.first().and_then(|t| t.job_list.get(phase)).map(|j| j.job_type) {
            println!("- Start to process '{}' job", job_type);
        }
        submit_phase(&self.client, tests, phase).await;
        poll_phase(&self.client, tests, phase, self.poll_interval(), self.job_timeout()).await;
        text::print_job_result(tests, phase, self.started.elapsed());
    }

    async fn monitoring_delay(&self, duration: Duration) {
        if self.config.monitoring_enabled() {
            info!(secs = duration.as_secs(), "Waiting for monitoring window");
            sleep(duration).await;
        }
    }

    async fn run_tps(self) -> Result<RunReport> {
        let mut tests = make_test_list(&self.config, self.test_type, now_ms());

        self.monitoring_delay(MONITORING_LEAD).await;
        let test_start_time = now_ms();
        self.monitoring_delay(MONITORING_LEAD).await;

        add_send_jobs(&mut tests, now_ms());
        self.process_phase(&mut tests, 0).await;

        self.monitoring_delay(MONITORING_SETTLE).await;
        let send_end_time = now_ms();
        self.monitoring_delay(MONITORING_LEAD).await;

        add_confirm_jobs(&mut tests);
        self.process_phase(&mut tests, 1).await;

        let mut aggregator = TpsAggregator::new();
        for test in &tests {
            let confirm = test.job_list.get(1).and_then(|job| job.output_as::<ConfirmOutput>());
            aggregator.add_shard(test.chain_endpoint(), confirm.as_ref().map(|c| &c.statistics));
        }
        let mut summary = aggregator.summary();
        if self.config.monitoring_enabled() {
            summary.monitoring = Some(MonitoringWindow {
                start_time: test_start_time,
                end_time: send_end_time,
            });
        }
        text::print_tps_statistics(&tests, &summary, self.started.elapsed());

        let dir = &self.options.output_dir;
        for (index, test) in tests.iter_mut().enumerate() {
            if !test.config.save_txs {
                continue;
            }
            let confirm = match test.job_list.get_mut(1) {
                Some(job) if job.is_success() => job,
                _ => continue,
            };
            if let Some(list) = confirm.output.as_object_mut().and_then(|o| o.remove("transactionList")) {
                json::write_shard_transactions(dir, index, list.as_array().map(Vec::as_slice).unwrap_or_default())?;
            }
        }
        let summary = RunSummary::Tps(summary);
        json::write_run_result(dir, &summary, &tests)?;
        println!("- Save result in '{}'", dir.display());

        self.finish(summary, tests, Vec::new()).await
    }

    async fn run_qps(self) -> Result<RunReport> {
        let mut tests = make_test_list(&self.config, self.test_type, now_ms());

        add_call_jobs(&mut tests, now_ms());
        self.process_phase(&mut tests, 0).await;

        let mut aggregator = QpsAggregator::new();
        for test in &tests {
            let call = test.job_list.first().and_then(|job| job.output_as::<CallOutput>());
            aggregator.add_shard(call.as_ref().map(|c| &c.statistics));
        }
        let summary = aggregator.summary();
        text::print_qps_statistics(&tests, &summary, self.started.elapsed());

        let summary = RunSummary::Qps(summary);
        json::write_run_result(&self.options.output_dir, &summary, &tests)?;
        println!("- Save result in '{}'", self.options.output_dir.display());

        self.finish(summary, tests, Vec::new()).await
    }

    async fn run_cross_shard(self) -> Result<RunReport> {
        let mut tests = make_test_list(&self.config, self.test_type, now_ms());

        add_cross_shard_jobs(&mut tests);
        self.process_phase(&mut tests, 0).await;

        let dir = &self.options.output_dir;
        let mut matched: Vec<Vec<MatchedEvent>> = Vec::with_capacity(tests.len());
        for (index, test) in tests.iter_mut().enumerate() {
            let output = test.job_list.first().and_then(|job| job.output_as::<CrossShardOutput>());
            match output {
                Some(output) => {
                    json::write_shard_transactions(dir, index, &output.transaction_list)?;
                    if let Some(o) = test.job_list[0].output.as_object_mut() {
                        o.remove("transactionList");
                    }
                    matched.push(output.matched_list);
                }
                None => matched.push(Vec::new()),
            }
        }

        let rounds = make_round_list(&matched);
        let total_average = total_average_of_finalization_time(&rounds);
        text::print_round_results(&rounds, total_average, self.started.elapsed());

        json::write_round_results(dir, &rounds)?;
        let summary = RunSummary::CrossShard(CrossShardSummary {
            number_of_rounds: rounds.len(),
            total_checkin_tx_count: rounds.iter().map(|r| r.checkin_tx_count).sum(),
            total_average_of_finalization_time: total_average,
        });
        json::write_run_result(dir, &summary, &tests)?;
        println!("- Save result in '{}'", dir.display());

        self.finish(summary, tests, rounds).await
    }

    async fn finish(self, summary: RunSummary, mut tests: Vec<Test>, rounds: Vec<Round>) -> Result<RunReport> {
        if self.options.debug {
            info!("Debug mode, keeping jobs on workers");
        } else {
            cleanup(&self.client, &mut tests).await;
        }

        Ok(RunReport {
            summary,
            tests,
            rounds,
            output_dir: self.options.output_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::send::SendStatistics;
    use httpmock::prelude::*;
    use serde_json::{json, Map};

    fn target(i: usize) -> TargetConfig {
        TargetConfig {
            worker_url: format!("http://worker-{}", i),
            chain_endpoint: format!("http://chain-{}", i),
            transaction_operation: Some(json!({"type": "SET_VALUE", "ref": "/apps/bench", "value": 1})),
            extra: Map::new(),
        }
    }

    fn config(test_type: TestType, targets: usize) -> BenchmarkConfig {
        BenchmarkConfig {
            test_type: Some(test_type),
            duration: 100,
            number_of_transactions: Some(1000),
            number_of_calls: Some(10),
            save_txs: true,
            target_list: (1..=targets).map(target).collect(),
            monitoring: None,
            poll_interval_secs: 10,
            job_timeout_secs: 3600,
        }
    }

    fn send_output() -> Value {
        serde_json::to_value(SendOutput {
            message: String::new(),
            statistics: SendStatistics {
                success: 8,
                pass: 0,
                error: 2,
            },
            send_start_time: 1_000,
            send_finish_time: 2_000,
            start_block_number: 11,
            finish_block_number: 20,
            block_duration: 100.0,
        })
        .unwrap()
    }

    fn client() -> WorkerClient {
        WorkerClient::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_incremental_schedule() {
        let tests = make_test_list(&config(TestType::CrossShard, 3), TestType::CrossShard, 1_000_000);
        let schedule: Vec<_> = tests
            .iter()
            .map(|t| {
                (
                    t.config.duration,
                    t.config.number_of_transactions,
                    t.config.wait,
                    t.config.start_round,
                    t.config.start_time,
                )
            })
            .collect();

        // rates 1.0, 0.67, 0.33
        assert_eq!(
            schedule,
            vec![
                (100, Some(1000), Some(0), Some(1), Some(1_020_000)),
                (67, Some(670), Some(33), Some(2), Some(1_053_000)),
                (33, Some(330), Some(67), Some(3), Some(1_087_000)),
            ]
        );
    }

    #[test]
    fn test_incremental_schedule_can_reach_zero() {
        let mut cfg = config(TestType::CrossShard, 3);
        cfg.number_of_transactions = Some(2);
        for target in cfg.target_list.iter_mut() {
            for (key, value) in [
                ("address", "0xshard"),
                ("privateKey", "secret"),
                ("shardOwnerAddress", "0xowner"),
                ("shardingPath", "/apps/afan"),
            ] {
                target.extra.insert(key.to_string(), json!(value));
            }
        }
        let mut tests = make_test_list(&cfg, TestType::CrossShard, 0);
        let counts: Vec<_> = tests.iter().map(|t| t.config.number_of_transactions).collect();
        assert_eq!(counts, vec![Some(2), Some(1), Some(0)]);

        // the last shard still gets a job that validates on the worker
        add_cross_shard_jobs(&mut tests);
        let input: JobInput = serde_json::from_value(tests[2].job_list[0].input.clone()).unwrap();
        let connector = crate::chain::mock::MockConnector::new();
        connector.register("http://chain-3", crate::chain::mock::MockChain::new());
        assert!(crate::job::JobStrategy::from_input(&input, &connector).is_ok());
    }

    #[test]
    fn test_tps_tests_are_uniform() {
        let tests = make_test_list(&config(TestType::Tps, 2), TestType::Tps, 0);
        assert!(tests.iter().all(|t| t.config.duration == 100 && t.config.wait.is_none()));
        assert_eq!(tests[1].worker_url(), "http://worker-2");
    }

    #[test]
    fn test_send_job_config() {
        let mut tests = make_test_list(&config(TestType::Tps, 1), TestType::Tps, 0);
        tests[0].config.target.extra.insert("duration".into(), json!(5));
        add_send_jobs(&mut tests, 42);

        let job = &tests[0].job_list[0];
        assert_eq!(job.job_type, JobType::Send);
        assert_eq!(job.input["type"], "SEND");
        let config = &job.input["config"];
        assert_eq!(config["timestamp"], 42);
        assert_eq!(config["chainEndpoint"], "http://chain-1");
        assert_eq!(config["numberOfTransactions"], 1000);
        assert_eq!(config["transactionOperation"]["ref"], "/apps/bench");
        // per-target keys override run-level ones
        assert_eq!(config["duration"], 5);
        assert!(config.get("wait").is_none());
    }

    #[test]
    fn test_confirm_job_from_send() {
        let mut tests = make_test_list(&config(TestType::Tps, 1), TestType::Tps, 0);
        add_send_jobs(&mut tests, 42);
        tests[0].job_list[0].status = Some(JobStatus::Success);
        tests[0].job_list[0].output = send_output();

        add_confirm_jobs(&mut tests);
        let job = &tests[0].job_list[1];
        assert_eq!(job.status, None);
        assert_eq!(
            job.input["config"],
            json!({
                "chainEndpoint": "http://chain-1",
                "sendStartTime": 1000,
                "startBlockNumber": 11,
                "finishBlockNumber": 20,
                "transactionOperationRef": "/apps/bench",
                "sendSuccess": 8,
                "saveTxs": true,
            })
        );
    }

    #[test]
    fn test_confirm_job_passes_after_failure() {
        let mut tests = make_test_list(&config(TestType::Tps, 2), TestType::Tps, 0);
        add_send_jobs(&mut tests, 42);
        tests[0].job_list[0].status = Some(JobStatus::Fail);
        tests[1].job_list[0] = Job::new("http://worker-2", JobInput::new(JobType::Call, Map::new()));
        tests[1].job_list[0].status = Some(JobStatus::Success);

        add_confirm_jobs(&mut tests);
        assert_eq!(tests[0].job_list[1].status, Some(JobStatus::Pass));
        assert_eq!(tests[0].job_list[1].message(), "Previous job failed");
        assert_eq!(tests[1].job_list[1].status, Some(JobStatus::Pass));
        assert_eq!(tests[1].job_list[1].message(), "Previous job is not 'SEND' type");
    }

    #[tokio::test]
    async fn test_submit_phase_records_failures() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/job");
            then.status(409).body(r#"{"message":"Worker is busy now (job:3)"}"#);
        });
        let status = server.mock(|when, then| {
            when.method(GET).path("/status");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"memory":{"heapUsedMiB":1.0,"heapTotalMiB":2.0},"node":"w1","currentJob":3}"#);
        });

        let mut cfg = config(TestType::Qps, 2);
        cfg.target_list[0].worker_url = server.base_url();
        let mut tests = make_test_list(&cfg, TestType::Qps, 0);
        add_call_jobs(&mut tests, 1);
        tests[1].job_list[0].status = Some(JobStatus::Pass);

        submit_phase(&client(), &mut tests, 0).await;
        let failed = &tests[0].job_list[0];
        assert_eq!(failed.status, Some(JobStatus::Fail));
        assert!(failed.message().starts_with("status: 409"));
        // PASS jobs are never sent
        assert_eq!(tests[1].job_list[0].status, Some(JobStatus::Pass));
        // a busy worker is asked which job it is running
        status.assert();
    }

    #[tokio::test]
    async fn test_poll_phase_until_terminal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/job/5");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"status":"SUCCESS","input":{},"output":{"message":"done"}}"#);
        });

        let mut cfg = config(TestType::Qps, 2);
        cfg.target_list[0].worker_url = server.base_url();
        cfg.target_list[1].worker_url = "http://127.0.0.1:9".to_string();
        let mut tests = make_test_list(&cfg, TestType::Qps, 0);
        add_call_jobs(&mut tests, 1);
        for test in tests.iter_mut() {
            test.job_list[0].status = Some(JobStatus::Progress);
            test.job_list[0].id = Some(5);
        }

        poll_phase(&client(), &mut tests, 0, Duration::from_millis(10), Duration::from_secs(5)).await;
        assert_eq!(tests[0].job_list[0].status, Some(JobStatus::Success));
        assert_eq!(tests[0].job_list[0].message(), "done");
        // unreachable worker turns into FAIL, never an abort
        assert_eq!(tests[1].job_list[0].status, Some(JobStatus::Fail));
    }

    #[tokio::test]
    async fn test_poll_phase_timeout() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/job/1");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"status":"PROGRESS","input":{},"output":{}}"#);
        });

        let mut cfg = config(TestType::Qps, 1);
        cfg.target_list[0].worker_url = server.base_url();
        let mut tests = make_test_list(&cfg, TestType::Qps, 0);
        add_call_jobs(&mut tests, 1);
        tests[0].job_list[0].status = Some(JobStatus::Progress);
        tests[0].job_list[0].id = Some(1);

        poll_phase(&client(), &mut tests, 0, Duration::from_millis(20), Duration::from_millis(50)).await;
        let job = &tests[0].job_list[0];
        assert_eq!(job.status, Some(JobStatus::Fail));
        assert_eq!(job.message(), "Job timed out after 0s");
        assert!(mock.hits() >= 2);
    }

    #[tokio::test]
    async fn test_cleanup_purges_success_only() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/job/4");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":4}"#);
        });

        let mut cfg = config(TestType::Qps, 1);
        cfg.target_list[0].worker_url = server.base_url();
        let mut tests = make_test_list(&cfg, TestType::Qps, 0);
        add_call_jobs(&mut tests, 1);
        add_call_jobs(&mut tests, 2);
        tests[0].job_list[0].status = Some(JobStatus::Success);
        tests[0].job_list[0].id = Some(4);
        tests[0].job_list[1].status = Some(JobStatus::Fail);
        tests[0].job_list[1].id = Some(5);

        cleanup(&client(), &mut tests).await;
        delete.assert_hits(1);
        let purged = &tests[0].job_list[0];
        assert_eq!(purged.status, Some(JobStatus::Delete));
        assert_eq!(purged.input, json!({}));
        assert_eq!(purged.output, json!({}));
        assert_eq!(tests[0].job_list[1].status, Some(JobStatus::Fail));
    }

    #[test]
    fn test_job_serialization() {
        let job = Job::pass("http://w", JobType::Confirm, "Previous job failed");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["workerUrl"], "http://w");
        assert_eq!(value["status"], "PASS");
        assert_eq!(value["output"]["message"], "Previous job failed");
        assert!(value.get("id").is_none());
    }
}
