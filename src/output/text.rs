//! Human-readable text output

use crate::distributed::coordinator::{Job, Test};
use crate::distributed::protocol::{JobStatus, JobType};
use crate::job::call::CallOutput;
use crate::job::confirm::ConfirmOutput;
use crate::job::cross_shard::CrossShardOutput;
use crate::job::send::SendOutput;
use crate::stats::rounds::Round;
use crate::stats::{QpsSummary, TpsSummary};
use crate::util::time::{format_clock, format_running_time};
use std::time::Duration;

/// Print the per-worker table of one finished phase
pub fn print_job_result(tests: &[Test], phase: usize, elapsed: Duration) {
    let job_type = tests
        .first()
        .and_then(|t| t.job_list.get(phase))
        .map(|j| j.job_type.to_string())
        .unwrap_or_default();

    println!();
    println!("- Finish '{}' job [{}]", job_type, format_running_time(elapsed));
    for line in job_result_lines(tests, phase) {
        println!("{}", line);
    }
    println!();
}

/// One `[Worker i] status: ..., target: ...` line per test
pub fn job_result_lines(tests: &[Test], phase: usize) -> Vec<String> {
    tests
        .iter()
        .enumerate()
        .filter_map(|(i, test)| {
            let job = test.job_list.get(phase)?;
            let status = job
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            Some(format!(
                "[Worker {}] status: {}, target: {}{}",
                i + 1,
                status,
                test.chain_endpoint(),
                job_details(job)
            ))
        })
        .collect()
}

fn job_details(job: &Job) -> String {
    match job.status {
        Some(JobStatus::Success) => success_details(job),
        Some(JobStatus::Fail) | Some(JobStatus::Pass) => format!(", message: {}", job.message()),
        _ => String::new(),
    }
}

fn success_details(job: &Job) -> String {
    match job.job_type {
        JobType::Send => job
            .output_as::<SendOutput>()
            .map(|send| {
                format!(
                    ", send: {}, pass: {}, error: {}, startBlockNumber: {}, finishBlockNumber: {}",
                    send.statistics.success,
                    send.statistics.pass,
                    send.statistics.error,
                    send.start_block_number,
                    send.finish_block_number
                )
            })
            .unwrap_or_default(),
        JobType::Confirm => job
            .output_as::<ConfirmOutput>()
            .map(|confirm| {
                let s = &confirm.statistics;
                format!(
                    ", tps: {}, lossRate: {}, sendStartTime: {}, finishBlockFinalizedAt: {}",
                    s.tps, s.loss_rate, s.send_start_time, s.finish_block_finalized_at
                )
            })
            .unwrap_or_default(),
        JobType::CrossShardTest => job
            .output_as::<CrossShardOutput>()
            .map(|cross| {
                let s = &cross.statistics;
                format!(
                    ", sendError: {}, checkinError: {}, checkinSuccess: {}",
                    s.send_error, s.checkin_error, s.checkin_success
                )
            })
            .unwrap_or_default(),
        JobType::Call => job
            .output_as::<CallOutput>()
            .map(|call| {
                let s = &call.statistics;
                format!(", qps: {:.5}, success: {}, error: {}", s.qps, s.success, s.error)
            })
            .unwrap_or_default(),
    }
}

/// Per-shard TPS lines and run totals
pub fn print_tps_statistics(tests: &[Test], summary: &TpsSummary, elapsed: Duration) {
    println!("- Finish all jobs [{}]", format_running_time(elapsed));
    println!();
    println!("- Statistics");

    for (i, test) in tests.iter().enumerate() {
        let path = test.config.target.operation_ref().unwrap_or("-");
        println!("[Shard {}] endpoint: {}, path: {}", i + 1, test.chain_endpoint(), path);

        let confirm = test.job_list.get(1);
        match confirm.and_then(|job| job.output_as::<ConfirmOutput>()) {
            Some(output) => {
                let s = &output.statistics;
                println!(
                    "TPS: {:.5} (<= {} txs / {} secs)",
                    s.tps,
                    s.transaction_count,
                    s.send_duration as f64 / 1000.0
                );
            }
            None => {
                let message = confirm.map(|job| job.message()).unwrap_or_default();
                println!("Error: {} [{}]", message, test.chain_endpoint());
            }
        }
        println!();
    }

    for line in tps_summary_lines(summary) {
        println!("{}", line);
    }
}

pub fn tps_summary_lines(summary: &TpsSummary) -> Vec<String> {
    let mut lines = vec![
        format!("Total TPS : {}", summary.total_tps),
        format!("Number of shards (sharding paths) : {}", summary.number_of_shards),
        format!("Total timeout transaction count (A) : {}", summary.total_timeout_tx_count),
        format!("Total transaction count (B) : {}", summary.total_tx_count),
        format!("Total loss rate (Y) : {}%", summary.loss_rate),
    ];
    if let Some(window) = summary.monitoring {
        lines.push(format!(
            "Monitoring window : {} ~ {}",
            format_clock(window.start_time),
            format_clock(window.end_time)
        ));
    }
    lines
}

/// Per-shard QPS lines and run totals
pub fn print_qps_statistics(tests: &[Test], summary: &QpsSummary, elapsed: Duration) {
    println!("- Finish all jobs [{}]", format_running_time(elapsed));
    println!();
    println!("- Statistics");

    for (i, test) in tests.iter().enumerate() {
        let job = test.job_list.first();
        println!("[Shard {}] endpoint: {}", i + 1, test.chain_endpoint());
        match job.and_then(|job| job.output_as::<CallOutput>()) {
            Some(output) => {
                let s = &output.statistics;
                println!(
                    "QPS: {:.5} ({} calls / {} secs), startCallTime: {}, finishCallTime: {}",
                    s.qps,
                    s.success,
                    s.total_call_time as f64 / 1000.0,
                    s.start_call_time,
                    s.finish_call_time
                );
            }
            None => {
                let message = job.map(|job| job.message()).unwrap_or_default();
                println!("Error: {} [{}]", message, test.chain_endpoint());
            }
        }
        println!();
    }

    println!("Total QPS : {}", summary.total_qps);
    println!("Total call success count (A) : {}", summary.total_success);
    println!("Total call error count (B) : {}", summary.total_error);
}

/// Per-round latency lines and the weighted total
pub fn print_round_results(rounds: &[Round], total_average: f64, elapsed: Duration) {
    println!("- Finish all jobs [{}]", format_running_time(elapsed));
    for line in round_lines(rounds, total_average) {
        println!("{}", line);
    }
}

pub fn round_lines(rounds: &[Round], total_average: f64) -> Vec<String> {
    let mut lines: Vec<String> = rounds
        .iter()
        .enumerate()
        .map(|(i, round)| {
            format!(
                "[Round {}] averageOfFinalizationTime: {}ms, startTime: {}, checkinTxCount: {}",
                i + 1,
                round.average_of_finalization_time,
                format_clock(round.start_time),
                round.checkin_tx_count
            )
        })
        .collect();
    lines.push(format!(
        "* Total average of finalization time (X): {}ms",
        total_average
    ));
    lines
}
