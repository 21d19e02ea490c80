//! Full TPS pipeline against two real worker services backed by mock chains

use serde_json::{json, Value};
use shardbench::chain::mock::{MockChain, MockConnector};
use shardbench::chain::ChainConnector;
use shardbench::config::BenchmarkConfig;
use shardbench::distributed::coordinator::Job;
use shardbench::distributed::node_service::{serve, NodeState};
use shardbench::distributed::{Coordinator, CoordinatorOptions, JobStatus};
use shardbench::job::send::SendOutput;
use shardbench::stats::RunSummary;
use shardbench::Worker;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn spawn_worker(connector: Arc<dyn ChainConnector>, name: &str) -> String {
    let state = Arc::new(NodeState {
        worker: Arc::new(Worker::new(connector)),
        node_id: name.to_string(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state));
    format!("http://{}", addr)
}

fn tps_config(targets: &[(&str, &str)]) -> BenchmarkConfig {
    let target_list: Vec<Value> = targets
        .iter()
        .enumerate()
        .map(|(i, (worker_url, chain))| {
            json!({
                "workerUrl": worker_url,
                "chainEndpoint": chain,
                "transactionOperation": {
                    "type": "SET_VALUE",
                    "ref": format!("/apps/bench/shard{}", i + 1),
                    "value": 1,
                },
            })
        })
        .collect();

    serde_json::from_value(json!({
        "testType": "TPS",
        "duration": 1,
        "numberOfTransactions": 10,
        "pollIntervalSecs": 1,
        "targetList": target_list,
    }))
    .unwrap()
}

fn job_output<'a>(result: &'a Value, shard: usize, phase: usize) -> &'a Value {
    &result["testList"][shard]["jobList"][phase]["output"]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tps_two_shards_with_partial_failure() {
    let chain_a = MockChain::new();
    let chain_b = MockChain::new();
    chain_b.fail_first_sends(3);

    let connector = MockConnector::new();
    connector.register("http://chain-a", chain_a.clone());
    connector.register("http://chain-b", chain_b.clone());
    let connector: Arc<dyn ChainConnector> = Arc::new(connector);

    let worker_a = spawn_worker(connector.clone(), "node-a").await;
    let worker_b = spawn_worker(connector.clone(), "node-b").await;

    let output_dir = tempfile::tempdir().unwrap();
    let config = tps_config(&[(&worker_a, "http://chain-a"), (&worker_b, "http://chain-b")]);
    let coordinator = Coordinator::new(
        config,
        CoordinatorOptions {
            output_dir: output_dir.path().to_path_buf(),
            debug: false,
        },
    )
    .unwrap();
    let report = coordinator.run().await.unwrap();

    let summary = match report.summary {
        RunSummary::Tps(summary) => summary,
        other => panic!("Wrong summary type: {other:?}"),
    };
    assert_eq!(summary.number_of_shards, 2);
    assert_eq!(summary.total_tx_count, 17);
    assert_eq!(summary.total_timeout_tx_count, 0);
    assert_eq!(summary.loss_rate, 0.0);

    // results were written before the workers were cleaned up
    let result: Value = serde_json::from_str(
        &std::fs::read_to_string(output_dir.path().join("result.json")).unwrap(),
    )
    .unwrap();

    let send_a: SendOutput = serde_json::from_value(job_output(&result, 0, 0).clone()).unwrap();
    let send_b: SendOutput = serde_json::from_value(job_output(&result, 1, 0).clone()).unwrap();
    assert_eq!((send_a.statistics.success, send_a.statistics.error), (10, 0));
    assert_eq!((send_b.statistics.success, send_b.statistics.error), (7, 3));

    // each CONFIRM scanned its own shard's block range
    let confirm_a = &job_output(&result, 0, 1)["statistics"];
    let confirm_b = &job_output(&result, 1, 1)["statistics"];
    assert_eq!(confirm_a["transactionCount"], 10);
    assert_eq!(confirm_b["transactionCount"], 7);
    assert_eq!(confirm_b["sendSuccess"], 7);
    assert_eq!(send_b.finish_block_number - send_b.start_block_number + 1, 7);

    let tps_sum = confirm_a["tps"].as_f64().unwrap() + confirm_b["tps"].as_f64().unwrap();
    assert!((summary.total_tps - tps_sum).abs() < 1e-4);
    assert!(summary.total_tps > 0.0);

    // SUCCESS jobs were purged on both workers
    for test in &report.tests {
        for job in &test.job_list {
            assert_eq!(job.status, Some(JobStatus::Delete));
            assert_eq!(job.output, json!({}));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_send_passes_confirm() {
    let chain = MockChain::new();
    chain.fail_first_sends(10);

    let connector = MockConnector::new();
    connector.register("http://chain-a", chain);
    let worker = spawn_worker(Arc::new(connector), "node-a").await;

    let output_dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(
        tps_config(&[(&worker, "http://chain-a")]),
        CoordinatorOptions {
            output_dir: output_dir.path().to_path_buf(),
            debug: true,
        },
    )
    .unwrap();
    let report = coordinator.run().await.unwrap();

    let jobs: &[Job] = &report.tests[0].job_list;
    assert_eq!(jobs[0].status, Some(JobStatus::Fail));
    assert!(jobs[0].message().starts_with("Success rate 0%"));
    assert_eq!(jobs[1].status, Some(JobStatus::Pass));
    assert_eq!(jobs[1].message(), "Previous job failed");

    match report.summary {
        RunSummary::Tps(summary) => {
            assert_eq!(summary.number_of_shards, 1);
            assert_eq!(summary.total_tx_count, 0);
            assert_eq!(summary.total_tps, 0.0);
        }
        other => panic!("Wrong summary type: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_worker_fails_job() {
    let output_dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(
        tps_config(&[("http://127.0.0.1:9", "http://chain-a")]),
        CoordinatorOptions {
            output_dir: output_dir.path().to_path_buf(),
            debug: true,
        },
    )
    .unwrap();
    let report = coordinator.run().await.unwrap();

    let jobs = &report.tests[0].job_list;
    assert_eq!(jobs[0].status, Some(JobStatus::Fail));
    assert_eq!(jobs[1].status, Some(JobStatus::Pass));
    assert!(output_dir.path().join("result.json").exists());
}
