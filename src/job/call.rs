//! `CALL` strategy
//!
//! Issues `numberOfCalls` HTTP requests to `chainEndpoint` over `duration`
//! seconds and reports queries per second. No chain semantics are involved:
//! any 2xx response counts as a success.

use super::{parse_config, JobError};
use crate::distributed::protocol::JobConfig;
use crate::util::pacing::DeadlinePacer;
use crate::util::time::now_ms;
use futures::future::join_all;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub const REQUIRED_PROPERTIES: &[&str] = &["duration", "numberOfCalls", "chainEndpoint", "method", "body"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallConfig {
    pub duration: u64,
    pub number_of_calls: u64,
    pub chain_endpoint: String,
    pub method: String,
    pub body: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatistics {
    pub qps: f64,
    pub success: u64,
    pub error: u64,
    pub start_call_time: u64,
    pub finish_call_time: u64,
    pub total_call_time: u64,
}

/// Outcome of one call: the response body, or the error message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallResult {
    Success { timestamp: u64, response: Value },
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutput {
    pub message: String,
    pub statistics: CallStatistics,
    pub call_result_list: Vec<CallResult>,
}

pub struct CallJob {
    config: CallConfig,
    method: Method,
    http: reqwest::Client,
}

impl CallJob {
    pub fn new(config: &JobConfig) -> Result<Self, JobError> {
        let config: CallConfig = parse_config(config, REQUIRED_PROPERTIES)?;
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| JobError::InvalidConfig(format!("Unknown HTTP method '{}'", config.method)))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| JobError::Setup(format!("Failed to build HTTP client ({})", e)))?;
        Ok(Self { config, method, http })
    }

    pub async fn process(self) -> Result<CallOutput, JobError> {
        let start_call_time = now_ms();
        let call_result_list = self.start_calls().await;
        let finish_call_time = now_ms();
        let total_call_time = finish_call_time.saturating_sub(start_call_time);

        let success = call_result_list
            .iter()
            .filter(|r| matches!(r, CallResult::Success { .. }))
            .count() as u64;
        let error = call_result_list.len() as u64 - success;
        let qps = qps(success, total_call_time);

        info!(endpoint = %self.config.chain_endpoint, success, error, qps, "Finished calls");

        Ok(CallOutput {
            message: String::new(),
            statistics: CallStatistics {
                qps,
                success,
                error,
                start_call_time,
                finish_call_time,
                total_call_time,
            },
            call_result_list,
        })
    }

    async fn start_calls(&self) -> Vec<CallResult> {
        let mut pacer = DeadlinePacer::new(
            Duration::from_secs(self.config.duration),
            self.config.number_of_calls,
        );
        let mut calls = Vec::with_capacity(self.config.number_of_calls as usize);

        while pacer.tick().await.is_some() {
            let timestamp = now_ms();
            let mut request = self.http.request(self.method.clone(), &self.config.chain_endpoint);
            if self.method != Method::GET {
                request = request.json(&self.config.body);
            }
            calls.push(tokio::spawn(async move {
                match call(request).await {
                    Ok(response) => CallResult::Success { timestamp, response },
                    Err(e) => {
                        debug!(error = %e, "Call failed");
                        CallResult::Failure(e.to_string())
                    }
                }
            }));
        }

        join_all(calls)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| CallResult::Failure(e.to_string())))
            .collect()
    }
}

async fn call(request: reqwest::RequestBuilder) -> Result<Value, reqwest::Error> {
    let response = request.send().await?.error_for_status()?;
    let text = response.text().await?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// `success / seconds`, 0 when no time elapsed
pub fn qps(success: u64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    success as f64 / (elapsed_ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn job_config(url: &str, calls: u64) -> JobConfig {
        let config = json!({
            "duration": 1,
            "numberOfCalls": calls,
            "chainEndpoint": url,
            "method": "post",
            "body": {"jsonrpc": "2.0", "method": "ain_getRecentBlock", "params": {}},
        });
        match config {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_qps() {
        assert_eq!(qps(10, 2000), 5.0);
        assert_eq!(qps(10, 0), 0.0);
    }

    #[test]
    fn test_invalid_method() {
        let mut config = job_config("http://localhost:1", 1);
        config.insert("method".to_string(), json!("not a method"));
        assert!(matches!(CallJob::new(&config), Err(JobError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_calls_are_counted() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/json-rpc");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"result":{"number":1}}"#);
        });

        let job = CallJob::new(&job_config(&server.url("/json-rpc"), 4)).unwrap();
        let output = job.process().await.unwrap();
        mock.assert_hits(4);

        assert_eq!(output.statistics.success, 4);
        assert_eq!(output.statistics.error, 0);
        assert!(output.statistics.qps > 0.0);
        assert_eq!(output.call_result_list.len(), 4);
        match &output.call_result_list[0] {
            CallResult::Success { response, .. } => assert_eq!(response["result"]["number"], 1),
            other => panic!("Wrong result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(503).body("unavailable");
        });

        let job = CallJob::new(&job_config(&server.base_url(), 2)).unwrap();
        let output = job.process().await.unwrap();
        assert_eq!(output.statistics.success, 0);
        assert_eq!(output.statistics.error, 2);
        assert_eq!(output.statistics.qps, 0.0);
        assert!(matches!(output.call_result_list[0], CallResult::Failure(_)));
    }
}
