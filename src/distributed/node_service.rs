//! Node service for distributed mode
//!
//! This module implements the HTTP service that runs on each worker node.
//! The node service:
//! - Accepts job submissions from the coordinator (`POST /job`)
//! - Reports job status and output (`GET /job/:id`)
//! - Purges finished jobs (`DELETE /job/:id`)
//! - Reports memory usage and the running job (`GET /status`)
//!
//! All job bookkeeping lives in [`Worker`]; handlers only translate between
//! HTTP and the worker's API.

use crate::chain::ChainConnector;
use crate::distributed::protocol::{
    ErrorResponse, JobIdResponse, JobInput, JobSnapshot, MemoryStatus, StatusResponse,
};
use crate::util::resource::MemorySnapshot;
use crate::worker::{Worker, WorkerError};
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state
pub struct NodeState {
    pub worker: Arc<Worker>,
    pub node_id: String,
}

/// Node service
///
/// Runs on each worker node, executing jobs submitted by the coordinator.
pub struct NodeService {
    /// Port to listen on
    listen_port: u16,

    state: Arc<NodeState>,
}

impl NodeService {
    pub fn new(listen_port: u16, connector: Arc<dyn ChainConnector>) -> Self {
        Self {
            listen_port,
            state: Arc::new(NodeState {
                worker: Arc::new(Worker::new(connector)),
                node_id: get_node_id(),
            }),
        }
    }

    /// Run the node service until the process exits
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind node service on {}", addr))?;

        info!(port = self.listen_port, node = %self.state.node_id, "Worker node listening");
        serve(listener, self.state).await
    }
}

/// Serve the worker API on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<NodeState>) -> Result<()> {
    axum::serve(listener, router(state))
        .await
        .context("Node service stopped")
}

pub fn router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/job", post(submit_job))
        .route("/job/:id", get(get_job).delete(delete_job))
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkerError::Busy { .. } | WorkerError::NotDeletable { .. } => StatusCode::CONFLICT,
            WorkerError::NotFound { .. } => StatusCode::NOT_FOUND,
            WorkerError::InvalidJob(_) => StatusCode::BAD_REQUEST,
        };
        error_response(status, self.to_string())
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { message })).into_response()
}

async fn submit_job(
    State(state): State<Arc<NodeState>>,
    body: Result<Json<JobInput>, JsonRejection>,
) -> Result<Json<JobIdResponse>, Response> {
    let Json(input) = body.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;
    let id = state.worker.submit(input).map_err(IntoResponse::into_response)?;
    Ok(Json(JobIdResponse { id }))
}

async fn get_job(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, WorkerError> {
    let record = state.worker.get(&id)?;
    Ok(Json(record.snapshot()))
}

async fn delete_job(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> Result<Json<JobIdResponse>, WorkerError> {
    let id = state.worker.delete(&id)?;
    Ok(Json(JobIdResponse { id }))
}

async fn get_status(State(state): State<Arc<NodeState>>) -> Json<StatusResponse> {
    let memory = MemorySnapshot::take()
        .map(|m| MemoryStatus {
            heap_used_mib: m.rss_mib(),
            heap_total_mib: m.vm_mib(),
        })
        .unwrap_or(MemoryStatus {
            heap_used_mib: 0.0,
            heap_total_mib: 0.0,
        });

    Json(StatusResponse {
        memory,
        node: state.node_id.clone(),
        current_job: state.worker.current_job(),
    })
}

/// Hostname of this node, or "unknown"
fn get_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, MockConnector};
    use crate::distributed::protocol::JobStatus;
    use crate::util::time::now_ms;
    use serde_json::{json, Value};
    use std::time::Duration;

    const ENDPOINT: &str = "http://shard-1";

    async fn start() -> String {
        let connector = MockConnector::new();
        connector.register(ENDPOINT, MockChain::new());
        let state = Arc::new(NodeState {
            worker: Arc::new(Worker::new(Arc::new(connector))),
            node_id: "test-node".to_string(),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));
        format!("http://{}", addr)
    }

    fn send_body(duration: u64) -> Value {
        json!({
            "type": "SEND",
            "config": {
                "duration": duration,
                "numberOfTransactions": 2,
                "chainEndpoint": ENDPOINT,
                "transactionOperation": {"type": "SET_VALUE", "ref": "/apps/bench", "value": 1},
                "timestamp": now_ms(),
            }
        })
    }

    #[tokio::test]
    async fn test_submit_poll_delete() {
        let base = start().await;
        let http = reqwest::Client::new();

        let response = http.post(format!("{base}/job")).json(&send_body(1)).send().await.unwrap();
        assert_eq!(response.status(), 200);
        let JobIdResponse { id } = response.json().await.unwrap();
        assert_eq!(id, 1);

        let mut snapshot: JobSnapshot;
        loop {
            snapshot = http
                .get(format!("{base}/job/{id}"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if snapshot.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(snapshot.status, JobStatus::Success);
        assert_eq!(snapshot.input["type"], "SEND");
        assert_eq!(snapshot.output["statistics"]["success"], 2);

        let response = http.delete(format!("{base}/job/{id}")).send().await.unwrap();
        assert_eq!(response.status(), 200);

        let snapshot: JobSnapshot = http
            .get(format!("{base}/job/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(snapshot.status, JobStatus::Delete);
        assert_eq!(snapshot.output, json!({}));
    }

    #[tokio::test]
    async fn test_busy_is_conflict() {
        let base = start().await;
        let http = reqwest::Client::new();

        let first = http.post(format!("{base}/job")).json(&send_body(3)).send().await.unwrap();
        assert_eq!(first.status(), 200);

        let second = http.post(format!("{base}/job")).json(&send_body(3)).send().await.unwrap();
        assert_eq!(second.status(), 409);
        let body: ErrorResponse = second.json().await.unwrap();
        assert_eq!(body.message, "Worker is busy now (job:1)");

        let status: StatusResponse = http
            .get(format!("{base}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.current_job, Some(1));
        assert_eq!(status.node, "test-node");
    }

    #[tokio::test]
    async fn test_error_responses() {
        let base = start().await;
        let http = reqwest::Client::new();

        let missing = http.get(format!("{base}/job/99")).send().await.unwrap();
        assert_eq!(missing.status(), 404);
        let body: ErrorResponse = missing.json().await.unwrap();
        assert_eq!(body.message, "Can't find 99");

        let invalid = http
            .post(format!("{base}/job"))
            .json(&json!({"type": "CONFIRM", "config": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(invalid.status(), 400);
        let body: ErrorResponse = invalid.json().await.unwrap();
        assert!(body.message.starts_with("Missing required config property"));

        let unknown = http
            .post(format!("{base}/job"))
            .json(&json!({"type": "MINE"}))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 400);
        assert!(unknown.json::<ErrorResponse>().await.is_ok());
    }

    #[test]
    fn test_worker_error_status_codes() {
        let busy = WorkerError::Busy { current: 1 }.into_response();
        assert_eq!(busy.status(), StatusCode::CONFLICT);

        let gone = WorkerError::NotFound { id: "x".into() }.into_response();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);

        let locked = WorkerError::NotDeletable {
            id: 1,
            status: JobStatus::Progress,
        }
        .into_response();
        assert_eq!(locked.status(), StatusCode::CONFLICT);
    }
}
