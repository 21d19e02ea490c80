//! HTTP client for the worker API
//!
//! Used by the coordinator to submit, poll and delete jobs. Every request
//! carries a 30 second timeout. A non-2xx answer becomes
//! [`RequestError::Status`] with the message
//! `status: <code>, data: <body>`.

use crate::distributed::protocol::{JobIdResponse, JobSnapshot, StatusResponse};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("status: {status}, data: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

impl RequestError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Status { status, .. } => StatusCode::from_u16(*status).ok(),
            RequestError::Transport(e) => e.status(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
}

impl WorkerClient {
    pub fn new(timeout: Duration) -> Result<Self, RequestError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// `POST /job`, returns the job id
    ///
    /// `input` is a [`JobInput`](crate::distributed::protocol::JobInput) or its JSON form.
    pub async fn submit<B: Serialize + ?Sized>(
        &self,
        worker_url: &str,
        input: &B,
    ) -> Result<u64, RequestError> {
        let response: JobIdResponse = self
            .request(Method::POST, worker_url, "/job", Some(input))
            .await?;
        Ok(response.id)
    }

    /// `GET /job/:id`
    pub async fn poll(&self, worker_url: &str, id: u64) -> Result<JobSnapshot, RequestError> {
        self.request::<(), _>(Method::GET, worker_url, &format!("/job/{}", id), None)
            .await
    }

    /// `DELETE /job/:id`
    pub async fn delete(&self, worker_url: &str, id: u64) -> Result<u64, RequestError> {
        let response: JobIdResponse = self
            .request::<(), _>(Method::DELETE, worker_url, &format!("/job/{}", id), None)
            .await?;
        Ok(response.id)
    }

    /// `GET /status`
    pub async fn status(&self, worker_url: &str) -> Result<StatusResponse, RequestError> {
        self.request::<(), _>(Method::GET, worker_url, "/status", None)
            .await
    }

    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        worker_url: &str,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, RequestError> {
        let url = format!("{}{}", worker_url.trim_end_matches('/'), path);
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
