//! Distributed mode implementation
//!
//! # Architecture
//!
//! shardbench uses a coordinator-worker architecture:
//!
//! - **Coordinator**: builds the test list, dispatches jobs phase by phase,
//!   polls workers and aggregates results
//! - **Node Service**: the worker's HTTP API over its single job slot
//!
//! # Modules
//!
//! - `protocol`: request/response bodies and job status codes
//! - `client`: coordinator side HTTP client for the worker API
//! - `node_service`: worker side HTTP service
//! - `coordinator`: test list, dispatch/poll pipeline, cleanup

pub mod client;
pub mod coordinator;
pub mod node_service;
pub mod protocol;

// Re-export key types
pub use protocol::{JobInput, JobSnapshot, JobStatus, JobType, StatusResponse};

pub use client::WorkerClient;
pub use coordinator::{Coordinator, CoordinatorOptions, RunReport};
pub use node_service::NodeService;
