//! shardbench - distributed blockchain benchmark harness
//!
//! shardbench measures transaction throughput (TPS), query throughput (QPS)
//! and cross-shard finalization latency of a sharded blockchain network. One
//! coordinator drives any number of worker nodes; every worker runs one job
//! at a time against the shard endpoint it is assigned.
//!
//! # Architecture
//!
//! - **Coordinator**: builds per-shard tests, dispatches each phase's jobs,
//!   polls them to completion, aggregates and writes results
//! - **Worker**: HTTP job API over a single-job slot
//! - **Job strategies**: SEND, CONFIRM, CROSS_SHARD_TEST and CALL
//! - **Chain client**: JSON-RPC transport to a chain endpoint, plus an
//!   in-memory mock chain for tests
//! - **Round matching**: rebuilds global time rounds from independently
//!   timed shards for cross-shard latency

pub mod chain;
pub mod config;
pub mod distributed;
pub mod job;
pub mod output;
pub mod stats;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::BenchmarkConfig;
pub use worker::Worker;

/// Result type used throughout shardbench
pub type Result<T> = anyhow::Result<T>;
