//! Result output
//!
//! - [`text`]: console reports printed while a run progresses
//! - [`json`]: the result directory (`result.json`, per-shard JSONL dumps,
//!   per-round summaries)

pub mod json;
pub mod text;
