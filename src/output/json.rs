//! JSON output formatting
//!
//! A run writes everything under one result directory:
//!
//! ```text
//! result_10-16_14:03:27/
//! ├── result.json            run summary + testList
//! ├── s01/transactions.jsonl one transaction per line, per shard
//! ├── s02/transactions.jsonl
//! ├── r01/result.json        cross-shard round 1
//! └── r02/result.json
//! ```

use crate::distributed::coordinator::Test;
use crate::stats::rounds::Round;
use crate::stats::RunSummary;
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// `result_MM-DD_HH:mm:ss` in the current directory
pub fn default_output_dir() -> PathBuf {
    PathBuf::from(format!("result_{}", chrono::Local::now().format("%m-%d_%H:%M:%S")))
}

/// Create the result directory if it does not exist
pub fn init_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

/// `sNN` directory of shard `index` (0-based)
pub fn shard_dir(root: &Path, index: usize) -> PathBuf {
    root.join(format!("s{:02}", index + 1))
}

/// `rNN` directory of round `index` (0-based)
pub fn round_dir(root: &Path, index: usize) -> PathBuf {
    root.join(format!("r{:02}", index + 1))
}

/// Write a value as pretty-printed JSON
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Write one compact JSON document per line, returns the line count
pub fn write_jsonl_file<T: Serialize>(path: &Path, items: &[T]) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut writer, item)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(items.len())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResult<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    test_list: &'a [Test],
}

/// `result.json`: the summary fields plus the full test list
pub fn write_run_result(root: &Path, summary: &RunSummary, tests: &[Test]) -> Result<PathBuf> {
    let path = root.join("result.json");
    write_json_file(&path, &RunResult { summary, test_list: tests })?;
    Ok(path)
}

/// `sNN/transactions.jsonl` for shard `index`
pub fn write_shard_transactions<T: Serialize>(root: &Path, index: usize, transactions: &[T]) -> Result<PathBuf> {
    let dir = shard_dir(root, index);
    init_output_dir(&dir)?;
    let path = dir.join("transactions.jsonl");
    write_jsonl_file(&path, transactions)?;
    Ok(path)
}

/// `rNN/result.json` for every round
pub fn write_round_results(root: &Path, rounds: &[Round]) -> Result<()> {
    for (index, round) in rounds.iter().enumerate() {
        let dir = round_dir(root, index);
        init_output_dir(&dir)?;
        write_json_file(&dir.join("result.json"), round)?;
    }
    Ok(())
}
