//! CLI argument parsing using clap

use super::BenchmarkConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Coordinator mode - drive the workers listed in a benchmark config
    Coordinator,
    /// Worker mode - run the job API on this node (accepts coordinator jobs)
    Worker,
}

/// shardbench - distributed TPS/QPS and cross-shard benchmark
#[derive(Parser, Debug)]
#[command(name = "shardbench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: coordinator or worker
    #[arg(long, value_enum, default_value = "coordinator")]
    pub mode: ExecutionMode,

    /// Benchmark config file (JSON, or TOML with a .toml extension)
    ///
    /// Not required in worker mode (the coordinator sends job configs)
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the worker to listen on (worker mode only)
    #[arg(long, env = "PORT", default_value = "3000")]
    pub listen_port: u16,

    /// Timeout for each chain RPC call in seconds (worker mode only)
    #[arg(long, default_value = "60")]
    pub rpc_timeout_secs: u64,

    /// Result directory (default: result_MM-DD_HH:mm:ss)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Seconds between job status polls (overrides pollIntervalSecs)
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Seconds before a running job is given up as failed (overrides jobTimeoutSecs)
    #[arg(long)]
    pub job_timeout_secs: Option<u64>,

    /// Debug logging; also keeps finished jobs on the workers
    #[arg(long, env = "SHARDBENCH_DEBUG")]
    pub debug: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        // Worker mode doesn't need a config (coordinator sends jobs)
        if self.mode == ExecutionMode::Worker {
            if self.rpc_timeout_secs == 0 {
                anyhow::bail!("rpc_timeout_secs must be at least 1");
            }
            return Ok(());
        }

        if self.config.is_none() {
            anyhow::bail!("coordinator mode requires a benchmark config file");
        }
        if self.poll_interval_secs == Some(0) {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if self.job_timeout_secs == Some(0) {
            anyhow::bail!("job_timeout_secs must be at least 1");
        }

        Ok(())
    }

    /// Apply CLI overrides to a loaded config (CLI takes precedence)
    pub fn apply_overrides(&self, config: &mut BenchmarkConfig) {
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
        if let Some(secs) = self.job_timeout_secs {
            config.job_timeout_secs = secs;
        }
    }
}
