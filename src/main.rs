//! shardbench CLI entry point

use anyhow::{Context, Result};
use shardbench::chain::json_rpc::JsonRpcConnector;
use shardbench::config::cli::{Cli, ExecutionMode};
use shardbench::config::file::parse_config_file;
use shardbench::distributed::{Coordinator, CoordinatorOptions, NodeService};
use shardbench::output::json::default_output_dir;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);
    cli.validate()?;

    match cli.mode {
        ExecutionMode::Worker => run_worker(cli),
        ExecutionMode::Coordinator => run_coordinator(cli),
    }
}

/// `RUST_LOG` wins; otherwise info, or debug for this crate with `--debug`
fn init_logging(debug: bool) {
    let default = if debug {
        "shardbench=debug,info"
    } else {
        "shardbench=info,info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

/// Run in worker mode (job API on this node)
fn run_worker(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let connector = JsonRpcConnector::new(Duration::from_secs(cli.rpc_timeout_secs));
        let service = NodeService::new(cli.listen_port, Arc::new(connector));
        service.run().await
    })
}

/// Run in coordinator mode (distributed orchestration)
fn run_coordinator(cli: Cli) -> Result<()> {
    let path = cli
        .config
        .as_ref()
        .context("coordinator mode requires a benchmark config file")?;
    let mut config = parse_config_file(path)?;
    cli.apply_overrides(&mut config);

    let options = CoordinatorOptions {
        output_dir: cli.output_dir.clone().unwrap_or_else(default_output_dir),
        debug: cli.debug,
    };

    println!("shardbench v{}", env!("CARGO_PKG_VERSION"));
    println!("Config: {}", path.display());
    println!();

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    let report = runtime.block_on(async {
        let coordinator = Coordinator::new(config, options)?;
        coordinator.run().await
    })?;

    println!("Results written to: {}", report.output_dir.display());
    Ok(())
}
