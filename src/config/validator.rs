//! Configuration validation

use super::*;
use crate::job::cross_shard::MAX_ROUNDS;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &BenchmarkConfig) -> Result<()> {
    if config.duration == 0 {
        anyhow::bail!("duration must be greater than 0");
    }
    validate_targets(&config.target_list)?;

    match config.test_type() {
        TestType::Tps => validate_tps(config)?,
        TestType::Qps => validate_qps(config)?,
        TestType::CrossShard => validate_cross_shard(config)?,
    }

    if config.poll_interval_secs == 0 {
        anyhow::bail!("pollIntervalSecs must be greater than 0");
    }

    if let Some(monitoring) = &config.monitoring {
        if monitoring.enable && !monitoring.is_complete() {
            warn!("Invalid monitoring config: projectId, instanceName and keyFilename are required");
        }
    }

    Ok(())
}

/// Validate the target list
pub fn validate_targets(targets: &[TargetConfig]) -> Result<()> {
    if targets.is_empty() {
        anyhow::bail!("targetList must contain at least one target");
    }

    for (i, target) in targets.iter().enumerate() {
        if target.worker_url.trim().is_empty() {
            anyhow::bail!("targetList[{}]: workerUrl is required", i);
        }
        if target.chain_endpoint.trim().is_empty() {
            anyhow::bail!("targetList[{}]: chainEndpoint is required", i);
        }
    }

    Ok(())
}

fn validate_tps(config: &BenchmarkConfig) -> Result<()> {
    require_positive(config.number_of_transactions, "numberOfTransactions")?;

    for (i, target) in config.target_list.iter().enumerate() {
        if target.transaction_operation.is_none() {
            anyhow::bail!("targetList[{}]: transactionOperation is required", i);
        }
        if target.operation_ref().is_none() {
            anyhow::bail!("targetList[{}]: transactionOperation.ref is required", i);
        }
    }
    Ok(())
}

fn validate_qps(config: &BenchmarkConfig) -> Result<()> {
    require_positive(config.number_of_calls, "numberOfCalls")
}

fn validate_cross_shard(config: &BenchmarkConfig) -> Result<()> {
    require_positive(config.number_of_transactions, "numberOfTransactions")?;

    if config.target_list.len() > MAX_ROUNDS as usize {
        anyhow::bail!(
            "CROSS_SHARD supports at most {} targets, got {}",
            MAX_ROUNDS,
            config.target_list.len()
        );
    }
    Ok(())
}

fn require_positive(value: Option<u64>, name: &str) -> Result<()> {
    match value {
        Some(0) | None => anyhow::bail!("{} must be greater than 0", name),
        Some(_) => Ok(()),
    }
}
