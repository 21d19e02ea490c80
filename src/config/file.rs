//! Benchmark config file parsing
//!
//! Files ending in `.toml` are read as TOML, everything else as JSON.

use super::BenchmarkConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse a benchmark config file
pub fn parse_config_file(path: &Path) -> Result<BenchmarkConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let parsed = if is_toml {
        parse_toml_string(&contents)
    } else {
        parse_json_string(&contents)
    };
    parsed.with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse a JSON benchmark config
pub fn parse_json_string(contents: &str) -> Result<BenchmarkConfig> {
    serde_json::from_str(contents).context("Failed to parse JSON configuration")
}

/// Parse a TOML benchmark config
pub fn parse_toml_string(contents: &str) -> Result<BenchmarkConfig> {
    toml::from_str(contents).context("Failed to parse TOML configuration")
}
