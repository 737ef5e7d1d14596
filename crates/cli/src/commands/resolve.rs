use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use bridgecheck_core::config::HarnessConfig;
use bridgecheck_core::services::oracle::{parse_address_list, Oracle};
use bridgecheck_core::services::process::SystemRunner;

use crate::{emit_json, require_input};

/// Resolve the addresses listed in `--input` inside process `pid`.
pub fn resolve_symbols_command(
    config: &HarnessConfig,
    input: Option<&str>,
    pid: u32,
    output: Option<&str>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let input = require_input(input)?;
    let body = fs::read_to_string(&input)
        .with_context(|| format!("Failed to read address list {}", input.display()))?;
    let addresses = parse_address_list(&body)
        .with_context(|| format!("Failed to parse address list {}", input.display()))?;
    tracing::info!(addresses = addresses.len(), pid, "resolving addresses");

    let layout = config.layout();
    let runner = SystemRunner::with_temp_dir(&layout.temp_dir);
    let oracle = Oracle::new(&config.tools, &runner).with_temp_dir(&layout.temp_dir);
    let resolution = oracle
        .resolve_symbols(&addresses, pid, timeout_secs.map(Duration::from_secs))
        .context("Symbol resolution failed")?;

    emit_json(&resolution.to_output_json(), output)
}
