use std::path::Path;

use anyhow::{anyhow, Context, Result};
use bridgecheck_core::config::HarnessConfig;
use bridgecheck_core::db::{RunDb, RunStatus};

pub fn validate_run_status(status: &str) -> Result<RunStatus> {
    RunStatus::parse(status)
        .ok_or_else(|| anyhow!("Invalid status '{status}'. Allowed: ok, skipped, failed"))
}

/// List recorded extraction runs.
pub fn runs_command(config: &HarnessConfig, status: Option<&str>, json: bool) -> Result<()> {
    let status = status.map(validate_run_status).transpose()?;
    let layout = config.layout();
    if !layout.db_path.exists() {
        println!("No runs recorded yet ({} does not exist).", layout.db_path.display());
        return Ok(());
    }
    let db = RunDb::open(&layout.db_path)
        .with_context(|| format!("Failed to open run ledger at {}", layout.db_path.display()))?;
    let runs = db.list_extraction_runs(status).context("Failed to list extraction runs")?;

    if json {
        let serialized =
            serde_json::to_string_pretty(&runs).context("Failed to serialize runs to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Extraction runs ({}):", runs.len());
    if runs.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for run in runs {
        let bridges = run.bridges.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
        let rebuilt = if run.rebuilt { " rebuilt" } else { "" };
        match run.error {
            Some(err) => println!("  - {} [{}{}] - {}", run.package, run.status, rebuilt, err),
            None => println!(
                "  - {} [{}{}] bridges={} at {}",
                run.package, run.status, rebuilt, bridges, run.finished_at
            ),
        }
    }
    Ok(())
}

/// Print the effective configuration and the derived layout.
pub fn show_config_command(config: &HarnessConfig) -> Result<()> {
    let layout = config.layout();
    let serialized =
        serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("Configuration:");
    println!("{serialized}");
    println!();
    println!("Layout:");
    print_dir_status("Data root", &layout.root);
    print_dir_status("Install dir", &layout.install_dir);
    print_dir_status("Artifacts dir", &layout.artifacts_dir);
    print_dir_status(&format!("{} bridges", config.labels.a), &layout.a_bridges_dir);
    print_dir_status(&format!("{} bridges", config.labels.b), &layout.b_bridges_dir);
    print_dir_status("Flows dir", &layout.flows_dir);
    print_dir_status("Temp dir", &layout.temp_dir);
    println!("- Run ledger: {}", layout.db_path.display());
    Ok(())
}

fn print_dir_status(label: &str, path: &Path) {
    let exists = path.is_dir();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}
