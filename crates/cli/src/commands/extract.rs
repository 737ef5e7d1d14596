use std::fs;

use anyhow::{bail, Context, Result};
use bridgecheck_core::config::HarnessConfig;
use bridgecheck_core::db::{RunDb, RunStatus};
use bridgecheck_core::model::PackageRef;
use bridgecheck_core::services::corpus::load_package_list;
use bridgecheck_core::services::extraction::{
    extract_batch, extract_one, BatchSummary, Extractor, PackageResult,
};
use bridgecheck_core::services::process::SystemRunner;
use serde::Serialize;

use crate::{emit_json, require_input, sha256_file};

/// Results file written by batch extraction.
#[derive(Debug, Serialize)]
pub struct ExtractResults {
    pub generated_at: String,
    pub input_sha256: String,
    pub num_packages: usize,
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
    pub per_package: std::collections::BTreeMap<String, PackageResult>,
}

impl ExtractResults {
    fn new(summary: BatchSummary, input_sha256: String) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            input_sha256,
            num_packages: summary.per_package.len(),
            ok: summary.count(RunStatus::Ok),
            skipped: summary.count(RunStatus::Skipped),
            failed: summary.count(RunStatus::Failed),
            per_package: summary.per_package,
        }
    }
}

fn open_run_db(config: &HarnessConfig) -> Result<RunDb> {
    let layout = config.layout();
    fs::create_dir_all(&layout.meta_dir).with_context(|| {
        format!("Failed to create metadata directory {}", layout.meta_dir.display())
    })?;
    RunDb::open(&layout.db_path)
        .with_context(|| format!("Failed to open run ledger at {}", layout.db_path.display()))
}

fn record_run(db: &RunDb, pkg: &PackageRef, result: &PackageResult) -> Result<()> {
    db.insert_extraction_run(&result.to_record(pkg))
        .with_context(|| format!("Failed to record extraction run of {pkg}"))?;
    Ok(())
}

/// Extract bridges for one package (`--package`) or every package in `--input`.
pub fn extract_command(
    config: &HarnessConfig,
    input: Option<&str>,
    package: Option<&str>,
    always: bool,
    workers: Option<usize>,
    output: Option<&str>,
) -> Result<()> {
    let layout = config.layout();
    let runner = SystemRunner::with_temp_dir(&layout.temp_dir);
    let extractor = Extractor::new(config, &layout, &runner);
    let db = open_run_db(config)?;

    if let Some(raw) = package {
        let pkg = PackageRef::parse(raw).with_context(|| format!("Invalid package '{raw}'"))?;
        let result = extract_one(&extractor, &pkg, always);
        record_run(&db, &pkg, &result)?;
        match result.status {
            RunStatus::Ok => println!("{pkg}: {} bridges", result.bridges.unwrap_or_default()),
            RunStatus::Skipped => println!("{pkg}: skipped (bridges already exist)"),
            RunStatus::Failed => {
                bail!("Extraction of {pkg} failed: {}", result.error.unwrap_or_default())
            }
        }
        return Ok(());
    }

    let input = require_input(input)?;
    let packages = load_package_list(&input)?;
    let input_sha256 = sha256_file(&input)?;
    let workers = workers.unwrap_or(config.workers);

    let summary = extract_batch(&extractor, &packages, always, workers)
        .context("Failed to run extraction batch")?;
    for (raw, result) in &summary.per_package {
        let pkg = PackageRef::parse(raw).with_context(|| format!("Invalid package '{raw}'"))?;
        record_run(&db, &pkg, result)?;
    }
    for failed in summary.failed_packages() {
        tracing::warn!(package = failed, "extraction failed");
    }

    let results = ExtractResults::new(summary, input_sha256);
    tracing::info!(
        packages = results.num_packages,
        ok = results.ok,
        skipped = results.skipped,
        failed = results.failed,
        "extraction finished"
    );
    emit_json(&results, output)
}
