use std::path::Path;

use anyhow::{Context, Result};
use bridgecheck_core::config::HarnessConfig;
use bridgecheck_core::services::compare::{ClashReport, CorpusComparator};
use bridgecheck_core::services::corpus::load_package_list;
use bridgecheck_core::services::flows::compare_flow_corpus;

use crate::{canonicalize_or_current, emit_json, require_input};

/// Compare both tools' bridge files for every package in `--input`.
///
/// Sample and package-list side files land next to `--output` (or in the
/// current directory).
pub fn compare_command(
    config: &HarnessConfig,
    input: Option<&str>,
    output: Option<&str>,
) -> Result<()> {
    let input = require_input(input)?;
    let packages = load_package_list(&input)?;
    let layout = config.layout();
    tracing::info!(
        a = %layout.a_bridges_dir.display(),
        b = %layout.b_bridges_dir.display(),
        "comparing bridge directories"
    );

    let summary = CorpusComparator::new(&layout)
        .run(&packages)
        .context("Failed to compare bridge sets")?;

    let side_dir = match output {
        Some(out) => canonicalize_or_current(out)?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        None => canonicalize_or_current(".")?,
    };
    summary.write_side_files(&side_dir).context("Failed to write comparison side files")?;
    emit_json(&summary, output)
}

/// Classify observed dynamic call sites against both tools' bridges.
pub fn compare_flows_command(
    config: &HarnessConfig,
    input: Option<&str>,
    output: Option<&str>,
) -> Result<()> {
    let input = require_input(input)?;
    let packages = load_package_list(&input)?;
    let layout = config.layout();
    let summary = compare_flow_corpus(&layout, &packages).context("Failed to compare flows")?;
    tracing::info!(
        packages = summary.num_packages,
        missing_flows = summary.missing_flows.len(),
        "flow comparison finished"
    );
    emit_json(&summary, output)
}

/// Report js names bound to more than one native function.
pub fn clashes_command(
    config: &HarnessConfig,
    bridges_dir: Option<&str>,
    output: Option<&str>,
) -> Result<()> {
    let dir = match bridges_dir {
        Some(dir) => canonicalize_or_current(dir)?,
        None => config.layout().a_bridges_dir,
    };
    let report = ClashReport::scan_dir(&dir)
        .with_context(|| format!("Failed to scan bridge directory {}", dir.display()))?;
    tracing::info!(
        packages_with_clash = report.num_packages_with_clash,
        all_clashes = report.all_clashes,
        "clash scan finished"
    );
    emit_json(&report, output)
}
