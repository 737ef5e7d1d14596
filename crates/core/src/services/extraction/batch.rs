use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::db::{ExtractionRunRecord, RunStatus};
use crate::model::{ensure_unique_sanitized, PackageRef, PackageRefError};
use crate::services::extraction::driver::{ExtractOutcome, Extractor};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Corpus(#[from] PackageRefError),
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Terminal result for one package of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageResult {
    pub status: RunStatus,
    pub rebuilt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridges: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

impl PackageResult {
    pub fn to_record(&self, pkg: &PackageRef) -> ExtractionRunRecord {
        ExtractionRunRecord {
            package: pkg.raw_id(),
            sanitized: pkg.sanitized_id(),
            status: self.status,
            rebuilt: self.rebuilt,
            bridges: self.bridges.map(|n| n as u32),
            error: self.error.clone(),
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
        }
    }
}

/// Merged results of a batch, keyed by raw package id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub per_package: BTreeMap<String, PackageResult>,
}

impl BatchSummary {
    pub fn count(&self, status: RunStatus) -> usize {
        self.per_package.values().filter(|r| r.status == status).count()
    }

    pub fn failed_packages(&self) -> Vec<&str> {
        self.per_package
            .iter()
            .filter(|(_, r)| r.status == RunStatus::Failed)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

/// Run one package through the extractor and classify the outcome.
pub fn extract_one(extractor: &Extractor<'_>, pkg: &PackageRef, force: bool) -> PackageResult {
    let started_at = Utc::now().to_rfc3339();
    let outcome = extractor.extract(pkg, force);
    let finished_at = Utc::now().to_rfc3339();
    match outcome {
        Ok(ExtractOutcome::Extracted(report)) => PackageResult {
            status: RunStatus::Ok,
            rebuilt: report.rebuilt,
            bridges: Some(report.bridges),
            error: None,
            started_at,
            finished_at,
        },
        Ok(ExtractOutcome::Skipped) => PackageResult {
            status: RunStatus::Skipped,
            rebuilt: false,
            bridges: None,
            error: None,
            started_at,
            finished_at,
        },
        Err(e) => PackageResult {
            status: RunStatus::Failed,
            rebuilt: false,
            bridges: None,
            error: Some(e.to_string()),
            started_at,
            finished_at,
        },
    }
}

/// Extract every package on a pool of `workers` threads.
///
/// Each package owns its install dir, artifact dir and bridge file, so workers
/// share nothing; results are merged only after the pool has drained.
/// Bridge files are keyed by package name, so only the first entry per name is
/// processed. Sanitized-name collisions reject the batch.
pub fn extract_batch(
    extractor: &Extractor<'_>,
    packages: &[PackageRef],
    force: bool,
    workers: usize,
) -> Result<BatchSummary, BatchError> {
    let mut seen = BTreeSet::new();
    let unique: Vec<&PackageRef> = packages
        .iter()
        .filter(|p| {
            let fresh = seen.insert(p.name.clone());
            if !fresh {
                tracing::warn!(package = %p, "package already queued, processing once");
            }
            fresh
        })
        .collect();
    let owned: Vec<PackageRef> = unique.iter().map(|p| (*p).clone()).collect();
    ensure_unique_sanitized(&owned)?;

    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers.max(1)).build()?;
    tracing::info!(packages = unique.len(), workers, "starting extraction batch");
    let per_package: BTreeMap<String, PackageResult> = pool.install(|| {
        unique.par_iter().map(|pkg| (pkg.raw_id(), extract_one(extractor, pkg, force))).collect()
    });

    Ok(BatchSummary { per_package })
}
