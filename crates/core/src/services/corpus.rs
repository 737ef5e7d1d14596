//! Package list loading.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{PackageRef, PackageRefError};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Failed to read package list {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Bad package on line {line} of {path}: {source}")]
    Package {
        path: PathBuf,
        line: u64,
        #[source]
        source: PackageRefError,
    },
}

/// Read `name[:version]` ids from the first column of a header-less CSV.
///
/// Blank rows are skipped; extra columns are ignored.
pub fn load_package_list(path: &Path) -> Result<Vec<PackageRef>, CorpusError> {
    let csv_err = |source| CorpusError::Csv { path: path.to_path_buf(), source };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut packages = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let Some(first) = record.get(0).filter(|f| !f.is_empty()) else { continue };
        let line = record.position().map_or(0, |p| p.line());
        let pkg = PackageRef::parse(first).map_err(|source| CorpusError::Package {
            path: path.to_path_buf(),
            line,
            source,
        })?;
        packages.push(pkg);
    }
    tracing::debug!(path = %path.display(), packages = packages.len(), "loaded package list");
    Ok(packages)
}
