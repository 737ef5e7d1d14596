//! Cross-tool bridge comparison and corpus aggregation.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::HarnessLayout;
use crate::model::{
    ensure_unique_sanitized, BridgeSet, CanonicalBridge, PackageRef, PackageRefError,
};
use crate::services::bridge_file::{
    read_bridge_file, read_bridge_file_if_exists, BridgeFileError,
};
use crate::services::flows::{load_flow_file_if_exists, FlowError};

#[derive(Debug, Error)]
pub enum CompareError {
    #[error(transparent)]
    SanitizedCollision(#[from] PackageRefError),
    #[error(transparent)]
    BridgeFile(#[from] BridgeFileError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Per-package comparison of tool A's and tool B's bridge sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    pub package: String,
    pub total_a: usize,
    pub total_b: usize,
    pub in_both: usize,
    pub unique_to_a: Vec<CanonicalBridge>,
    pub unique_to_b: Vec<CanonicalBridge>,
    /// Equal cardinality and A ⊆ B.
    pub same: bool,
}

pub fn compare(pkg: &PackageRef, a: &BridgeSet, b: &BridgeSet) -> ComparisonResult {
    let unique_to_a: Vec<CanonicalBridge> = a.iter().filter(|x| !b.contains(x)).cloned().collect();
    let unique_to_b: Vec<CanonicalBridge> = b.iter().filter(|x| !a.contains(x)).cloned().collect();
    let same = a.len() == b.len() && unique_to_a.is_empty();
    ComparisonResult {
        package: pkg.raw_id(),
        total_a: a.len(),
        total_b: b.len(),
        in_both: a.len() - unique_to_a.len(),
        unique_to_a,
        unique_to_b,
        same,
    }
}

/// Manual-inspection priority; earlier variants rank first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriagePriority {
    /// A found nothing while B found bridges.
    ReferenceUnderReports,
    /// Neither tool found bridges, yet native calls were observed.
    BothMiss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageEntry {
    pub package: String,
    pub priority: TriagePriority,
    pub b_bridges: usize,
    pub observed_calls: u64,
}

impl TriageEntry {
    fn weight(&self) -> u64 {
        match self.priority {
            TriagePriority::ReferenceUnderReports => self.b_bridges as u64,
            TriagePriority::BothMiss => self.observed_calls,
        }
    }
}

/// A package where B found more bridges than A.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Difference {
    pub package: String,
    pub a: usize,
    pub b: usize,
    pub diffs: Vec<CanonicalBridge>,
}

/// Corpus-wide comparison statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusSummary {
    pub num_packages: usize,
    pub total_a: usize,
    pub total_b: usize,
    pub num_same: usize,
    /// Packages for which B produced a bridge file.
    pub num_b_present: usize,
    pub num_b_nonzero: usize,
    pub num_a_more: usize,
    pub num_b_more: usize,
    pub num_a_more_b_nonzero: usize,
    pub num_different: usize,
    pub packages: Vec<String>,
    pub packages_a_more: Vec<String>,
    pub packages_a_more_b_nonzero: Vec<String>,
    pub packages_different: Vec<String>,
    pub differences: Vec<Difference>,
    pub a_samples: Vec<usize>,
    pub b_samples: Vec<usize>,
    /// A file missing or empty; excluded from the statistics above.
    pub not_analyzable: Vec<String>,
    pub triage: Vec<TriageEntry>,
}

impl CorpusSummary {
    /// Fold one package into the summary. `observed_calls` is the total of its
    /// flow table (0 when there is none).
    pub fn add(
        &mut self,
        pkg: &PackageRef,
        a: Option<&BridgeSet>,
        b: Option<&BridgeSet>,
        observed_calls: u64,
    ) {
        let id = pkg.raw_id();
        let b_len = b.map_or(0, BridgeSet::len);

        let a = match a {
            Some(a) if !a.is_empty() => a,
            _ => {
                self.not_analyzable.push(id.clone());
                let priority = if b_len > 0 {
                    Some(TriagePriority::ReferenceUnderReports)
                } else if observed_calls > 0 {
                    Some(TriagePriority::BothMiss)
                } else {
                    None
                };
                if let Some(priority) = priority {
                    self.triage.push(TriageEntry {
                        package: id,
                        priority,
                        b_bridges: b_len,
                        observed_calls,
                    });
                }
                return;
            }
        };

        let empty = BridgeSet::new();
        let cmp = compare(pkg, a, b.unwrap_or(&empty));

        self.num_packages += 1;
        self.packages.push(id.clone());
        self.total_a += cmp.total_a;
        self.total_b += cmp.total_b;
        self.a_samples.push(cmp.total_a);
        self.b_samples.push(cmp.total_b);
        if b.is_some() {
            self.num_b_present += 1;
        }
        if cmp.total_b > 0 {
            self.num_b_nonzero += 1;
        }
        if cmp.same {
            self.num_same += 1;
        }
        if !cmp.unique_to_a.is_empty() {
            self.num_different += 1;
            self.packages_different.push(id.clone());
        }
        if cmp.total_a > cmp.total_b {
            self.num_a_more += 1;
            self.packages_a_more.push(id.clone());
            if cmp.total_b > 0 {
                self.num_a_more_b_nonzero += 1;
                self.packages_a_more_b_nonzero.push(id);
            }
        } else if cmp.total_b > cmp.total_a {
            self.num_b_more += 1;
            self.differences.push(Difference {
                package: id,
                a: cmp.total_a,
                b: cmp.total_b,
                diffs: cmp.unique_to_b,
            });
        }
    }

    /// Order triage by priority, then descending weight, then name.
    pub fn sort_triage(&mut self) {
        self.triage.sort_by(|x, y| {
            (x.priority, Reverse(x.weight()), &x.package).cmp(&(
                y.priority,
                Reverse(y.weight()),
                &y.package,
            ))
        });
    }

    /// Write sample and package-list side files into `dir`.
    pub fn write_side_files(&self, dir: &Path) -> Result<(), CompareError> {
        fs::create_dir_all(dir)
            .map_err(|source| CompareError::Io { path: dir.to_path_buf(), source })?;
        write_json(&dir.join("a_samples.json"), &self.a_samples)?;
        write_json(&dir.join("b_samples.json"), &self.b_samples)?;
        write_package_list(&dir.join("packages_a_more.csv"), &self.packages_a_more)?;
        write_package_list(
            &dir.join("packages_a_more_b_nonzero.csv"),
            &self.packages_a_more_b_nonzero,
        )?;
        write_package_list(&dir.join("packages_different_bridges.csv"), &self.packages_different)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CompareError> {
    let io_err = |source: io::Error| CompareError::Io { path: path.to_path_buf(), source };
    let body = serde_json::to_string_pretty(value).map_err(|e| io_err(e.into()))?;
    fs::write(path, body).map_err(io_err)
}

fn write_package_list(path: &Path, packages: &[String]) -> Result<(), CompareError> {
    let csv_err = |source| CompareError::Csv { path: path.to_path_buf(), source };
    let mut writer =
        csv::WriterBuilder::new().has_headers(false).from_path(path).map_err(csv_err)?;
    for pkg in packages {
        writer.write_record([pkg]).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| CompareError::Io { path: path.to_path_buf(), source })
}

/// Compares the bridge files of both tools across a corpus.
pub struct CorpusComparator<'a> {
    layout: &'a HarnessLayout,
}

impl<'a> CorpusComparator<'a> {
    pub fn new(layout: &'a HarnessLayout) -> Self {
        Self { layout }
    }

    pub fn run(&self, packages: &[PackageRef]) -> Result<CorpusSummary, CompareError> {
        ensure_unique_sanitized(packages)?;
        let mut summary = CorpusSummary::default();
        for pkg in packages {
            let a_path = self.layout.a_bridge_file(pkg);
            let b_path = self.layout.b_bridge_file(pkg);
            let a = read_bridge_file_if_exists(&a_path)?;
            let b = read_bridge_file_if_exists(&b_path)?;
            let observed_calls = load_flow_file_if_exists(&self.layout.flow_file(pkg))?
                .map_or(0, |flows| flows.total_calls());
            tracing::debug!(
                package = %pkg,
                a = ?a.as_ref().map(BridgeSet::len),
                b = ?b.as_ref().map(BridgeSet::len),
                observed_calls,
                "comparing"
            );
            summary.add(pkg, a.as_ref(), b.as_ref(), observed_calls);
        }
        summary.sort_triage();
        tracing::info!(
            packages = summary.num_packages,
            not_analyzable = summary.not_analyzable.len(),
            same = summary.num_same,
            "comparison finished"
        );
        Ok(summary)
    }
}

/// JS names mapped to more than one native function in `set`, one entry per
/// extra mapping.
pub fn find_js_name_clashes(set: &BridgeSet) -> Vec<String> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut clashes = Vec::new();
    for name in set.js_names() {
        let count = seen.entry(name).or_insert(0);
        if *count > 0 {
            clashes.push(name.to_string());
        }
        *count += 1;
    }
    clashes
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClashReport {
    pub packages_with_clash: Vec<String>,
    pub num_packages_with_clash: usize,
    pub all_clashes: usize,
    pub per_package: BTreeMap<String, Vec<String>>,
}

impl ClashReport {
    pub fn add(&mut self, package: &str, clashes: Vec<String>) {
        if !clashes.is_empty() {
            self.packages_with_clash.push(package.to_string());
            self.num_packages_with_clash += 1;
            self.all_clashes += clashes.len();
        }
        self.per_package.insert(package.to_string(), clashes);
    }

    /// Scan every `*.txt` bridge file under `dir` (recursively).
    pub fn scan_dir(dir: &Path) -> Result<Self, CompareError> {
        let mut files = Vec::new();
        collect_bridge_files(dir, &mut files)?;
        files.sort();

        let mut report = ClashReport::default();
        for path in files {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            tracing::debug!(path = %path.display(), "scanning for clashes");
            let set = read_bridge_file(&path)?;
            report.add(stem, find_js_name_clashes(&set));
        }
        Ok(report)
    }
}

fn collect_bridge_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CompareError> {
    let io_err = |source| CompareError::Io { path: dir.to_path_buf(), source };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_bridge_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "txt") {
            out.push(path);
        }
    }
    Ok(())
}
