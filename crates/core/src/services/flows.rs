//! Dynamic flow tables and their reconciliation against bridge sets.
//!
//! A flow file (`<package>_nomit.txt`) lists one observed JS-to-native call per
//! line. JS-side lines mention a `.js` location and carry the call-site name in
//! the first comma field; native-side lines carry it in the fourth.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::HarnessLayout;
use crate::model::{ensure_unique_sanitized, BridgeSet, PackageRef, PackageRefError};
use crate::services::bridge_file::{read_bridge_file_if_exists, BridgeFileError};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("I/O error on flow file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    BridgeFile(#[from] BridgeFileError),
    #[error(transparent)]
    Corpus(#[from] PackageRefError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    Js,
    Native,
}

/// A dynamically observed call site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CallSite {
    pub kind: SiteKind,
    pub name: String,
}

impl CallSite {
    pub fn js(name: impl Into<String>) -> Self {
        Self { kind: SiteKind::Js, name: name.into() }
    }

    pub fn native(name: impl Into<String>) -> Self {
        Self { kind: SiteKind::Native, name: name.into() }
    }
}

/// Occurrence counts of observed call sites for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowTable {
    sites: BTreeMap<CallSite, u64>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, site: CallSite) {
        self.record_n(site, 1);
    }

    pub fn record_n(&mut self, site: CallSite, count: u64) {
        *self.sites.entry(site).or_insert(0) += count;
    }

    pub fn count(&self, site: &CallSite) -> u64 {
        self.sites.get(site).copied().unwrap_or(0)
    }

    /// Distinct call sites.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Sum of all occurrences.
    pub fn total_calls(&self) -> u64 {
        self.sites.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CallSite, u64)> {
        self.sites.iter().map(|(site, &count)| (site, count))
    }
}

/// Parse one flow line. Blank or short lines yield `None`.
pub fn parse_flow_line(line: &str) -> Option<CallSite> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let site = if line.contains(".js") {
        let first = line.split(',').next()?;
        CallSite::js(first.trim_start_matches('(').trim())
    } else {
        CallSite::native(line.split(',').nth(3)?.trim())
    };
    (!site.name.is_empty()).then_some(site)
}

pub fn load_flow_file(path: &Path) -> Result<FlowTable, FlowError> {
    let body = fs::read_to_string(path)
        .map_err(|source| FlowError::Io { path: path.to_path_buf(), source })?;
    let mut table = FlowTable::new();
    for line in body.lines() {
        match parse_flow_line(line) {
            Some(site) => table.record(site),
            None => tracing::debug!(path = %path.display(), %line, "skipping flow line"),
        }
    }
    Ok(table)
}

/// Like [`load_flow_file`], but a missing file is `Ok(None)`.
pub fn load_flow_file_if_exists(path: &Path) -> Result<Option<FlowTable>, FlowError> {
    if !path.is_file() {
        return Ok(None);
    }
    load_flow_file(path).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowCategory {
    FoundByBoth,
    FoundByA,
    FoundByB,
    FoundByNeither,
}

impl FlowCategory {
    pub const ALL: [FlowCategory; 4] = [
        FlowCategory::FoundByBoth,
        FlowCategory::FoundByA,
        FlowCategory::FoundByB,
        FlowCategory::FoundByNeither,
    ];

    fn from_hits(a: bool, b: bool) -> Self {
        match (a, b) {
            (true, true) => FlowCategory::FoundByBoth,
            (true, false) => FlowCategory::FoundByA,
            (false, true) => FlowCategory::FoundByB,
            (false, false) => FlowCategory::FoundByNeither,
        }
    }
}

/// Sites of one category, counted distinctly and by occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTally {
    pub sites: usize,
    pub calls: u64,
}

impl CategoryTally {
    fn add(&mut self, other: &CategoryTally) {
        self.sites += other.sites;
        self.calls += other.calls;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowComparison {
    pub package: String,
    pub found_by_both: Vec<CallSite>,
    pub found_by_a: Vec<CallSite>,
    pub found_by_b: Vec<CallSite>,
    pub found_by_neither: Vec<CallSite>,
    pub tallies: BTreeMap<FlowCategory, CategoryTally>,
}

impl FlowComparison {
    pub fn sites(&self, category: FlowCategory) -> &[CallSite] {
        match category {
            FlowCategory::FoundByBoth => &self.found_by_both,
            FlowCategory::FoundByA => &self.found_by_a,
            FlowCategory::FoundByB => &self.found_by_b,
            FlowCategory::FoundByNeither => &self.found_by_neither,
        }
    }

    pub fn tally(&self, category: FlowCategory) -> CategoryTally {
        self.tallies.get(&category).cloned().unwrap_or_default()
    }

    fn push(&mut self, category: FlowCategory, site: CallSite, calls: u64) {
        let tally = self.tallies.entry(category).or_default();
        tally.sites += 1;
        tally.calls += calls;
        match category {
            FlowCategory::FoundByBoth => self.found_by_both.push(site),
            FlowCategory::FoundByA => self.found_by_a.push(site),
            FlowCategory::FoundByB => self.found_by_b.push(site),
            FlowCategory::FoundByNeither => self.found_by_neither.push(site),
        }
    }
}

/// Does `set` cover `site`? Observed names may carry extra qualification, so
/// any non-empty canonical name contained in the site name counts.
fn finds(set: &BridgeSet, site: &CallSite) -> bool {
    let contains = |name: &str| !name.is_empty() && site.name.contains(name);
    match site.kind {
        SiteKind::Js => set.js_names().any(contains),
        SiteKind::Native => set.c_functions().any(contains),
    }
}

/// Classify every observed call site of `pkg` into exactly one category.
pub fn compare_flows(
    pkg: &PackageRef,
    flows: &FlowTable,
    a: &BridgeSet,
    b: &BridgeSet,
) -> FlowComparison {
    let mut out = FlowComparison { package: pkg.raw_id(), ..FlowComparison::default() };
    for category in FlowCategory::ALL {
        out.tallies.insert(category, CategoryTally::default());
    }
    for (site, calls) in flows.iter() {
        let category = FlowCategory::from_hits(finds(a, site), finds(b, site));
        out.push(category, site.clone(), calls);
    }
    out
}

/// Flow reconciliation over a corpus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowCorpusSummary {
    pub num_packages: usize,
    pub totals: BTreeMap<FlowCategory, CategoryTally>,
    /// Packages with no flow file.
    pub missing_flows: Vec<String>,
    pub per_package: BTreeMap<String, FlowComparison>,
}

/// Compare flow tables against both tools' bridge files for every package.
///
/// A missing bridge file counts as an empty set.
pub fn compare_flow_corpus(
    layout: &HarnessLayout,
    packages: &[PackageRef],
) -> Result<FlowCorpusSummary, FlowError> {
    ensure_unique_sanitized(packages)?;
    let mut summary = FlowCorpusSummary::default();
    for category in FlowCategory::ALL {
        summary.totals.insert(category, CategoryTally::default());
    }

    for pkg in packages {
        let Some(flows) = load_flow_file_if_exists(&layout.flow_file(pkg))? else {
            tracing::debug!(package = %pkg, "no flow file");
            summary.missing_flows.push(pkg.raw_id());
            continue;
        };
        let a = read_bridge_file_if_exists(&layout.a_bridge_file(pkg))?.unwrap_or_default();
        let b = read_bridge_file_if_exists(&layout.b_bridge_file(pkg))?.unwrap_or_default();
        let cmp = compare_flows(pkg, &flows, &a, &b);
        for (category, tally) in &cmp.tallies {
            summary.totals.entry(*category).or_default().add(tally);
        }
        summary.num_packages += 1;
        summary.per_package.insert(pkg.raw_id(), cmp);
    }
    Ok(summary)
}
