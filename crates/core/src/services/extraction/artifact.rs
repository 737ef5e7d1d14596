use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{canonical_js_name, BridgeRecord, BridgeSet, NormalizeError};

/// Failure reason the analyzer reports when it could not map a native
/// function address back to a symbol.
pub const CFUNC_ADDRESS_RESOLUTION: &str = "CFUNC_ADDRESS_RESOLUTION";

/// One bridge entry as written by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBridge {
    pub jsname: String,
    pub cfunc: String,
}

/// The analyzer's JSON artifact (`bridges.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeArtifact {
    #[serde(default)]
    pub bridges: Vec<RawBridge>,
    #[serde(default)]
    pub modules: Vec<String>,
    /// JS name -> failure reason code.
    #[serde(default)]
    pub failed: BTreeMap<String, String>,
}

/// Why an artifact looks like it came from a stripped binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrippedReason {
    NoModules,
    NoBridges,
    /// Address resolution failed for a JS name that has no extracted bridge.
    UnresolvedAddress(String),
}

impl fmt::Display for StrippedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrippedReason::NoModules => f.write_str("no native modules analyzed"),
            StrippedReason::NoBridges => f.write_str("no bridges extracted"),
            StrippedReason::UnresolvedAddress(name) => {
                write!(f, "address of '{name}' could not be resolved to a symbol")
            }
        }
    }
}

/// Outcome of checking an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Stripped(StrippedReason),
    /// No artifact on disk, or it could not be parsed.
    Missing,
}

impl BridgeArtifact {
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    /// Load an artifact; `None` if the file is absent or not valid JSON.
    pub fn load(path: &Path) -> Option<Self> {
        let body = fs::read_to_string(path).ok()?;
        match Self::from_json(&body) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unparsable bridge artifact");
                None
            }
        }
    }

    /// Detect artifacts produced from stripped binaries.
    pub fn validate(&self) -> Validation {
        if self.modules.is_empty() {
            return Validation::Stripped(StrippedReason::NoModules);
        }
        if self.bridges.is_empty() {
            return Validation::Stripped(StrippedReason::NoBridges);
        }

        let resolved: BTreeSet<&str> =
            self.bridges.iter().map(|b| canonical_js_name(&b.jsname)).collect();
        for (name, reason) in &self.failed {
            let short = canonical_js_name(name);
            if reason == CFUNC_ADDRESS_RESOLUTION && !resolved.contains(short) {
                tracing::warn!(jsname = short, "address resolution failed with no matching bridge");
                return Validation::Stripped(StrippedReason::UnresolvedAddress(short.to_string()));
            }
        }
        Validation::Valid
    }

    /// Canonicalize every raw bridge. The first malformed symbol aborts the whole set.
    pub fn canonical_bridges(&self) -> Result<BridgeSet, NormalizeError> {
        let mut set = BridgeSet::new();
        for raw in &self.bridges {
            let record = BridgeRecord::from_raw(raw.jsname.as_str(), raw.cfunc.as_str())?;
            set.insert_record(&record);
        }
        Ok(set)
    }
}

/// Validate the artifact at `path`.
pub fn validate_artifact_file(path: &Path) -> Validation {
    match BridgeArtifact::load(path) {
        Some(artifact) => artifact.validate(),
        None => Validation::Missing,
    }
}
