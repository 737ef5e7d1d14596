//! Core data model for packages, bridges, and resolved symbols.
//!
//! This module contains:
//! - `PackageRef`: a (possibly scoped, possibly versioned) npm package identifier.
//! - `BridgeRecord` / `BridgeSet`: JS-to-native call edges keyed by their canonical pair.
//! - `SymbolHop`: one address resolved by the debugger oracle.
//! - Canonicalization helpers shared by the extractor and the comparator.

mod normalize;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use normalize::{
    canonical_c_function, canonical_js_name, canonicalize, sanitize_package_id,
    unsanitize_package_id, NormalizeError,
};

/// Errors raised while parsing or validating package identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackageRefError {
    #[error("Empty package identifier")]
    Empty,
    #[error("Package identifier '{0}' has an empty name")]
    EmptyName(String),
    #[error("Package identifier '{0}' has an empty version")]
    EmptyVersion(String),
    #[error("Packages '{first}' and '{second}' both sanitize to '{sanitized}'")]
    SanitizedCollision { first: String, second: String, sanitized: String },
}

/// Identifies an npm package, optionally pinned to a version.
///
/// The raw form is `name:version` (e.g. `@scope/name:1.2.3`) or just `name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub version: Option<String>,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self { name: name.into(), version }
    }

    /// Parse a raw `name[:version]` identifier.
    pub fn parse(raw: &str) -> Result<Self, PackageRefError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PackageRefError::Empty);
        }
        match raw.split_once(':') {
            Some((name, version)) => {
                if name.is_empty() {
                    return Err(PackageRefError::EmptyName(raw.to_string()));
                }
                if version.is_empty() {
                    return Err(PackageRefError::EmptyVersion(raw.to_string()));
                }
                Ok(Self::new(name, Some(version.to_string())))
            }
            None => Ok(Self::new(raw, None)),
        }
    }

    /// `name:version`, or `name` when unversioned.
    pub fn raw_id(&self) -> String {
        match &self.version {
            Some(v) => format!("{}:{}", self.name, v),
            None => self.name.clone(),
        }
    }

    /// Filesystem-safe form of `raw_id`.
    pub fn sanitized_id(&self) -> String {
        sanitize_package_id(&self.raw_id())
    }

    /// Filesystem-safe package name without the version.
    pub fn sanitized_name(&self) -> String {
        sanitize_package_id(&self.name)
    }

    pub fn sanitized_version(&self) -> Option<String> {
        self.version.as_deref().map(sanitize_package_id)
    }

    /// The `name@version` argument handed to the package manager.
    pub fn install_spec(&self) -> String {
        match &self.version {
            Some(v) => format!("{}@{}", self.name, v),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_id())
    }
}

/// Reject corpora where two distinct packages share a sanitized name.
///
/// Bridge files are keyed by sanitized name, so a collision would silently
/// merge two packages' results.
pub fn ensure_unique_sanitized(packages: &[PackageRef]) -> Result<(), PackageRefError> {
    let mut seen: BTreeMap<String, &PackageRef> = BTreeMap::new();
    for pkg in packages {
        let key = pkg.sanitized_name();
        match seen.get(&key) {
            Some(prev) if prev.name != pkg.name => {
                return Err(PackageRefError::SanitizedCollision {
                    first: prev.raw_id(),
                    second: pkg.raw_id(),
                    sanitized: key,
                });
            }
            Some(_) => {}
            None => {
                seen.insert(key, pkg);
            }
        }
    }
    Ok(())
}

/// Canonical `(jsName, cFunction)` pair; the identity of a bridge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalBridge {
    pub js_name: String,
    pub c_function: String,
}

impl CanonicalBridge {
    pub fn new(js_name: impl Into<String>, c_function: impl Into<String>) -> Self {
        Self { js_name: js_name.into(), c_function: c_function.into() }
    }
}

impl fmt::Display for CanonicalBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.js_name, self.c_function)
    }
}

/// One JS-to-native call edge, as reported by a tool.
///
/// Raw fields are kept for diagnostics; equality only looks at the canonical pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRecord {
    pub js_name: String,
    pub c_function: String,
    canonical: CanonicalBridge,
}

impl BridgeRecord {
    /// Canonicalize a raw bridge. Fails if the C function does not look like a symbol.
    pub fn from_raw(
        js_name: impl Into<String>,
        c_function: impl Into<String>,
    ) -> Result<Self, NormalizeError> {
        let js_name = js_name.into();
        let c_function = c_function.into();
        let (js, c) = canonicalize(&js_name, &c_function)?;
        Ok(Self { js_name, c_function, canonical: CanonicalBridge::new(js, c) })
    }

    pub fn canonical(&self) -> &CanonicalBridge {
        &self.canonical
    }

    pub fn canonical_js_name(&self) -> &str {
        &self.canonical.js_name
    }

    pub fn canonical_c_function(&self) -> &str {
        &self.canonical.c_function
    }
}

impl PartialEq for BridgeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for BridgeRecord {}

/// Unique canonical bridges of one package, as produced by one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSet {
    bridges: BTreeSet<CanonicalBridge>,
}

impl BridgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a bridge; returns false if its canonical pair was already present.
    pub fn insert(&mut self, bridge: CanonicalBridge) -> bool {
        self.bridges.insert(bridge)
    }

    pub fn insert_record(&mut self, record: &BridgeRecord) -> bool {
        self.insert(record.canonical().clone())
    }

    pub fn contains(&self, bridge: &CanonicalBridge) -> bool {
        self.bridges.contains(bridge)
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalBridge> {
        self.bridges.iter()
    }

    pub fn js_names(&self) -> impl Iterator<Item = &str> {
        self.bridges.iter().map(|b| b.js_name.as_str())
    }

    pub fn c_functions(&self) -> impl Iterator<Item = &str> {
        self.bridges.iter().map(|b| b.c_function.as_str())
    }
}

impl FromIterator<CanonicalBridge> for BridgeSet {
    fn from_iter<T: IntoIterator<Item = CanonicalBridge>>(iter: T) -> Self {
        Self { bridges: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a BridgeSet {
    type Item = &'a CanonicalBridge;
    type IntoIter = std::collections::btree_set::Iter<'a, CanonicalBridge>;

    fn into_iter(self) -> Self::IntoIter {
        self.bridges.iter()
    }
}

/// Address resolved to its owning symbol by the debugger oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolHop {
    pub address: u64,
    pub c_function: String,
    pub section: String,
    pub library: String,
}
