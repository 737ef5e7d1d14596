use std::path::{Path, PathBuf};

use crate::config::HarnessConfig;
use crate::model::PackageRef;

/// Logical layout of the harness data directories.
///
/// This is derived from a config. It does *not* perform any IO itself.
#[derive(Debug, Clone)]
pub struct HarnessLayout {
    /// Root directory of all harness data.
    pub root: PathBuf,
    /// Directory for internal metadata (.bridgecheck).
    pub meta_dir: PathBuf,
    /// Path to the run ledger database.
    pub db_path: PathBuf,
    /// Per-package isolated install directories.
    pub install_dir: PathBuf,
    /// Raw analyzer artifacts (`bridges.json`), organized per package/version.
    pub artifacts_dir: PathBuf,
    /// Canonical bridge files produced by tool A.
    pub a_bridges_dir: PathBuf,
    /// Canonical bridge files produced by tool B.
    pub b_bridges_dir: PathBuf,
    /// Dynamic flow traces.
    pub flows_dir: PathBuf,
    /// Scratch space for temporary files.
    pub temp_dir: PathBuf,
}

impl HarnessLayout {
    /// Compute the default layout rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::from_config(&HarnessConfig::new(root.as_ref()))
    }

    /// Compute the layout, honoring any directory overrides in `config`.
    pub fn from_config(config: &HarnessConfig) -> Self {
        let root = config.data_root.clone();
        let pick = |over: &Option<PathBuf>, default: &str| -> PathBuf {
            match over {
                Some(p) if p.is_absolute() => p.clone(),
                Some(p) => root.join(p),
                None => root.join(default),
            }
        };
        let meta_dir = root.join(".bridgecheck");
        let db_path = meta_dir.join("runs.db");

        Self {
            install_dir: pick(&config.install_dir, "install"),
            artifacts_dir: pick(&config.artifacts_dir, "bridges/npm"),
            a_bridges_dir: pick(&config.a_bridges_dir, &format!("{}_bridges", config.labels.a)),
            b_bridges_dir: pick(&config.b_bridges_dir, &format!("{}_bridges", config.labels.b)),
            flows_dir: pick(&config.flows_dir, "flows"),
            temp_dir: pick(&config.temp_dir, "tmp"),
            meta_dir,
            db_path,
            root,
        }
    }

    /// Isolated install prefix for one package (`<sname>___<sversion>`).
    pub fn package_install_dir(&self, pkg: &PackageRef) -> PathBuf {
        let version = pkg.sanitized_version().unwrap_or_else(|| "latest".to_string());
        self.install_dir.join(format!("{}___{}", pkg.sanitized_name(), version))
    }

    /// The installed module directory the analyzer is pointed at.
    pub fn package_module_dir(&self, pkg: &PackageRef) -> PathBuf {
        self.package_install_dir(pkg).join("node_modules").join(&pkg.name)
    }

    /// Artifact directory `<first-char>/<sname>/<sversion>`.
    pub fn package_artifact_dir(&self, pkg: &PackageRef) -> PathBuf {
        let first = pkg.name.chars().next().map(|c| c.to_string()).unwrap_or_default();
        let version = pkg.sanitized_version().unwrap_or_else(|| "latest".to_string());
        self.artifacts_dir.join(first).join(pkg.sanitized_name()).join(version)
    }

    pub fn package_artifact_path(&self, pkg: &PackageRef) -> PathBuf {
        self.package_artifact_dir(pkg).join("bridges.json")
    }

    /// Canonical bridge file of tool A for `pkg`.
    pub fn a_bridge_file(&self, pkg: &PackageRef) -> PathBuf {
        self.a_bridges_dir.join(format!("{}.txt", pkg.sanitized_name()))
    }

    /// Canonical bridge file of tool B for `pkg`.
    pub fn b_bridge_file(&self, pkg: &PackageRef) -> PathBuf {
        self.b_bridges_dir.join(format!("{}.txt", pkg.sanitized_name()))
    }

    pub fn flow_file(&self, pkg: &PackageRef) -> PathBuf {
        self.flows_dir.join(format!("{}_nomit.txt", pkg.sanitized_name()))
    }
}
