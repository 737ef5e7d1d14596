//! Harness configuration and on-disk layout.
//!
//! - `HarnessConfig`: serializable settings (data root, tool commands, workers, timeouts).
//! - `HarnessLayout`: paths derived from a config; performs no IO.
//!
//! A config is built once per process invocation and never mutated afterwards;
//! components receive it (or the layout) by reference at construction.

mod layout;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use layout::HarnessLayout;

/// Default number of parallel extraction workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Command used to invoke an external tool: program plus leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// External tools the harness shells out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Package manager CLI (`npm`).
    pub package_manager: ToolCommand,
    /// Native-module analyzer, e.g. `node_g analyze_module.js`.
    pub analyzer: ToolCommand,
    /// Debugger with Python scripting support (`gdb`).
    pub debugger: ToolCommand,
    /// Attaching to a foreign process needs elevated privileges.
    #[serde(default = "default_true")]
    pub debugger_sudo: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            package_manager: ToolCommand::new("npm"),
            analyzer: ToolCommand::new("node_g").with_args(["analyze_module.js"]),
            debugger: ToolCommand::new("gdb"),
            debugger_sudo: true,
        }
    }
}

/// Display names of the two compared tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLabels {
    /// Reference tool (its bridge files are produced by `extract`).
    pub a: String,
    /// Comparison tool.
    pub b: String,
}

impl Default for ToolLabels {
    fn default() -> Self {
        Self { a: "gasket".into(), b: "charon".into() }
    }
}

/// Serializable harness configuration.
///
/// Directory fields left unset are derived from `data_root` by [`HarnessLayout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Root under which all data directories live.
    pub data_root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,
    /// Canonical bridge files of tool A.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_bridges_dir: Option<PathBuf>,
    /// Canonical bridge files of tool B.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_bridges_dir: Option<PathBuf>,
    /// Dynamic flow traces (`<package>_nomit.txt`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Wall-clock limit for install/analyze invocations. `None` waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_timeout_secs: Option<u64>,
    #[serde(default)]
    pub labels: ToolLabels,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl HarnessConfig {
    /// Defaults rooted at `data_root`.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            install_dir: None,
            artifacts_dir: None,
            a_bridges_dir: None,
            b_bridges_dir: None,
            flows_dir: None,
            temp_dir: None,
            tools: ToolsConfig::default(),
            workers: DEFAULT_WORKERS,
            tool_timeout_secs: None,
            labels: ToolLabels::default(),
        }
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    /// Apply `BRIDGECHECK_NPM` / `BRIDGECHECK_ANALYZER` / `BRIDGECHECK_GDB` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(npm) = std::env::var_os("BRIDGECHECK_NPM") {
            self.tools.package_manager.program = npm.to_string_lossy().to_string();
        }
        if let Some(analyzer) = std::env::var_os("BRIDGECHECK_ANALYZER") {
            self.tools.analyzer.program = analyzer.to_string_lossy().to_string();
        }
        if let Some(gdb) = std::env::var_os("BRIDGECHECK_GDB") {
            self.tools.debugger.program = gdb.to_string_lossy().to_string();
        }
        self
    }

    pub fn layout(&self) -> HarnessLayout {
        HarnessLayout::from_config(self)
    }
}

/// Load a config file; `.yaml`/`.yml` are parsed as YAML, anything else as JSON.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read harness config at {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let config: HarnessConfig = if matches!(ext, "yaml" | "yml") {
        serde_yaml::from_str(&body).context("Failed to parse harness config YAML")?
    } else {
        serde_json::from_str(&body).context("Failed to parse harness config JSON")?
    };
    Ok(config)
}
