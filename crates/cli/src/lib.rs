use std::env;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use bridgecheck_core::config::{load_config, HarnessConfig};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

pub mod commands;

/// Accepted `--log` values and the tracing level each maps to.
const LOG_LEVELS: [(&str, &str); 6] = [
    ("critical", "error"),
    ("error", "error"),
    ("warn", "warn"),
    ("warning", "warn"),
    ("info", "info"),
    ("debug", "debug"),
];

/// Canonicalize the root path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Compute the SHA-256 hash of a file and return it as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}

/// Map a `--log` value to a tracing filter directive.
pub fn parse_log_level(level: &str) -> Result<&'static str> {
    let lower = level.to_ascii_lowercase();
    LOG_LEVELS.iter().find(|(name, _)| *name == lower).map(|(_, directive)| *directive).ok_or_else(
        || {
            let accepted: Vec<&str> = LOG_LEVELS.iter().map(|(name, _)| *name).collect();
            anyhow!("log level given: {level} -- must be one of: {}", accepted.join(" | "))
        },
    )
}

/// Install the global stderr subscriber.
pub fn init_logging(level: &str) -> Result<()> {
    let directive = parse_log_level(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {e}"))
}

/// Config from `--config` (or defaults rooted at the current directory),
/// with tool-binary environment overrides applied.
pub fn load_effective_config(config: Option<&str>) -> Result<HarnessConfig> {
    let config = match config {
        Some(path) => {
            let path = canonicalize_or_current(path)?;
            let mut config = load_config(&path)?;
            if config.data_root.is_relative() {
                let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
                config.data_root = base.join(&config.data_root);
            }
            config
        }
        None => HarnessConfig::new(canonicalize_or_current(".")?),
    };
    Ok(config.with_env_overrides())
}

/// Resolve a required `--input` path; a missing flag or file is logged and fails.
pub fn require_input(input: Option<&str>) -> Result<PathBuf> {
    let Some(input) = input else {
        tracing::error!("Must give input file path");
        bail!("missing --input");
    };
    let path = canonicalize_or_current(input)?;
    if !path.exists() {
        tracing::error!(path = %path.display(), "Input file does not exist");
        bail!("input file {} does not exist", path.display());
    }
    Ok(path)
}

/// Write pretty JSON to `output`, or log it when no output is given.
pub fn emit_json<T: serde::Serialize>(value: &T, output: Option<&str>) -> Result<()> {
    let body = serde_json::to_string_pretty(value).context("Failed to serialize output JSON")?;
    match output {
        Some(path) => {
            let path = canonicalize_or_current(path)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory {}", parent.display())
                })?;
            }
            fs::write(&path, body)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => println!("{body}"),
    }
    Ok(())
}
