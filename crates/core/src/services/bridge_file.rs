use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::{BridgeRecord, BridgeSet, CanonicalBridge, NormalizeError};

#[derive(Debug, Error)]
pub enum BridgeFileError {
    #[error("I/O error on bridge file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed bridge line {line} in {path}: '{content}'")]
    MalformedLine { path: PathBuf, line: usize, content: String },
    #[error(transparent)]
    MalformedSymbol(#[from] NormalizeError),
}

/// Legacy per-line object form (`{"jsname": ..., "cfunc": ...}`).
#[derive(Debug, Deserialize)]
struct LegacyBridgeLine {
    jsname: String,
    cfunc: String,
}

/// Why a single line could not be parsed.
#[derive(Debug, PartialEq, Eq)]
pub enum LineError {
    /// Neither a `(js,c)` tuple nor a legacy JSON object.
    Malformed,
    Symbol(NormalizeError),
}

/// Render one canonical bridge as its file line (without newline).
pub fn format_bridge_line(bridge: &CanonicalBridge) -> String {
    bridge.to_string()
}

/// Parse one line. Tuple lines are taken as already canonical; legacy JSON lines
/// are canonicalized. Blank lines yield `Ok(None)`.
pub fn parse_bridge_line(line: &str) -> Result<Option<CanonicalBridge>, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        let legacy: LegacyBridgeLine =
            serde_json::from_str(line).map_err(|_| LineError::Malformed)?;
        let record =
            BridgeRecord::from_raw(legacy.jsname, legacy.cfunc).map_err(LineError::Symbol)?;
        return Ok(Some(record.canonical().clone()));
    }
    let inner =
        line.strip_prefix('(').and_then(|l| l.strip_suffix(')')).ok_or(LineError::Malformed)?;
    let (js, c) = inner.split_once(',').ok_or(LineError::Malformed)?;
    if js.is_empty() || c.is_empty() {
        return Err(LineError::Malformed);
    }
    Ok(Some(CanonicalBridge::new(js, c)))
}

/// Write a canonical bridge file, creating parent directories. Lines are sorted.
pub fn write_bridge_file(path: &Path, bridges: &BridgeSet) -> Result<(), BridgeFileError> {
    let io_err = |source| BridgeFileError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut body = String::new();
    for bridge in bridges {
        body.push_str(&format_bridge_line(bridge));
        body.push('\n');
    }
    fs::write(path, body).map_err(io_err)
}

/// Read a bridge file (canonical tuple lines or legacy JSON lines).
pub fn read_bridge_file(path: &Path) -> Result<BridgeSet, BridgeFileError> {
    let body = fs::read_to_string(path)
        .map_err(|source| BridgeFileError::Io { path: path.to_path_buf(), source })?;
    let mut set = BridgeSet::new();
    for (idx, line) in body.lines().enumerate() {
        match parse_bridge_line(line) {
            Ok(Some(bridge)) => {
                set.insert(bridge);
            }
            Ok(None) => {}
            Err(LineError::Symbol(normalize)) => return Err(normalize.into()),
            Err(LineError::Malformed) => {
                return Err(BridgeFileError::MalformedLine {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    content: line.to_string(),
                })
            }
        }
    }
    Ok(set)
}

/// Like [`read_bridge_file`], but a missing file is `Ok(None)`.
pub fn read_bridge_file_if_exists(path: &Path) -> Result<Option<BridgeSet>, BridgeFileError> {
    if !path.is_file() {
        return Ok(None);
    }
    read_bridge_file(path).map(Some)
}
