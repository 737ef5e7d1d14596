//! Debugger-backed address-to-symbol oracle.
//!
//! A Python script is sourced into `gdb` attached to a live process. For every
//! requested address it prints one marker-delimited line, which is parsed back
//! into [`SymbolHop`]s:
//!
//! ```text
//! ___ADDRESS___<addr>___ADDRESS______FUNC___<cname> in section <section> of <library>___FUNC___
//! ___ADDRESS___<addr>___ADDRESS______FUNC___NOTFOUND___FUNC___
//! ```
//!
//! Demangling is switched off before the first lookup; demangled names contain
//! spaces and would break the `<cname>` field.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ToolsConfig;
use crate::model::SymbolHop;
use crate::services::process::{ToolError, ToolInvocation, ToolRunner};

const SCRIPT_HEADER: &str = r#"import gdb

def addr2symbol(address):
    try:
        gdb_address = gdb.parse_and_eval(f'({address})')
        symbol_info = gdb.execute(f'info symbol {gdb_address}', to_string=True).strip()
        if symbol_info and not symbol_info.startswith('No symbol matches'):
            print(f'___ADDRESS___{address}___ADDRESS______FUNC___{symbol_info}___FUNC___')
        else:
            print(f'___ADDRESS___{address}___ADDRESS______FUNC___NOTFOUND___FUNC___')
    except gdb.error as e:
        print(f'___ADDRESS___{address}___ADDRESS______ERROR___{e}___ERROR___')

"#;

const NO_DEMANGLE: &str = "gdb.execute('set print demangle off')\n";
const QUIT: &str = "gdb.execute('quit')\n";

/// Marker gdb prints when ptrace attach is refused.
const PTRACE_DENIED: &str = "ptrace: Operation not permitted";

static NOT_FOUND_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"___ADDRESS___(.*?)___ADDRESS______FUNC___NOTFOUND___FUNC___")
        .expect("not-found pattern is valid")
});

static RESOLVED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"___ADDRESS___(.*?)___ADDRESS______FUNC___(\S+)\s+in section\s+(\S+)\s+of\s+(.+)___FUNC___",
    )
    .expect("resolved pattern is valid")
});

static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"___ADDRESS___(.*?)___ADDRESS______ERROR___(.*)___ERROR___")
        .expect("error pattern is valid")
});

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Not permitted to attach {program} to pid {pid} (needs ptrace privileges)")]
    PermissionDenied { program: String, pid: u32 },
    #[error("Debugger run failed: {0}")]
    Tool(#[from] ToolError),
    #[error("I/O error preparing debugger script: {0}")]
    Io(#[from] io::Error),
}

/// One parsed line of debugger output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopLine {
    Resolved(SymbolHop),
    NotFound(u64),
    /// The debugger raised while evaluating the address.
    Failed { address: u64, message: String },
    Unrecognized,
}

/// Per-address outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Resolved { c_function: String, section: String, library: String },
    NotFound,
}

/// More or fewer hops were parsed than addresses requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseMismatch {
    pub requested: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolResolution {
    pub hops: Vec<SymbolHop>,
    /// Every requested address, resolved or not.
    pub by_address: BTreeMap<u64, Resolution>,
    pub mismatch: Option<ParseMismatch>,
}

#[derive(Serialize)]
struct ResolvedEntry<'a> {
    cfunc: &'a str,
    library: &'a str,
}

impl SymbolResolution {
    /// `{"0x…": {"cfunc": …, "library": …}}` for every resolved hop.
    pub fn to_output_json(&self) -> serde_json::Value {
        let entries: BTreeMap<String, ResolvedEntry<'_>> = self
            .hops
            .iter()
            .map(|h| {
                let entry = ResolvedEntry { cfunc: &h.c_function, library: &h.library };
                (format!("{:#x}", h.address), entry)
            })
            .collect();
        serde_json::to_value(entries).unwrap_or_default()
    }
}

/// Parse `0x`-prefixed hex or plain decimal.
pub fn parse_address(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[derive(Debug, Error)]
pub enum AddressListError {
    #[error("Address list is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressEntry {
    Number(u64),
    Text(String),
}

/// Parse a JSON array of addresses given as numbers or hex/decimal strings.
pub fn parse_address_list(json: &str) -> Result<Vec<u64>, AddressListError> {
    let entries: Vec<AddressEntry> = serde_json::from_str(json)?;
    entries
        .into_iter()
        .map(|entry| match entry {
            AddressEntry::Number(n) => Ok(n),
            AddressEntry::Text(s) => {
                parse_address(&s).ok_or(AddressListError::InvalidAddress(s))
            }
        })
        .collect()
}

/// Render the debugger script for `addresses`.
pub fn build_script(addresses: &[u64]) -> String {
    let mut script = String::from(SCRIPT_HEADER);
    script.push_str(NO_DEMANGLE);
    for addr in addresses {
        script.push_str(&format!("addr2symbol('{addr:#x}')\n"));
    }
    script.push_str(QUIT);
    script
}

/// Parse one line of debugger output.
pub fn parse_hop_line(line: &str) -> HopLine {
    if let Some(caps) = NOT_FOUND_LINE.captures(line) {
        return match parse_address(&caps[1]) {
            Some(addr) => HopLine::NotFound(addr),
            None => HopLine::Unrecognized,
        };
    }
    if let Some(caps) = RESOLVED_LINE.captures(line) {
        let Some(address) = parse_address(&caps[1]) else {
            return HopLine::Unrecognized;
        };
        return HopLine::Resolved(SymbolHop {
            address,
            c_function: caps[2].to_string(),
            section: caps[3].to_string(),
            library: caps[4].trim().to_string(),
        });
    }
    if let Some(caps) = ERROR_LINE.captures(line) {
        if let Some(address) = parse_address(&caps[1]) {
            return HopLine::Failed { address, message: caps[2].to_string() };
        }
    }
    HopLine::Unrecognized
}

/// Fold debugger stdout into a resolution for `requested`.
pub fn collect_resolution(requested: &[u64], stdout: &str) -> SymbolResolution {
    let mut by_address: BTreeMap<u64, Resolution> =
        requested.iter().map(|&addr| (addr, Resolution::NotFound)).collect();
    let mut hops = Vec::new();

    for line in stdout.lines() {
        match parse_hop_line(line) {
            HopLine::Resolved(hop) => {
                if by_address.contains_key(&hop.address) {
                    by_address.insert(
                        hop.address,
                        Resolution::Resolved {
                            c_function: hop.c_function.clone(),
                            section: hop.section.clone(),
                            library: hop.library.clone(),
                        },
                    );
                } else {
                    tracing::debug!(address = hop.address, "hop for an address never requested");
                }
                hops.push(hop);
            }
            HopLine::NotFound(addr) => tracing::debug!(address = addr, "no symbol"),
            HopLine::Failed { address, message } => {
                tracing::warn!(address, %message, "debugger could not evaluate address");
            }
            HopLine::Unrecognized => tracing::debug!(%line, "skipping debugger output line"),
        }
    }

    let mismatch = (hops.len() != requested.len())
        .then_some(ParseMismatch { requested: requested.len(), resolved: hops.len() });
    if let Some(m) = mismatch {
        tracing::warn!(requested = m.requested, resolved = m.resolved, "hop count mismatch");
    } else {
        tracing::info!(hops = hops.len(), "all addresses resolved");
    }
    SymbolResolution { hops, by_address, mismatch }
}

/// Resolves addresses inside a running process through the debugger.
pub struct Oracle<'a> {
    tools: &'a ToolsConfig,
    runner: &'a dyn ToolRunner,
    temp_dir: Option<PathBuf>,
}

impl<'a> Oracle<'a> {
    pub fn new(tools: &'a ToolsConfig, runner: &'a dyn ToolRunner) -> Self {
        Self { tools, runner, temp_dir: None }
    }

    /// Write the script file under `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    fn script_file(&self) -> io::Result<tempfile::NamedTempFile> {
        // gdb picks the interpreter from the extension.
        let mut builder = tempfile::Builder::new();
        builder.prefix("bridgecheck-oracle-").suffix(".py");
        match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)
            }
            None => builder.tempfile(),
        }
    }

    fn invocation(&self, script: &str, pid: u32) -> ToolInvocation {
        let debugger = &self.tools.debugger;
        let base = if self.tools.debugger_sudo {
            ToolInvocation::new("sudo").arg(debugger.program.clone()).args(debugger.args.clone())
        } else {
            ToolInvocation::from_command(debugger)
        };
        base.arg("--batch")
            .arg("-ex")
            .arg(format!("source {script}"))
            .arg("--pid")
            .arg(pid.to_string())
    }

    pub fn resolve_symbols(
        &self,
        addresses: &[u64],
        pid: u32,
        timeout: Option<Duration>,
    ) -> Result<SymbolResolution, OracleError> {
        let requested: Vec<u64> =
            addresses.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let mut script = self.script_file()?;
        script.write_all(build_script(&requested).as_bytes())?;
        script.flush()?;

        let invocation =
            self.invocation(&script.path().display().to_string(), pid).timeout(timeout);
        tracing::info!(addresses = requested.len(), pid, command = %invocation, "running debugger");

        let output = match self.runner.run(&invocation) {
            Ok(output) => output,
            Err(ToolError::PermissionDenied { program }) => {
                return Err(OracleError::PermissionDenied { program, pid })
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(stdout = %output.stdout, stderr = %output.stderr, "debugger output");

        if output.stderr.contains(PTRACE_DENIED) {
            return Err(OracleError::PermissionDenied { program: invocation.program, pid });
        }
        if !output.success() {
            return Err(ToolError::non_zero(&invocation.program, output).into());
        }

        Ok(collect_resolution(&requested, &output.stdout))
    }
}
