use anyhow::Result;
use bridgecheck::commands::{
    clashes_command, compare_command, compare_flows_command, extract_command,
    resolve_symbols_command, runs_command, show_config_command,
};
use bridgecheck::{init_logging, load_effective_config};
use clap::{Parser, Subcommand};

/// JS-to-native bridge extraction and cross-tool reconciliation harness.
///
/// This CLI is a thin wrapper around `bridgecheck-core` (exposed in code as
/// `bridgecheck_core`). All substantive logic lives in the library.
#[derive(Parser, Debug)]
#[command(
    name = "bridgecheck",
    version,
    about = "Extract and reconcile JS-to-native bridges of npm packages",
    long_about = None
)]
struct Cli {
    /// Logging level: critical | error | warn | warning | info | debug.
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log: String,

    /// Harness config file (.json, .yaml or .yml). Defaults rooted at the current directory.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install packages, run the analyzer and write canonical bridge files.
    ///
    /// Packages come from `--input` (CSV, first column `name:version`) or a
    /// single `--package`. Existing bridge files are kept unless `--always`.
    Extract {
        /// Package list CSV.
        #[arg(short, long)]
        input: Option<String>,

        /// Extract a single `name:version` package instead of a list.
        #[arg(short, long, conflicts_with = "input")]
        package: Option<String>,

        /// Recreate bridge files even when they already exist.
        #[arg(short = 'A', long, default_value_t = false)]
        always: bool,

        /// Parallel workers (defaults to the configured value).
        #[arg(short, long)]
        workers: Option<usize>,

        /// Results JSON file. Printed to stdout when omitted.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Resolve live addresses in a running process to symbols through the debugger.
    ResolveSymbols {
        /// JSON array of addresses (numbers or hex strings).
        #[arg(short, long)]
        input: Option<String>,

        /// Target process id.
        #[arg(short, long)]
        pid: u32,

        #[arg(short, long)]
        output: Option<String>,

        /// Kill the debugger after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Compare both tools' bridge sets across a package list.
    Compare {
        #[arg(short, long)]
        input: Option<String>,

        #[arg(short, long)]
        output: Option<String>,
    },

    /// Classify dynamically observed call sites by which tool found them.
    CompareFlows {
        #[arg(short, long)]
        input: Option<String>,

        #[arg(short, long)]
        output: Option<String>,
    },

    /// Report js names mapped to more than one native function.
    Clashes {
        /// Bridge directory to scan (defaults to tool A's).
        #[arg(long)]
        bridges_dir: Option<String>,

        #[arg(short, long)]
        output: Option<String>,
    },

    /// List recorded extraction runs.
    Runs {
        /// Only show runs with this status (ok, skipped, failed).
        #[arg(long)]
        status: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the effective configuration and derived directory layout.
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;
    let config = load_effective_config(cli.config.as_deref())?;

    match cli.command {
        Command::Extract { input, package, always, workers, output } => extract_command(
            &config,
            input.as_deref(),
            package.as_deref(),
            always,
            workers,
            output.as_deref(),
        )?,
        Command::ResolveSymbols { input, pid, output, timeout_secs } => {
            resolve_symbols_command(&config, input.as_deref(), pid, output.as_deref(), timeout_secs)?
        }
        Command::Compare { input, output } => {
            compare_command(&config, input.as_deref(), output.as_deref())?
        }
        Command::CompareFlows { input, output } => {
            compare_flows_command(&config, input.as_deref(), output.as_deref())?
        }
        Command::Clashes { bridges_dir, output } => {
            clashes_command(&config, bridges_dir.as_deref(), output.as_deref())?
        }
        Command::Runs { status, json } => runs_command(&config, status.as_deref(), json)?,
        Command::ShowConfig => show_config_command(&config)?,
    }

    Ok(())
}
