//! bridgecheck-core
//!
//! Core library of an evaluation harness that extracts JS-to-native bridges
//! from npm packages' native extension modules and reconciles the results of
//! two detection tools.
//!
//! This crate defines the data model, bridge normalization, the per-package
//! extraction state machine, the debugger symbol oracle, the comparators, and
//! the run ledger. External tools (package manager, analyzer, debugger) are
//! only ever reached through the `ToolRunner` seam, so everything here is
//! testable without them.

pub mod config;
pub mod db;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
