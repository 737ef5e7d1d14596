//! Per-package bridge extraction.
//!
//! `state` holds the pure transition function, `artifact` parses and validates
//! analyzer output, `driver` executes the state machine against real tools,
//! and `batch` fans packages out over a worker pool.

pub mod artifact;
pub mod batch;
pub mod driver;
pub mod state;

pub use artifact::{BridgeArtifact, RawBridge, StrippedReason, Validation};
pub use batch::{extract_batch, extract_one, BatchError, BatchSummary, PackageResult};
pub use driver::{ExtractError, ExtractOutcome, ExtractReport, Extractor};
pub use state::{transition, Action, Event, ExtractionState, Transition};
