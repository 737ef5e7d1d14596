use serde::{Deserialize, Serialize};

/// Per-package extraction state.
///
/// Happy path: `NotInstalled -> Installed -> Analyzed -> Validated -> Done`.
/// Recovery path (once): `Installed | Analyzed -> RebuildFromSource -> ReAnalyzed
/// -> ReValidated -> Done`. `Failed` is terminal and reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    NotInstalled,
    Installed,
    Analyzed,
    Validated,
    RebuildFromSource,
    ReAnalyzed,
    ReValidated,
    Done,
    Failed,
}

impl ExtractionState {
    /// True once the source-build retry has been spent.
    pub fn is_rebuild(self) -> bool {
        matches!(
            self,
            ExtractionState::RebuildFromSource
                | ExtractionState::ReAnalyzed
                | ExtractionState::ReValidated
        )
    }
}

/// Result of the last action, fed back into [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    InstallSucceeded,
    InstallFailed,
    AnalyzeSucceeded,
    AnalyzeFailed,
    ValidationPassed,
    /// Stripped or missing artifact.
    ValidationFailed,
    Emitted,
    EmitFailed,
}

/// Work the executor must perform next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install { from_source: bool },
    /// Drop partial artifacts and reinstall with a from-source build.
    PurgeAndRebuild,
    Analyze,
    Validate,
    Emit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: ExtractionState,
    pub action: Option<Action>,
}

impl Transition {
    fn to(next: ExtractionState, action: Action) -> Self {
        Self { next, action: Some(action) }
    }

    fn stop(next: ExtractionState) -> Self {
        Self { next, action: None }
    }
}

/// Pure transition function of the extraction state machine.
///
/// Unexpected `(state, event)` pairs fail the package rather than panic.
pub fn transition(state: ExtractionState, event: Event) -> Transition {
    use ExtractionState as S;

    match (state, event) {
        (S::NotInstalled, Event::Start) => {
            Transition::to(S::NotInstalled, Action::Install { from_source: false })
        }
        (S::NotInstalled, Event::InstallSucceeded) => Transition::to(S::Installed, Action::Analyze),
        (S::Installed, Event::AnalyzeSucceeded) => Transition::to(S::Analyzed, Action::Validate),
        (S::Installed, Event::AnalyzeFailed) => {
            Transition::to(S::RebuildFromSource, Action::PurgeAndRebuild)
        }
        (S::Analyzed, Event::ValidationPassed) => Transition::to(S::Validated, Action::Emit),
        (S::Analyzed, Event::ValidationFailed) => {
            Transition::to(S::RebuildFromSource, Action::PurgeAndRebuild)
        }
        (S::RebuildFromSource, Event::InstallSucceeded) => {
            Transition::to(S::RebuildFromSource, Action::Analyze)
        }
        (S::RebuildFromSource, Event::AnalyzeSucceeded) => {
            Transition::to(S::ReAnalyzed, Action::Validate)
        }
        (S::ReAnalyzed, Event::ValidationPassed) => Transition::to(S::ReValidated, Action::Emit),
        (S::Validated | S::ReValidated, Event::Emitted) => Transition::stop(S::Done),
        _ => Transition::stop(S::Failed),
    }
}
