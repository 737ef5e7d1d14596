use bridgecheck_core::services::extraction::{
    transition, Action, BridgeArtifact, Event, ExtractionState as S, StrippedReason, Transition,
    Validation,
};

fn walk(events: &[Event]) -> (S, Vec<Action>) {
    let mut state = S::NotInstalled;
    let mut actions = Vec::new();
    for &event in events {
        let t = transition(state, event);
        state = t.next;
        actions.extend(t.action);
    }
    (state, actions)
}

fn failed() -> Transition {
    Transition { next: S::Failed, action: None }
}

fn artifact(json: &str) -> BridgeArtifact {
    BridgeArtifact::from_json(json).unwrap()
}

#[test]
fn happy_path_reaches_done() {
    let (state, actions) = walk(&[
        Event::Start,
        Event::InstallSucceeded,
        Event::AnalyzeSucceeded,
        Event::ValidationPassed,
        Event::Emitted,
    ]);
    assert_eq!(state, S::Done);
    assert_eq!(
        actions,
        vec![
            Action::Install { from_source: false },
            Action::Analyze,
            Action::Validate,
            Action::Emit
        ]
    );
}

#[test]
fn stripped_artifact_triggers_one_rebuild() {
    let (state, actions) = walk(&[
        Event::Start,
        Event::InstallSucceeded,
        Event::AnalyzeSucceeded,
        Event::ValidationFailed,
        Event::InstallSucceeded,
        Event::AnalyzeSucceeded,
        Event::ValidationPassed,
        Event::Emitted,
    ]);
    assert_eq!(state, S::Done);
    assert_eq!(actions.iter().filter(|a| **a == Action::PurgeAndRebuild).count(), 1);
}

#[test]
fn second_validation_failure_is_terminal() {
    let (state, _) = walk(&[
        Event::Start,
        Event::InstallSucceeded,
        Event::AnalyzeFailed,
        Event::InstallSucceeded,
        Event::AnalyzeSucceeded,
        Event::ValidationFailed,
    ]);
    assert_eq!(state, S::Failed);
}

#[test]
fn install_failure_is_terminal_and_emit_failure_is_not_retried() {
    assert_eq!(transition(S::NotInstalled, Event::InstallFailed), failed());
    assert_eq!(transition(S::Validated, Event::EmitFailed), failed());
    assert_eq!(transition(S::RebuildFromSource, Event::AnalyzeFailed), failed());
}

#[test]
fn empty_bridges_are_stripped() {
    let a = artifact(r#"{"modules":["a.node"],"bridges":[],"failed":{}}"#);
    assert_eq!(a.validate(), Validation::Stripped(StrippedReason::NoBridges));
}

#[test]
fn empty_modules_are_stripped() {
    let a = artifact(r#"{"modules":[],"bridges":[{"jsname":"x","cfunc":"X"}]}"#);
    assert_eq!(a.validate(), Validation::Stripped(StrippedReason::NoModules));
}

#[test]
fn unrelated_failures_do_not_invalidate() {
    let a = artifact(
        r#"{"modules":["a.node"],
            "bridges":[{"jsname":"m.open","cfunc":"Open(int)"}],
            "failed":{"m.close":"NOT_A_FUNCTION","m.stat":"OTHER"}}"#,
    );
    assert_eq!(a.validate(), Validation::Valid);
}

#[test]
fn unresolved_address_without_bridge_is_stripped() {
    let a = artifact(
        r#"{"modules":["a.node"],
            "bridges":[{"jsname":"m.open","cfunc":"Open"}],
            "failed":{"m.close":"CFUNC_ADDRESS_RESOLUTION"}}"#,
    );
    assert_eq!(
        a.validate(),
        Validation::Stripped(StrippedReason::UnresolvedAddress("close".into()))
    );
}

#[test]
fn unresolved_address_with_bridge_is_fine() {
    let a = artifact(
        r#"{"modules":["a.node"],
            "bridges":[{"jsname":"m.open","cfunc":"Open"}],
            "failed":{"other.open":"CFUNC_ADDRESS_RESOLUTION"}}"#,
    );
    assert_eq!(a.validate(), Validation::Valid);
}
