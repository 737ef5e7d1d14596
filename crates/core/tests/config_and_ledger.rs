use std::fs;

use bridgecheck_core::config::{load_config, HarnessConfig, HarnessLayout, DEFAULT_WORKERS};
use bridgecheck_core::db::{ExtractionRunRecord, RunDb, RunStatus};
use bridgecheck_core::model::PackageRef;
use bridgecheck_core::services::corpus::load_package_list;
use rusqlite::Connection;
use tempfile::tempdir;

#[test]
fn layout_derives_package_paths() {
    let layout = HarnessLayout::new("/data");
    let pkg = PackageRef::parse("@scope/name:1.0.0").unwrap();

    assert_eq!(layout.db_path, std::path::Path::new("/data/.bridgecheck/runs.db"));
    assert_eq!(
        layout.package_install_dir(&pkg),
        std::path::Path::new("/data/install/@scope~name___1.0.0")
    );
    assert_eq!(
        layout.package_module_dir(&pkg),
        std::path::Path::new("/data/install/@scope~name___1.0.0/node_modules/@scope/name")
    );
    assert_eq!(
        layout.package_artifact_path(&pkg),
        std::path::Path::new("/data/bridges/npm/@/@scope~name/1.0.0/bridges.json")
    );
    assert_eq!(
        layout.b_bridge_file(&pkg),
        std::path::Path::new("/data/charon_bridges/@scope~name.txt")
    );
}

#[test]
fn yaml_config_overrides_directories_and_tools() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("harness.yaml");
    fs::write(
        &path,
        "data_root: /srv/eval\n\
         a_bridges_dir: ours\n\
         flows_dir: /traces\n\
         workers: 4\n\
         tool_timeout_secs: 600\n\
         tools:\n  \
           package_manager: {program: pnpm}\n  \
           analyzer: {program: node, args: [--expose-gc, analyze_module.js]}\n  \
           debugger: {program: gdb-multiarch}\n  \
           debugger_sudo: false\n",
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.workers, 4);
    assert_eq!(config.tool_timeout().map(|d| d.as_secs()), Some(600));
    assert_eq!(config.tools.analyzer.args, vec!["--expose-gc", "analyze_module.js"]);
    assert!(!config.tools.debugger_sudo);
    assert_eq!(config.labels.a, "gasket");

    let layout = config.layout();
    assert_eq!(layout.a_bridges_dir, std::path::Path::new("/srv/eval/ours"));
    assert_eq!(layout.flows_dir, std::path::Path::new("/traces"));
    assert_eq!(layout.install_dir, std::path::Path::new("/srv/eval/install"));
}

#[test]
fn json_config_uses_defaults_for_missing_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("harness.json");
    fs::write(&path, r#"{"data_root": "/d"}"#).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config, HarnessConfig::new("/d"));
    assert_eq!(config.workers, DEFAULT_WORKERS);
    assert_eq!(config.tools.package_manager.program, "npm");
    assert_eq!(config.tools.analyzer.args, vec!["analyze_module.js"]);
    assert!(config.tools.debugger_sudo);
}

#[test]
fn broken_config_reports_context() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("harness.json");
    fs::write(&path, "{").unwrap();
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse harness config JSON"));
}

#[test]
fn package_list_reads_first_column_and_skips_blanks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("packages.csv");
    fs::write(&path, "fsevents:2.3.3,extra\n\n@img/sharp:0.33.0\n  bcrypt:5.1.1  \n").unwrap();

    let packages = load_package_list(&path).unwrap();
    let ids: Vec<String> = packages.iter().map(PackageRef::raw_id).collect();
    assert_eq!(ids, vec!["fsevents:2.3.3", "@img/sharp:0.33.0", "bcrypt:5.1.1"]);
}

fn record(package: &str, status: RunStatus) -> ExtractionRunRecord {
    let pkg = PackageRef::parse(package).unwrap();
    ExtractionRunRecord {
        package: pkg.raw_id(),
        sanitized: pkg.sanitized_id(),
        status,
        rebuilt: status == RunStatus::Ok,
        bridges: (status == RunStatus::Ok).then_some(7),
        error: (status == RunStatus::Failed).then(|| "npm exited with Some(1)".to_string()),
        started_at: "2026-01-01T00:00:00Z".into(),
        finished_at: "2026-01-01T00:00:05Z".into(),
    }
}

#[test]
fn run_ledger_lists_and_filters() {
    let db = RunDb::open_in_memory().unwrap();
    db.insert_extraction_run(&record("a:1", RunStatus::Ok)).unwrap();
    db.insert_extraction_run(&record("@s/b:2", RunStatus::Failed)).unwrap();
    db.insert_extraction_run(&record("c:3", RunStatus::Skipped)).unwrap();

    let all = db.list_extraction_runs(None).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0], record("a:1", RunStatus::Ok));

    let failed = db.list_extraction_runs(Some(RunStatus::Failed)).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].sanitized, "@s~b:2");
    assert_eq!(failed[0].bridges, None);
}

#[test]
fn run_ledger_refuses_newer_schema() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runs.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("PRAGMA user_version = 99;").unwrap();
    }
    assert!(RunDb::open(&path).is_err());
}

#[test]
fn run_ledger_persists_across_opens() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runs.db");
    RunDb::open(&path).unwrap().insert_extraction_run(&record("a:1", RunStatus::Ok)).unwrap();
    let reopened = RunDb::open(&path).unwrap();
    assert_eq!(reopened.list_extraction_runs(None).unwrap().len(), 1);
}
