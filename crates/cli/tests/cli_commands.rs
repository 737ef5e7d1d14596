use std::fs;
use std::path::Path;

use predicates::prelude::*;
use tempfile::tempdir;

fn bridgecheck(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bridgecheck");
    cmd.current_dir(root);
    cmd
}

fn write(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

#[test]
fn compare_without_input_exits_with_one() {
    let dir = tempdir().unwrap();
    bridgecheck(dir.path())
        .arg("compare")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Must give input file path"));
}

#[test]
fn compare_with_missing_input_file_exits_with_one() {
    let dir = tempdir().unwrap();
    bridgecheck(dir.path())
        .args(["compare", "--input", "nope.csv"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn invalid_log_level_lists_accepted_values() {
    let dir = tempdir().unwrap();
    bridgecheck(dir.path())
        .args(["--log", "loud", "show-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("critical | error | warn | warning | info | debug"));
}

#[test]
fn show_config_prints_defaults_rooted_at_cwd() {
    let dir = tempdir().unwrap();
    bridgecheck(dir.path())
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"workers\": 10"))
        .stdout(predicate::str::contains("gasket bridges"))
        .stdout(predicate::str::contains("runs.db"));
}

#[test]
fn compare_writes_stats_and_side_files() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(&root.join("packages.csv"), "@s/fs:1.0.0\nplain:2.0.0\nsolo:0.1.0\n");
    write(&root.join("gasket_bridges/@s~fs.txt"), "(open,Open)\n(read,Read)\n");
    write(&root.join("charon_bridges/@s~fs.txt"), "(open,Open)\n");
    write(&root.join("charon_bridges/plain.txt"), "(write,Write)\n");
    write(&root.join("gasket_bridges/solo.txt"), "(stat,Stat)\n");

    bridgecheck(root)
        .args(["compare", "-i", "packages.csv", "-o", "out/stats.json"])
        .assert()
        .success();

    let stats: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("out/stats.json")).unwrap()).unwrap();
    assert_eq!(stats["num_packages"], 2);
    assert_eq!(stats["total_a"], 3);
    assert_eq!(stats["num_a_more_b_nonzero"], 1);
    assert_eq!(stats["not_analyzable"][0], "plain:2.0.0");
    assert_eq!(stats["triage"][0]["priority"], "reference_under_reports");

    let a_more = fs::read_to_string(root.join("out/packages_a_more.csv")).unwrap();
    assert_eq!(a_more, "@s/fs:1.0.0\nsolo:0.1.0\n");
    assert!(root.join("out/a_samples.json").exists());
}

#[test]
fn compare_flows_reports_categories() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(&root.join("packages.csv"), "fs:1.0.0\n");
    write(&root.join("flows/fs_nomit.txt"), "(readFileSync,/app/index.js,3)\n");
    write(&root.join("gasket_bridges/fs.txt"), "(readFile,ReadFile)\n");

    bridgecheck(root)
        .args(["compare-flows", "-i", "packages.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"found_by_a\""))
        .stdout(predicate::str::contains("readFileSync"));
}

#[test]
fn clashes_scan_a_bridge_directory() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(&root.join("b/fs.txt"), "(open,Open)\n(open,OpenSync)\n");

    bridgecheck(root)
        .args(["clashes", "--bridges-dir", "b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"all_clashes\": 1"));
}

#[test]
fn runs_without_ledger_reports_nothing_recorded() {
    let dir = tempdir().unwrap();
    bridgecheck(dir.path())
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs recorded yet"));
}

#[test]
fn runs_rejects_unknown_status() {
    let dir = tempdir().unwrap();
    bridgecheck(dir.path())
        .args(["runs", "--status", "pending"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Allowed: ok, skipped, failed"));
}

#[test]
fn extract_skips_packages_with_existing_bridges_and_records_runs() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(&root.join("packages.csv"), "fs:1.0.0\n");
    write(&root.join("gasket_bridges/fs.txt"), "(open,Open)\n");

    bridgecheck(root)
        .env("BRIDGECHECK_NPM", "definitely-not-npm-xyz")
        .args(["extract", "-i", "packages.csv", "-o", "results.json", "-w", "2"])
        .assert()
        .success();

    let results: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("results.json")).unwrap()).unwrap();
    assert_eq!(results["num_packages"], 1);
    assert_eq!(results["skipped"], 1);
    assert_eq!(results["per_package"]["fs:1.0.0"]["status"], "skipped");
    assert_eq!(results["input_sha256"].as_str().map(str::len), Some(64));

    bridgecheck(root)
        .args(["runs", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"skipped\""));
}

#[test]
fn single_package_failure_exits_non_zero() {
    let dir = tempdir().unwrap();
    bridgecheck(dir.path())
        .env("BRIDGECHECK_NPM", "definitely-not-npm-xyz")
        .args(["extract", "--package", "fs:1.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Extraction of fs:1.0.0 failed"));
}
