use std::fs;

use bridgecheck::{load_effective_config, parse_log_level, require_input, sha256_file};
use tempfile::tempdir;

#[test]
fn log_levels_map_onto_tracing_directives() {
    assert_eq!(parse_log_level("critical").unwrap(), "error");
    assert_eq!(parse_log_level("WARNING").unwrap(), "warn");
    assert_eq!(parse_log_level("debug").unwrap(), "debug");
    assert!(parse_log_level("trace").is_err());
}

#[test]
fn sha256_of_known_content() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("abc.txt");
    fs::write(&path, "abc").unwrap();
    assert_eq!(
        sha256_file(&path).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn relative_data_root_resolves_against_config_location() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("harness.json");
    fs::write(&path, r#"{"data_root": "data", "workers": 3}"#).unwrap();

    let config = load_effective_config(path.to_str()).unwrap();
    assert_eq!(config.workers, 3);
    assert_eq!(config.data_root, dir.path().canonicalize().unwrap().join("data"));
}

#[test]
fn require_input_rejects_absent_values() {
    assert!(require_input(None).is_err());
    assert!(require_input(Some("/definitely/not/here.csv")).is_err());
}
