use bridgecheck_core::model::{BridgeSet, CanonicalBridge};
use bridgecheck_core::services::bridge_file::{
    parse_bridge_line, read_bridge_file, read_bridge_file_if_exists, write_bridge_file, LineError,
};

#[test]
fn tuple_line_parses_as_is() {
    let b = parse_bridge_line("(readFile,ReadFile)").unwrap().unwrap();
    assert_eq!(b, CanonicalBridge::new("readFile", "ReadFile"));
}

#[test]
fn legacy_json_line_is_canonicalized() {
    let b = parse_bridge_line(r#"{"jsname":"a.b.open","cfunc":"fs::Open(int)"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(b, CanonicalBridge::new("open", "Open"));
}

#[test]
fn junk_line_is_rejected() {
    assert!(matches!(parse_bridge_line("readFile ReadFile"), Err(LineError::Malformed)));
    assert!(matches!(parse_bridge_line("(,x)"), Err(LineError::Malformed)));
    assert!(matches!(parse_bridge_line("   "), Ok(None)));
}

#[test]
fn written_files_are_sorted_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/pkg.txt");
    let set: BridgeSet =
        [CanonicalBridge::new("write", "Write"), CanonicalBridge::new("open", "Open")]
            .into_iter()
            .collect();

    write_bridge_file(&path, &set).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "(open,Open)\n(write,Write)\n");
    assert_eq!(read_bridge_file(&path).unwrap(), set);
    assert_eq!(read_bridge_file_if_exists(&dir.path().join("absent.txt")).unwrap(), None);
}
