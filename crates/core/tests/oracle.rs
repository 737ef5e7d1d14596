use std::path::PathBuf;
use std::sync::Mutex;

use bridgecheck_core::config::ToolsConfig;
use bridgecheck_core::model::SymbolHop;
use bridgecheck_core::services::oracle::{
    build_script, parse_address_list, parse_hop_line, AddressListError, HopLine, Oracle,
    OracleError, ParseMismatch, Resolution,
};
use bridgecheck_core::services::process::{ToolError, ToolInvocation, ToolOutput, ToolRunner};

/// Replays canned debugger output and remembers the script it was handed.
struct ScriptedDebugger {
    output: Result<ToolOutput, fn(&ToolInvocation) -> ToolError>,
    seen: Mutex<Vec<(ToolInvocation, String)>>,
}

impl ScriptedDebugger {
    fn stdout(stdout: &str) -> Self {
        Self {
            output: Ok(ToolOutput { code: Some(0), stdout: stdout.into(), stderr: String::new() }),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn script_path(&self) -> PathBuf {
        let seen = self.seen.lock().unwrap();
        let source = seen[0].0.args.iter().find(|a| a.starts_with("source ")).unwrap();
        PathBuf::from(source.trim_start_matches("source "))
    }
}

impl ToolRunner for ScriptedDebugger {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let source = invocation.args.iter().find(|a| a.starts_with("source ")).unwrap();
        let script = std::fs::read_to_string(source.trim_start_matches("source ")).unwrap();
        self.seen.lock().unwrap().push((invocation.clone(), script));
        match &self.output {
            Ok(out) => Ok(out.clone()),
            Err(make) => Err(make(invocation)),
        }
    }
}

const GDB_OUTPUT: &str = "\
Attaching to process 4242
___ADDRESS___0x1000___ADDRESS______FUNC___ReadFile in section .text of /pkg/build/Release/fs.node___FUNC___
___ADDRESS___0x2000___ADDRESS______FUNC___NOTFOUND___FUNC___
[Inferior 1 (process 4242) detached]
___ADDRESS___0x3000___ADDRESS______FUNC____ZN2fs4OpenEv in section .text of /pkg/build/Release/fs.node___FUNC___
";

#[test]
fn resolves_addresses_and_cleans_up_script() {
    let tools = ToolsConfig::default();
    let runner = ScriptedDebugger::stdout(GDB_OUTPUT);
    let temp = tempfile::tempdir().unwrap();
    let oracle = Oracle::new(&tools, &runner).with_temp_dir(temp.path());

    let resolution = oracle.resolve_symbols(&[0x3000, 0x1000, 0x2000], 4242, None).unwrap();

    assert_eq!(resolution.hops.len(), 2);
    assert_eq!(resolution.by_address.len(), 3);
    assert_eq!(resolution.by_address[&0x2000], Resolution::NotFound);
    assert_eq!(
        resolution.by_address[&0x1000],
        Resolution::Resolved {
            c_function: "ReadFile".into(),
            section: ".text".into(),
            library: "/pkg/build/Release/fs.node".into(),
        }
    );
    assert_eq!(resolution.mismatch, Some(ParseMismatch { requested: 3, resolved: 2 }));

    let seen = runner.seen.lock().unwrap();
    let (invocation, script) = &seen[0];
    assert_eq!(invocation.program, "sudo");
    assert_eq!(invocation.args[0], "gdb");
    assert!(invocation.args.windows(2).any(|w| w[0] == "--pid" && w[1] == "4242"));
    assert!(script.contains("set print demangle off"));
    assert!(script.contains("addr2symbol('0x1000')"));
    drop(seen);

    let script_path = runner.script_path();
    assert_eq!(script_path.extension().and_then(|e| e.to_str()), Some("py"));
    assert!(!script_path.exists(), "script file should be removed");
}

#[test]
fn output_json_is_keyed_by_hex_address() {
    let tools = ToolsConfig::default();
    let runner = ScriptedDebugger::stdout(GDB_OUTPUT);
    let oracle = Oracle::new(&tools, &runner);

    let resolution = oracle.resolve_symbols(&[0x1000, 0x3000], 1, None).unwrap();
    assert_eq!(resolution.mismatch, None);
    let json = resolution.to_output_json();
    assert_eq!(json["0x1000"]["cfunc"], "ReadFile");
    assert_eq!(json["0x3000"]["cfunc"], "_ZN2fs4OpenEv");
    assert_eq!(json["0x3000"]["library"], "/pkg/build/Release/fs.node");
    assert!(json.get("0x2000").is_none());
}

#[test]
fn ptrace_refusal_is_permission_denied() {
    let mut tools = ToolsConfig::default();
    tools.debugger_sudo = false;
    let runner = ScriptedDebugger {
        output: Ok(ToolOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "ptrace: Operation not permitted.".into(),
        }),
        seen: Mutex::new(Vec::new()),
    };
    let oracle = Oracle::new(&tools, &runner);

    let err = oracle.resolve_symbols(&[0x1000], 1, None).unwrap_err();
    assert!(matches!(err, OracleError::PermissionDenied { pid: 1, .. }), "got {err:?}");
    assert_eq!(runner.seen.lock().unwrap()[0].0.program, "gdb");
}

#[test]
fn spawn_permission_error_is_permission_denied() {
    let tools = ToolsConfig::default();
    let runner = ScriptedDebugger {
        output: Err(|inv| ToolError::PermissionDenied { program: inv.program.clone() }),
        seen: Mutex::new(Vec::new()),
    };
    let oracle = Oracle::new(&tools, &runner);

    let err = oracle.resolve_symbols(&[0x1000], 7, None).unwrap_err();
    assert!(matches!(err, OracleError::PermissionDenied { pid: 7, .. }));
}

#[test]
fn other_debugger_failures_are_tool_errors() {
    let tools = ToolsConfig::default();
    let runner = ScriptedDebugger {
        output: Ok(ToolOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "no such process".into(),
        }),
        seen: Mutex::new(Vec::new()),
    };
    let oracle = Oracle::new(&tools, &runner);

    let err = oracle.resolve_symbols(&[0x1000], 7, None).unwrap_err();
    assert!(matches!(err, OracleError::Tool(ToolError::NonZeroExit { .. })));
}

#[test]
fn repeated_addresses_are_looked_up_once() {
    let tools = ToolsConfig::default();
    let runner = ScriptedDebugger::stdout(GDB_OUTPUT);
    let oracle = Oracle::new(&tools, &runner);

    let resolution = oracle.resolve_symbols(&[0x1000, 0x3000, 0x1000], 1, None).unwrap();
    assert_eq!(resolution.mismatch, None);
    assert_eq!(resolution.by_address.len(), 2);

    let seen = runner.seen.lock().unwrap();
    assert_eq!(seen[0].1.matches("addr2symbol('0x1000')").count(), 1);
}

#[test]
fn script_disables_demangling_before_lookups() {
    let script = build_script(&[0x1000, 0x2a]);
    let demangle = script.find("set print demangle off").unwrap();
    let first = script.find("addr2symbol('0x1000')").unwrap();
    assert!(demangle < first);
    assert!(script.contains("addr2symbol('0x2a')"));
    assert!(script.trim_end().ends_with("gdb.execute('quit')"));
}

#[test]
fn parses_literal_fixture_lines() {
    let resolved = "___ADDRESS___0x7f00___ADDRESS______FUNC___ReadFile in section .text of /x/lib.so___FUNC___";
    assert_eq!(
        parse_hop_line(resolved),
        HopLine::Resolved(SymbolHop {
            address: 0x7f00,
            c_function: "ReadFile".into(),
            section: ".text".into(),
            library: "/x/lib.so".into(),
        })
    );
    let missing = "___ADDRESS___4096___ADDRESS______FUNC___NOTFOUND___FUNC___";
    assert_eq!(parse_hop_line(missing), HopLine::NotFound(4096));
    assert_eq!(parse_hop_line("Reading symbols from /bin/node..."), HopLine::Unrecognized);
}

#[test]
fn mangled_symbol_is_kept_verbatim() {
    let line = "___ADDRESS___0x10___ADDRESS______FUNC____ZN4node4OpenEv in section .text of /lib/a.node___FUNC___";
    match parse_hop_line(line) {
        HopLine::Resolved(hop) => assert_eq!(hop.c_function, "_ZN4node4OpenEv"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn addresses_accept_numbers_and_strings() {
    assert_eq!(parse_address_list(r#"[4096, "0x10", "17"]"#).unwrap(), vec![4096, 16, 17]);
    assert!(matches!(parse_address_list(r#"["zz"]"#), Err(AddressListError::InvalidAddress(_))));
}
