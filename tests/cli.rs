use std::{fs, path::Path, process::Command};

const SMART_LOCK: &str = include_str!("../demos/smart_lock.fsm");

fn fsmc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fsmc"))
}

fn write_input(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path.to_str().unwrap().to_owned()
}

#[test]
fn writes_verilog_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "smart_lock.fsm", SMART_LOCK);
    let output = dir.path().join("smart_lock.v");
    let report = dir.path().join("report.json");

    let status = fsmc()
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--report")
        .arg(&report)
        .arg("--async-reset")
        .status()
        .unwrap();

    assert!(status.success());

    let verilog = fs::read_to_string(&output).unwrap();
    assert!(verilog.contains("module smart_lock ("));
    assert!(verilog.contains("always @(posedge clk or posedge rst) begin"));

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["encoding"], "binary");
    assert_eq!(report["counters"].as_array().unwrap().len(), 2);
}

#[test]
fn hard_errors_fail_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let text = SMART_LOCK.replace("START_TIMER(5min), ", "");
    let input = write_input(dir.path(), "broken.fsm", &text);
    let output = dir.path().join("broken.v");

    let result = fsmc()
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--diagnostics")
        .arg("json")
        .output()
        .unwrap();

    assert!(!result.status.success());
    assert!(!output.exists());

    let stderr = String::from_utf8_lossy(&result.stderr);
    let json_end = stderr.find("\n]").map(|end| end + 2).unwrap();
    let diagnostics: serde_json::Value = serde_json::from_str(&stderr[..json_end]).unwrap();

    let errors: Vec<_> = diagnostics
        .as_array()
        .unwrap()
        .iter()
        .filter(|diagnostic| diagnostic["severity"] == "error")
        .collect();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["kind"], "OrphanedTimeout");
}

#[test]
fn syntax_errors_are_rendered_with_source() {
    let dir = tempfile::tempdir().unwrap();
    let text = SMART_LOCK.replace("-> TO(DOOR_OPEN)", "-> DOOR_OPEN");
    let input = write_input(dir.path(), "typo.fsm", &text);

    let result = fsmc().arg(&input).output().unwrap();

    assert!(!result.status.success());
    assert!(result.stdout.is_empty());

    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("typo.fsm:"));
    assert!(stderr.contains("Build failed with 1 error"));
}

#[test]
fn ir_round_trip_through_the_cli() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "smart_lock.fsm", SMART_LOCK);
    let ir = dir.path().join("smart_lock.json");
    let direct = dir.path().join("direct.v");
    let via_ir = dir.path().join("via_ir.v");

    let emit_ir = fsmc()
        .args([input.as_str(), "--emit", "ir", "-o"])
        .arg(&ir)
        .status()
        .unwrap();

    assert!(emit_ir.success());

    let compile = fsmc().arg(&input).arg("-o").arg(&direct).status().unwrap();
    assert!(compile.success());

    let from_ir = fsmc()
        .arg(&ir)
        .args(["--from-ir", "--module", "smart_lock", "-o"])
        .arg(&via_ir)
        .status()
        .unwrap();

    assert!(from_ir.success());
    assert_eq!(
        fs::read_to_string(&direct).unwrap(),
        fs::read_to_string(&via_ir).unwrap()
    );
}

#[test]
fn table_goes_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "smart_lock.fsm", SMART_LOCK);

    let result = fsmc().args([input.as_str(), "--emit", "table"]).output().unwrap();
    assert!(result.status.success());

    let table = String::from_utf8_lossy(&result.stdout);
    assert!(table.starts_with("GLOBAL:"));
    assert!(table.contains("ON_EVENT(USER_ENTERS_MASTER_CODE)"));
}
