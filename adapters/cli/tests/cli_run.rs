use std::process::Command;

#[test]
fn demo_run_prints_summary() {
    let output = Command::new(env!("CARGO_BIN_EXE_warden"))
        .args(["run", "--ticks", "50"])
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to invoke the warden binary");

    assert!(output.status.success(), "warden run should succeed");
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("ticks run: "));
    assert!(stdout.contains("dog barks: 0"));
}

#[test]
fn json_trace_is_line_delimited() {
    let output = Command::new(env!("CARGO_BIN_EXE_warden"))
        .args(["run", "--ticks", "50", "--trace-json", "--log", "off"])
        .output()
        .expect("failed to invoke the warden binary");

    assert!(output.status.success(), "warden run --trace-json should succeed");
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert_eq!(stdout.lines().filter(|line| line.contains("\"agent\":{")).count(), 2);
    for line in stdout.lines() {
        let value: serde_json::Value = serde_json::from_str(line).expect("json line");
        assert!(value["tick"].is_u64());
    }
}

#[test]
fn missing_scenario_file_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_warden"))
        .args(["run", "--scenario", "does/not/exist.toml"])
        .output()
        .expect("failed to invoke the warden binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("failed to read scenario"));
}
