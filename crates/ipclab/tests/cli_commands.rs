#![cfg(all(unix, feature = "cli"))]

use std::process::Command;

#[test]
fn transports_json_lists_all_three() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .args(["--format", "json", "transports"])
        .output()
        .expect("transports should run");

    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("transports should emit json");
    let names: Vec<&str> = payload
        .as_array()
        .expect("json array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["pipes", "sockets", "shm"]);
    assert_eq!(payload[0]["workers"][1], "CHILD");
}

#[test]
fn transports_pretty_renders_table() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .args(["--format", "pretty", "transports"])
        .output()
        .expect("transports should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("TRANSPORT"));
    assert!(stdout.contains("SERVER, CLIENT"));
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("ipclab {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn invalid_duration_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .args(["pipes", "--grace", "soon"])
        .output()
        .expect("pipes should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid duration"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .arg("telepathy")
        .output()
        .expect("ipclab should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn pretty_events_are_human_lines() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .args(["--format", "pretty", "pipes", "hello"])
        .output()
        .expect("pipes should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().any(|l| l.starts_with("[CHILD (PID: ")));
    assert!(stdout.contains("ACK: hello"));
}
