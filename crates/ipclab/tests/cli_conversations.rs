#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("ephemeral bind should succeed")
        .local_addr()
        .expect("bound listener has an address")
        .port()
}

fn ipclab(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("ipclab should run")
}

fn events(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("every stdout line is a json event"))
        .collect()
}

fn from_label<'a>(events: &'a [Value], label: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|e| {
            e["source"]
                .as_str()
                .map(|s| s.starts_with(&format!("{label} (PID: ")))
                .unwrap_or(false)
        })
        .collect()
}

fn steps(events: &[&Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["payload"]["step"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn pipes_ping_scenario_emits_eight_child_events() {
    let output = ipclab(&["pipes", "PING 1", "PING 2", "PING 3", "FIM"]);
    assert!(output.status.success(), "{output:?}");

    let events = events(&output);
    let child = from_label(&events, "CHILD");
    assert_eq!(child.len(), 8);
    assert_eq!(child.last().unwrap()["type"], "status");
    assert_eq!(child.last().unwrap()["payload"]["step"], "finish");

    let replies: Vec<&str> = from_label(&events, "PARENT")
        .into_iter()
        .filter(|e| e["payload"]["step"] == "received")
        .filter_map(|e| e["payload"]["data"].as_str())
        .collect();
    assert_eq!(replies, vec!["ACK: PING 1", "ACK: PING 2", "ACK: PING 3"]);
}

#[test]
fn every_worker_emits_exactly_one_terminal_event() {
    let output = ipclab(&["pipes"]);
    assert!(output.status.success(), "{output:?}");

    let events = events(&output);
    for label in ["PARENT", "CHILD"] {
        let lane = from_label(&events, label);
        let terminal = lane
            .iter()
            .filter(|e| e["payload"]["step"] == "finish" || e["type"] == "error")
            .count();
        assert_eq!(terminal, 1, "{label}");
        assert_eq!(lane[0]["type"], "status");
    }
}

#[test]
fn sockets_echo_on_chosen_port() {
    let port = free_port().to_string();
    let output = ipclab(&[
        "sockets",
        "--port",
        &port,
        "--ready-delay",
        "300ms",
        "hello",
        "world",
    ]);
    assert!(output.status.success(), "{output:?}");

    let events = events(&output);
    let echoes: Vec<&str> = from_label(&events, "CLIENT")
        .into_iter()
        .filter(|e| e["payload"]["step"] == "received")
        .filter_map(|e| e["payload"]["data"].as_str())
        .collect();
    assert_eq!(echoes, vec!["server echo: hello", "server echo: world"]);
    assert_eq!(
        steps(&from_label(&events, "SERVER")).last().map(String::as_str),
        Some("connection_closed")
    );
}

#[test]
fn shm_counter_alternates_and_ends_at_seed_plus_writes() {
    for wait in ["busy", "condvar"] {
        let output = ipclab(&["shm", "--rounds", "3", "--poll-interval", "5ms", "--wait", wait]);
        assert!(output.status.success(), "{wait}: {output:?}");

        let events = events(&output);
        let writes: Vec<&Value> = events
            .iter()
            .filter(|e| e["payload"]["step"] == "data_written")
            .collect();
        assert_eq!(writes.len(), 6);
        for (i, write) in writes.iter().enumerate() {
            let label = if i % 2 == 0 { "PROCESS 1" } else { "PROCESS 2" };
            assert!(write["source"].as_str().unwrap().starts_with(label));
        }
        assert_eq!(writes.last().unwrap()["payload"]["data"], "106");
        assert_eq!(writes.last().unwrap()["payload"]["size_bytes"], 1);

        let first = from_label(&events, "PROCESS 1");
        assert_eq!(steps(&first)[..2], ["init", "first_write"]);
        assert_eq!(first[1]["payload"]["data"], "100");
    }
}

#[test]
fn shm_message_reaches_reader() {
    let output = ipclab(&["shm", "--mode", "message", "olá, memória"]);
    assert!(output.status.success(), "{output:?}");

    let events = events(&output);
    let read = from_label(&events, "READER")
        .into_iter()
        .find(|e| e["payload"]["step"] == "data_read")
        .expect("reader reports what it read");
    assert_eq!(read["payload"]["data"], "olá, memória");
}

#[test]
fn shm_oversized_message_fails_writer_and_exits_one() {
    let message = "x".repeat(2000);
    let output = ipclab(&["shm", "--mode", "message", &message]);
    assert_eq!(output.status.code(), Some(1));

    let events = events(&output);
    let writer = from_label(&events, "WRITER");
    let last = writer.last().unwrap();
    assert_eq!(last["type"], "error");
    assert_eq!(last["payload"]["step"], "capacity_exceeded");

    let reader = from_label(&events, "READER");
    assert_eq!(reader.last().unwrap()["payload"]["step"], "finish");
}

#[test]
fn sigint_interrupts_waiting_conversation() {
    let port = free_port().to_string();
    let mut child = Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .args(["--log-level", "error", "--format", "json"])
        .args(["sockets", "--port", &port, "--ready-delay", "30s", "--grace", "200ms"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("sockets command should start");

    // The server's listening event is emitted after the signal handler is installed.
    let stdout = child.stdout.take().expect("stdout is piped");
    let mut lines = BufReader::new(stdout).lines();
    let started = Instant::now();
    loop {
        let line = lines
            .next()
            .expect("server should report listening")
            .expect("stdout is readable");
        if line.contains("\"listening\"") {
            break;
        }
        assert!(started.elapsed() < Duration::from_secs(10), "no listening event");
    }

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("kill should run");
    assert!(status.success());

    let status = child.wait().expect("ipclab should exit");
    assert_eq!(status.code(), Some(130));
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn diagnostics_stay_on_stderr_at_debug_level() {
    let output = Command::new(env!("CARGO_BIN_EXE_ipclab"))
        .args(["--log-level", "debug", "--log-format", "json", "--format", "json"])
        .args(["pipes", "ping"])
        .output()
        .expect("ipclab should run");
    assert!(output.status.success(), "{output:?}");

    let events = events(&output);
    assert!(events.iter().all(|e| e["payload"]["step"].is_string()));

    let stderr = String::from_utf8_lossy(&output.stderr);
    let diagnostics: Vec<Value> = stderr
        .lines()
        .map(|line| serde_json::from_str(line).expect("every stderr line is a json log record"))
        .collect();
    assert!(diagnostics
        .iter()
        .any(|d| d["fields"]["message"] == "starting conversation"));
}
