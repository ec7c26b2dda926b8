//! Exit codes of the `greenroom` binary.
//!
//! Tests that need real agents use the `greenroomd` binary built next to
//! `greenroom` in the same target directory.

use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

const BIN: &str = env!("CARGO_BIN_EXE_greenroom");

fn greenroomd() -> Option<PathBuf> {
    let path = Path::new(BIN).with_file_name(format!("greenroomd{}", std::env::consts::EXE_SUFFIX));
    path.exists().then_some(path)
}

macro_rules! require_greenroomd {
    () => {
        match greenroomd() {
            Some(path) => path,
            None => {
                eprintln!("greenroomd is not built next to greenroom; skipping");
                return;
            }
        }
    };
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn write_scenario(dir: &tempfile::TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("scenario.toml");
    std::fs::write(&path, text).unwrap();
    path
}

fn two_roles(evaluator_command: &str, participant_command: &str) -> String {
    format!(
        r#"
name = "cli-test"

[[roles]]
name = "evaluator"
launch_command = {evaluator_command}
endpoint = "http://127.0.0.1:{}"

[[roles]]
name = "participant"
launch_command = {participant_command}
endpoint = "http://127.0.0.1:{}"

[assessment]
evaluator = "evaluator"
pass_threshold = 1.0

[assessment.config]
input = "5"
"#,
        free_port(),
        free_port(),
    )
}

/// Scenario with a `greenroomd exact-match` evaluator and a `greenroomd`
/// participant of the given kind. Returns the text and both ports.
fn agent_scenario(agent_bin: &Path, participant: &str, config: &str) -> (String, [u16; 2]) {
    let ports = [free_port(), free_port()];
    let text = format!(
        r#"
name = "cli-agents"

[[roles]]
name = "evaluator"
launch_command = ["{bin}", "exact-match", "--port", "{evaluator}"]
endpoint = "http://127.0.0.1:{evaluator}"
startup_timeout_secs = 20

[[roles]]
name = "participant"
launch_command = ["{bin}", "{participant}", "--port", "{participant_port}"]
endpoint = "http://127.0.0.1:{participant_port}"
startup_timeout_secs = 20

[assessment]
evaluator = "evaluator"
participants = ["participant"]
pass_threshold = 1.0
timeout_secs = 30

[assessment.config]
{config}
"#,
        bin = agent_bin.display(),
        evaluator = ports[0],
        participant_port = ports[1],
    );
    (text, ports)
}

/// Running (non-zombie) `greenroomd` processes bound to any of `ports`.
fn live_agents(ports: &[u16]) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    let ports: Vec<String> = ports.iter().map(u16::to_string).collect();
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let dir = entry.path();
            let stat = std::fs::read_to_string(dir.join("stat")).ok()?;
            let state = stat.rsplit_once(')')?.1.trim_start().chars().next()?;
            if state == 'Z' {
                return None;
            }
            let cmdline = std::fs::read(dir.join("cmdline")).ok()?;
            let args: Vec<String> = cmdline
                .split(|b| *b == 0)
                .map(|a| String::from_utf8_lossy(a).into_owned())
                .collect();
            let is_agent = args.first().is_some_and(|a| a.ends_with("greenroomd"));
            let on_port = args.iter().any(|a| ports.contains(a));
            (is_agent && on_port).then(|| args.join(" "))
        })
        .collect()
}

fn assert_no_agents_left(ports: &[u16]) {
    let mut live = live_agents(ports);
    for _ in 0..50 {
        if live.is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
        live = live_agents(ports);
    }
    assert!(live.is_empty(), "agents still running: {live:?}");
    for port in ports {
        assert!(
            TcpStream::connect(("127.0.0.1", *port)).is_err(),
            "port {port} still accepting"
        );
    }
}

fn wait_for_port(port: u16, budget: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < budget {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn wait_with_budget(child: &mut Child, budget: Duration) -> Option<std::process::ExitStatus> {
    let started = Instant::now();
    while started.elapsed() < budget {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    None
}

fn greenroom(args: &[&str]) -> Output {
    Command::new(BIN)
        .args(args)
        .env("GREENROOM_LOG", "warn")
        .output()
        .unwrap()
}

#[test]
fn test_check_valid_scenario_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(&dir, &two_roles(r#""sleep 30""#, r#"["sleep", "30"]"#));

    let out = greenroom(&["check", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("cli-test"));
    assert!(stdout.contains("participant"));
}

#[test]
fn test_check_invalid_scenario_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(
        &dir,
        r#"
[[roles]]
name = "evaluator"
launch_command = "sleep 30"
endpoint = "ftp://127.0.0.1:1"
"#,
    );

    let out = greenroom(&["check", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("endpoint"));
}

#[test]
fn test_missing_scenario_exits_two() {
    let out = greenroom(&["run", "/nonexistent/greenroom/scenario.toml"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_bad_launch_command_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(
        &dir,
        &two_roles(r#"["/nonexistent/greenroom-evaluator"]"#, r#""sleep 30""#),
    );

    let out = greenroom(&["run", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("startup_timeout"));
}

#[test]
fn test_never_healthy_role_exits_two_after_startup_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scenario(&dir, &two_roles(r#""sleep 30""#, r#""sleep 30""#));

    let started = Instant::now();
    let out = greenroom(&[
        "run",
        path.to_str().unwrap(),
        "--startup-timeout-secs",
        "1",
    ]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("startup_timeout"));
    // The sleeping role was killed, not waited for.
    assert!(started.elapsed() < Duration::from_secs(20));
}

// ----------------------------------------------------------------------------
// Completed assessments with real agents
// ----------------------------------------------------------------------------

#[test]
fn test_run_passing_assessment_exits_zero() {
    let agent_bin = require_greenroomd!();
    let dir = tempfile::tempdir().unwrap();
    let (text, ports) = agent_scenario(&agent_bin, "echo", r#"input = "5""#);
    let path = write_scenario(&dir, &text);

    let out = greenroom(&["run", path.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(out.status.code(), Some(0), "{stdout}");
    assert!(stdout.contains(r#""passed": true"#), "{stdout}");
    assert!(stdout.contains("transcript.json"), "{stdout}");
    assert_no_agents_left(&ports);
}

#[test]
fn test_run_wrong_answer_exits_one() {
    let agent_bin = require_greenroomd!();
    let dir = tempfile::tempdir().unwrap();
    let (text, ports) = agent_scenario(
        &agent_bin,
        "echo",
        r#"input = "5"
expected = "6""#,
    );
    let path = write_scenario(&dir, &text);

    let out = greenroom(&["run", path.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(out.status.code(), Some(1), "{stdout}");
    assert!(stdout.contains(r#""passed": false"#), "{stdout}");
    assert_no_agents_left(&ports);
}

#[test]
fn test_run_silent_participant_exits_two_on_timeout() {
    let agent_bin = require_greenroomd!();
    let dir = tempfile::tempdir().unwrap();
    let (text, ports) = agent_scenario(
        &agent_bin,
        "silent",
        r#"input = "5"
participant_timeout_ms = 300"#,
    );
    let path = write_scenario(&dir, &text);

    let out = greenroom(&["run", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("error [timeout]"));
    assert!(out.stdout.is_empty());
    assert_no_agents_left(&ports);
}

#[test]
fn test_bad_participant_command_leaves_no_agents() {
    let agent_bin = require_greenroomd!();
    let dir = tempfile::tempdir().unwrap();
    let (text, ports) = agent_scenario(&agent_bin, "echo", r#"input = "5""#);
    let text = text.replacen(
        &format!(r#"["{}", "echo","#, agent_bin.display()),
        r#"["/nonexistent/greenroom-participant","#,
        1,
    );
    let path = write_scenario(&dir, &text);

    let out = greenroom(&["run", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("startup_timeout"));
    assert_no_agents_left(&ports);
}

// ----------------------------------------------------------------------------
// Interrupted runs
// ----------------------------------------------------------------------------

fn interrupt_run(signal: &str) {
    let agent_bin = require_greenroomd!();
    let dir = tempfile::tempdir().unwrap();
    let (text, ports) = agent_scenario(&agent_bin, "silent", r#"input = "5""#);
    let path = write_scenario(&dir, &text);

    let mut child = Command::new(BIN)
        .args(["run", path.to_str().unwrap()])
        .env("GREENROOM_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // The participant launches last; once it answers the assessment is
    // waiting on it.
    assert!(wait_for_port(ports[1], Duration::from_secs(20)));
    std::thread::sleep(Duration::from_millis(500));
    let sent = Command::new("kill")
        .args([signal, &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let status = wait_with_budget(&mut child, Duration::from_secs(20));
    if status.is_none() {
        let _ = child.kill();
    }
    let status = status.expect("greenroom did not exit after the signal");
    let stderr = std::io::read_to_string(child.stderr.take().unwrap()).unwrap();
    assert_eq!(status.code(), Some(2), "{stderr}");
    assert!(stderr.contains("error [interrupted]"), "{stderr}");
    assert_no_agents_left(&ports);
}

#[test]
fn test_sigint_during_run_tears_down_every_agent() {
    interrupt_run("-INT");
}

#[test]
fn test_sigterm_during_run_tears_down_every_agent() {
    interrupt_run("-TERM");
}
