//! CLI Integration Tests
//!
//! Spawns the built watch-harness binary and checks exit codes, the `list`
//! subcommand, and NDJSON stdout purity.

use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn binary_path() -> &'static str {
    env!("CARGO_BIN_EXE_watch-harness")
}

fn run_harness(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .env_remove("WATCH_HARNESS_FORMAT")
        .env_remove("WATCH_HARNESS_JUNIT_XML")
        .env("RUST_LOG", "warn")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to execute watch-harness")
}

fn write_scenario(dir: &Path, body: &str) -> String {
    let path = dir.join("scenario.toml");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().to_string()
}

const PASSING: &str = r#"
name = "echo"
command = ["sh", "-c", "echo 'Found 0 errors. Watching for file changes.'; sleep 30"]
timeout_secs = 10
grace_secs = 1
steps = [{ expect = "Watching for file changes." }, "terminate"]

[[variants]]
name = "first"

[[variants]]
name = "second"
"#;

const FAILING: &str = r#"
name = "echo"
command = ["sh", "-c", "echo '0 passing'; sleep 30"]
timeout_secs = 10
grace_secs = 1
steps = [{ expect = "1 passing" }]
"#;

#[test]
fn test_list_prints_variant_ids() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(dir.path(), PASSING);

    let output = run_harness(&[&scenario, "list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["echo::first", "echo::second"]);
}

#[test]
fn test_passing_run_exits_zero() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(dir.path(), PASSING);

    let output = run_harness(&[&scenario]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("2 passed, 0 failed, 0 skipped"));
}

#[test]
fn test_failing_run_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(dir.path(), FAILING);

    let output = run_harness(&[&scenario]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Expected '0 passing' to include '1 passing'."));
}

#[test]
fn test_json_stdout_is_pure_ndjson() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(dir.path(), PASSING);

    let output = run_harness(&["--format", "json", "--variant", "second", &scenario]);
    assert!(output.status.success());

    let events: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).expect("stdout line is not JSON"))
        .collect();
    assert_eq!(events.first().unwrap()["event"], "run_start");
    assert_eq!(events.last().unwrap()["event"], "run_finished");
    assert_eq!(events.last().unwrap()["passed"], 1);
    assert!(events
        .iter()
        .any(|e| e["event"] == "variant_start" && e["id"] == "echo::second"));
}

#[test]
fn test_junit_report_is_written() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(dir.path(), FAILING);
    let report = dir.path().join("junit.xml");

    let output = run_harness(&["--junit-xml", &report.to_string_lossy(), &scenario]);
    assert_eq!(output.status.code(), Some(1));

    let xml = std::fs::read_to_string(&report).unwrap();
    assert!(xml.contains("<testcase name=\"echo\" classname=\"echo\""));
    assert!(xml.contains("failures=\"1\""));
}

#[test]
fn test_missing_scenario_file_fails() {
    let output = run_harness(&["/definitely/not/here.toml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read scenario"));
}
