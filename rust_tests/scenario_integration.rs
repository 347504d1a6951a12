//! Scenario Integration Tests
//!
//! Runs the shipped watcher scenario against a shell script that prints what
//! the mocha-typescript watcher prints, plus a set of failure paths (mismatch,
//! early exit, timeout) to check teardown always happens.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use watch_harness::config::{Scenario, Step};
use watch_harness::reporter::Reporter;
use watch_harness::runner::run_scenario;

/// Collects reporter events as plain strings
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl Reporter for Recorder {
    fn on_run_start(&mut self, scenario: &str, count: usize) {
        self.events.push(format!("run_start {} {}", scenario, count));
    }

    fn on_variant_start(&mut self, id: &str) {
        self.events.push(format!("variant_start {}", id));
    }

    fn on_step(&mut self, _id: &str, index: usize, step: &Step, status: &str, detail: Option<&str>) {
        self.events.push(format!(
            "step {} {} {} => {}",
            index,
            status,
            step,
            detail.unwrap_or_default()
        ));
    }

    fn on_variant_finished(&mut self, id: &str, status: &str, _duration_ms: u64, message: Option<&str>) {
        self.events.push(format!(
            "variant_finished {} {} {}",
            id,
            status,
            message.unwrap_or_default()
        ));
    }

    fn on_run_finished(&mut self, passed: usize, failed: usize, skipped: usize, _duration_ms: u64) {
        self.events
            .push(format!("run_finished {} {} {}", passed, failed, skipped));
    }

    fn on_error(&mut self, message: &str) {
        self.events.push(format!("error {}", message));
    }
}

impl Recorder {
    fn finished(&self) -> Vec<&String> {
        self.events
            .iter()
            .filter(|e| e.starts_with("variant_finished"))
            .collect()
    }
}

fn manifest_path(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(rel)
}

/// The shipped watcher scenario, pointed at the fake watcher in a temp dir
fn fake_watcher_scenario(dir: &TempDir) -> Scenario {
    std::fs::copy(
        manifest_path("rust_tests/fixtures/fake-watch.sh"),
        dir.path().join("fake-watch.sh"),
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("test")).unwrap();

    let mut scenario = Scenario::load(&manifest_path("scenarios/watcher.toml")).unwrap();
    scenario.cwd = dir.path().to_path_buf();
    scenario.command = vec!["sh".to_string(), "fake-watch.sh".to_string()];
    scenario.timeout_secs = 20;
    scenario.grace_secs = 2;
    for variant in &mut scenario.variants {
        variant.setup.clear();
    }
    scenario
}

fn sh_scenario(dir: &TempDir, script: &str, steps: &str) -> Scenario {
    let toml = format!(
        r#"
name = "sh"
command = ["sh", "-c", {script:?}]
timeout_secs = 10
grace_secs = 1
steps = {steps}
"#
    );
    Scenario::from_toml(&toml, dir.path()).unwrap()
}

#[tokio::test]
async fn test_watcher_scenario_passes_against_fake_watcher() {
    let dir = TempDir::new().unwrap();
    let scenario = fake_watcher_scenario(&dir);
    let mut recorder = Recorder::default();

    let summary = run_scenario(&scenario, None, &mut recorder).await.unwrap();

    assert!(summary.success(), "events: {:#?}", recorder.events);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 0);
    // Trigger file is removed after every variant
    assert!(!dir.path().join("test/new.ts").exists());
}

#[tokio::test]
async fn test_watcher_scenario_sees_rebuild_before_rerun() {
    let dir = TempDir::new().unwrap();
    let scenario = fake_watcher_scenario(&dir);
    let mut recorder = Recorder::default();

    run_scenario(&scenario, Some("can run watcher"), &mut recorder)
        .await
        .unwrap();

    let steps: Vec<&String> = recorder.events.iter().filter(|e| e.starts_with("step")).collect();
    let write = steps.iter().position(|e| e.contains("write test/new.ts")).unwrap();
    let rebuild = steps
        .iter()
        .position(|e| e.contains("File change detected"))
        .unwrap();
    let failing = steps.iter().position(|e| e.contains("1 failing")).unwrap();
    assert!(write < rebuild && rebuild < failing);
    assert!(steps.iter().any(|e| e.contains("=>     1) method2")));
}

#[tokio::test]
async fn test_unexpected_output_fails_with_mismatch() {
    let dir = TempDir::new().unwrap();
    let mut scenario = fake_watcher_scenario(&dir);
    for variant in &mut scenario.variants {
        variant.env.insert("FAILING_COUNT".to_string(), "2".to_string());
    }
    let mut recorder = Recorder::default();

    let summary = run_scenario(&scenario, Some("can run watcher"), &mut recorder)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    let finished = recorder.finished();
    assert!(finished[0].contains("Expected '  2 failing' to include '1 failing'."));
    assert!(!dir.path().join("test/new.ts").exists());
}

#[tokio::test]
async fn test_early_exit_reports_line_reader_closed() {
    let dir = TempDir::new().unwrap();
    let scenario = sh_scenario(
        &dir,
        "echo one",
        r#"[{ expect = "one" }, { expect = "two" }]"#,
    );
    let mut recorder = Recorder::default();

    let summary = run_scenario(&scenario, None, &mut recorder).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert!(recorder.finished()[0].contains("Line reader closed."));
}

#[tokio::test]
async fn test_silent_process_times_out() {
    let dir = TempDir::new().unwrap();
    let mut scenario = sh_scenario(&dir, "sleep 30", r#"[{ expect = "never" }]"#);
    scenario.timeout_secs = 1;
    let mut recorder = Recorder::default();

    let start = std::time::Instant::now();
    let summary = run_scenario(&scenario, None, &mut recorder).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert!(recorder.finished()[0].contains("timed out after 1s"));
    // SIGINT ends `sleep` well before its 30s
    assert!(start.elapsed() < std::time::Duration::from_secs(10));
}

#[tokio::test]
async fn test_stale_trigger_file_removed_before_spawn() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("stale.txt"), "left over").unwrap();
    let mut scenario = sh_scenario(
        &dir,
        "if [ -f stale.txt ]; then echo stale; else echo clean; fi; sleep 30",
        r#"[{ expect = "clean" }, "terminate"]"#,
    );
    scenario.cleanup = vec!["stale.txt".to_string()];
    let mut recorder = Recorder::default();

    let summary = run_scenario(&scenario, None, &mut recorder).await.unwrap();
    assert!(summary.success(), "events: {:#?}", recorder.events);
}

#[tokio::test]
async fn test_variant_env_reaches_process() {
    let dir = TempDir::new().unwrap();
    let toml = r#"
name = "env"
command = ["sh", "-c", "echo mode=$MODE; sleep 30"]
env = { MODE = "plain" }
steps = [{ expect = "mode=types" }]

[[variants]]
name = "types"
env = { MODE = "types" }
"#;
    let scenario = Scenario::from_toml(toml, dir.path()).unwrap();
    let mut recorder = Recorder::default();

    let summary = run_scenario(&scenario, None, &mut recorder).await.unwrap();
    assert!(summary.success(), "events: {:#?}", recorder.events);
}

#[tokio::test]
async fn test_failing_setup_fails_variant() {
    let dir = TempDir::new().unwrap();
    let toml = r#"
name = "setup"
command = ["sh", "-c", "echo ready; sleep 30"]
steps = [{ expect = "ready" }]

[[variants]]
name = "broken install"
setup = ["sh", "-c", "exit 7"]
"#;
    let scenario = Scenario::from_toml(toml, dir.path()).unwrap();
    let mut recorder = Recorder::default();

    let summary = run_scenario(&scenario, None, &mut recorder).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(recorder.finished()[0].contains("setup `sh -c exit 7` failed"));
}

#[tokio::test]
async fn test_slow_setup_counts_against_timeout() {
    let dir = TempDir::new().unwrap();
    let toml = r#"
name = "setup"
command = ["sh", "-c", "echo ready; sleep 30"]
timeout_secs = 1
steps = [{ expect = "ready" }]

[[variants]]
name = "hung install"
setup = ["sleep", "6"]
"#;
    let scenario = Scenario::from_toml(toml, dir.path()).unwrap();
    let mut recorder = Recorder::default();

    let start = std::time::Instant::now();
    let summary = run_scenario(&scenario, None, &mut recorder).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.passed, 0);
    assert!(recorder.finished()[0].contains("timed out after 1s"));
    assert!(start.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn test_skipped_platform_never_spawns() {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        r#"
name = "skipped"
command = ["definitely-not-a-real-program-xyz"]
skip_on = [{:?}]
steps = ["terminate"]
"#,
        std::env::consts::FAMILY
    );
    let scenario = Scenario::from_toml(&toml, dir.path()).unwrap();
    let mut recorder = Recorder::default();

    let summary = run_scenario(&scenario, None, &mut recorder).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(recorder.finished()[0].contains("skip"));
}

#[tokio::test]
async fn test_unknown_variant_filter_is_an_error() {
    let dir = TempDir::new().unwrap();
    let scenario = fake_watcher_scenario(&dir);
    let mut recorder = Recorder::default();

    let err = run_scenario(&scenario, Some("nope"), &mut recorder)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no variant named nope"));
    assert_eq!(recorder.events, vec!["error no variant named nope".to_string()]);
}
