//! Process Controller Integration Tests
//!
//! Verifies that termination reaches the whole process group, including
//! grandchildren that ignore SIGINT, and that Drop never leaks a watcher.

use std::time::{Duration, Instant};
use watch_harness::line_reader::LineReader;
use watch_harness::process::{ProcessSpec, WatchProcess};

fn sh(script: &str) -> ProcessSpec {
    ProcessSpec::new("sh", std::env::temp_dir())
        .args(["-c", script])
        .grace(Duration::from_millis(500))
}

/// A pid counts as gone once /proc has no entry or it is a zombie
fn is_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            // state follows the parenthesised command name
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next());
            state != Some("Z")
        }
        Err(_) => false,
    }
}

fn wait_until_dead(pid: i32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_terminate_reaches_background_grandchild() {
    // Background jobs of a non-interactive sh ignore SIGINT
    let mut proc = WatchProcess::spawn(&sh("sleep 30 & echo $!; wait")).unwrap();
    let mut lines = LineReader::new(proc.take_stdout().unwrap());
    let grandchild: i32 = lines.next_line().await.unwrap().trim().parse().unwrap();
    assert!(is_alive(grandchild));

    proc.terminate().await.unwrap();

    assert!(!proc.is_running());
    assert!(wait_until_dead(grandchild, Duration::from_secs(3)));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_drop_kills_process_group() {
    let grandchild = {
        let mut proc = WatchProcess::spawn(&sh("sleep 30 & echo $!; wait")).unwrap();
        let mut lines = LineReader::new(proc.take_stdout().unwrap());
        let pid: i32 = lines.next_line().await.unwrap().trim().parse().unwrap();
        assert!(proc.pid() > 0);
        pid
    };

    assert!(wait_until_dead(grandchild, Duration::from_secs(3)));
}

#[tokio::test]
async fn test_terminate_after_natural_exit() {
    let mut proc = WatchProcess::spawn(&sh("echo done")).unwrap();
    let mut lines = LineReader::new(proc.take_stdout().unwrap());
    assert_eq!(lines.next_line().await.unwrap(), "done");
    assert!(lines.next_line().await.is_err());

    let status = proc.terminate().await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn test_cwd_and_env_are_applied() {
    let dir = tempfile::TempDir::new().unwrap();
    let spec = ProcessSpec::new("sh", dir.path())
        .args(["-c", "pwd; echo $WATCH_FLAG"])
        .env("WATCH_FLAG", "on");
    let mut proc = WatchProcess::spawn(&spec).unwrap();
    let mut lines = LineReader::new(proc.take_stdout().unwrap());

    let cwd = lines.next_line().await.unwrap();
    assert_eq!(
        std::fs::canonicalize(cwd).unwrap(),
        std::fs::canonicalize(dir.path()).unwrap()
    );
    assert_eq!(lines.next_line().await.unwrap(), "on");
    proc.terminate().await.unwrap();
}
