//! Line Reader Integration Tests
//!
//! Feeds the reader from real child processes rather than in-memory mocks.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use watch_harness::error::HarnessError;
use watch_harness::line_reader::LineReader;

fn spawn_sh(script: &str) -> tokio::process::Child {
    Command::new("sh")
        .args(["-c", script])
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn sh")
}

#[tokio::test]
async fn test_large_burst_keeps_order() {
    let mut child = spawn_sh("i=1; while [ $i -le 2000 ]; do echo line-$i; i=$((i+1)); done");
    let mut reader = LineReader::new(child.stdout.take().unwrap());

    for i in 1..=2000 {
        assert_eq!(reader.next_line().await.unwrap(), format!("line-{}", i));
    }
    assert!(matches!(
        reader.next_line().await,
        Err(HarnessError::LineReaderClosed)
    ));
    child.wait().await.unwrap();
}

#[tokio::test]
async fn test_slow_producer_suspends_reader() {
    let mut child = spawn_sh("echo a; sleep 0.2; echo b; sleep 0.2; echo c");
    let mut reader = LineReader::new(child.stdout.take().unwrap());

    assert_eq!(reader.next_line().await.unwrap(), "a");
    assert_eq!(reader.buffered(), 0);
    assert_eq!(reader.next_line().await.unwrap(), "b");
    assert_eq!(reader.next_line().await.unwrap(), "c");
    child.wait().await.unwrap();
}

#[tokio::test]
async fn test_pending_read_fails_when_child_exits() {
    let mut child = spawn_sh("echo last; sleep 0.2");
    let mut reader = LineReader::new(child.stdout.take().unwrap());

    assert_eq!(reader.next_line().await.unwrap(), "last");
    let res = tokio::time::timeout(Duration::from_secs(5), reader.next_line()).await;
    let err = res.expect("read should fail once stdout closes").unwrap_err();
    assert_eq!(err.to_string(), "Line reader closed.");
    child.wait().await.unwrap();
}

#[tokio::test]
async fn test_crlf_output_is_trimmed() {
    let mut child = spawn_sh("printf 'Run mocha.\\r\\n1 passing\\r\\n'");
    let mut reader = LineReader::new(child.stdout.take().unwrap());

    assert_eq!(reader.next_line().await.unwrap(), "Run mocha.");
    assert_eq!(reader.next_line().await.unwrap(), "1 passing");
    child.wait().await.unwrap();
}
