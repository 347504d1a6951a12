//! Output assertions and step execution
//!
//! Each step consumes lines from the `LineReader` strictly in order; nothing
//! is searched ahead or skipped implicitly.

use crate::config::Step;
use crate::error::{HarnessError, Result};
use crate::fixture::FixtureGuard;
use crate::line_reader::LineReader;
use crate::process::WatchProcess;
use std::collections::BTreeMap;
use std::process::ExitStatus;
use tracing::debug;

/// Fail with a `Mismatch` unless `actual` contains `expected`
pub fn assert_contains(actual: &str, expected: &str) -> Result<()> {
    if actual.contains(expected) {
        Ok(())
    } else {
        Err(HarnessError::Mismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Read the next line and check it contains `expected`
pub async fn expect_line(lines: &mut LineReader, expected: &str) -> Result<String> {
    let line = lines.next_line().await?;
    assert_contains(&line, expected)?;
    Ok(line)
}

/// Read and discard `count` lines, returning them for diagnostics
pub async fn skip_lines(lines: &mut LineReader, count: usize) -> Result<Vec<String>> {
    let mut skipped = Vec::with_capacity(count);
    for _ in 0..count {
        skipped.push(lines.next_line().await?);
    }
    Ok(skipped)
}

/// What a successful step did
#[derive(Debug)]
pub enum StepOutcome {
    Skipped(Vec<String>),
    Matched(String),
    Wrote(std::path::PathBuf),
    Removed,
    Terminated(ExitStatus),
}

impl StepOutcome {
    /// Short description for reporters
    pub fn detail(&self) -> String {
        match self {
            StepOutcome::Skipped(lines) => lines.join(" | "),
            StepOutcome::Matched(line) => line.clone(),
            StepOutcome::Wrote(path) => path.display().to_string(),
            StepOutcome::Removed => String::new(),
            StepOutcome::Terminated(status) => status.to_string(),
        }
    }
}

/// Everything a step may touch
pub struct StepContext<'a> {
    pub lines: &'a mut LineReader,
    pub fixture: &'a FixtureGuard,
    pub process: &'a mut WatchProcess,
    pub files: &'a BTreeMap<String, String>,
}

/// Execute one step of the script
pub async fn run_step(step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
    debug!("step: {}", step);
    match step {
        Step::Skip(count) => skip_lines(ctx.lines, *count).await.map(StepOutcome::Skipped),
        Step::Expect(expected) => expect_line(ctx.lines, expected).await.map(StepOutcome::Matched),
        Step::Write(path) => {
            let contents = ctx
                .files
                .get(path)
                .ok_or_else(|| HarnessError::Config(format!("no [files] entry for {}", path)))?;
            ctx.fixture.write(path, contents).map(StepOutcome::Wrote)
        }
        Step::Remove(path) => ctx.fixture.remove(path).map(|()| StepOutcome::Removed),
        Step::Terminate => ctx.process.terminate().await.map(StepOutcome::Terminated),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessSpec;
    use tempfile::TempDir;

    #[test]
    fn test_assert_contains_match() {
        assert_contains("  1 passing (12ms)", "1 passing").unwrap();
    }

    #[test]
    fn test_assert_contains_mismatch_message() {
        let err = assert_contains("  2 failing", "1 failing").unwrap_err();
        assert_eq!(err.to_string(), "Expected '  2 failing' to include '1 failing'.");
    }

    #[test]
    fn test_assert_contains_is_case_sensitive() {
        assert!(assert_contains("run mocha.", "Run mocha.").is_err());
    }

    #[tokio::test]
    async fn test_expect_line_consumes_one_line() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Run mocha.\nTest1\n")
            .build();
        let mut lines = LineReader::new(mock);

        expect_line(&mut lines, "Run mocha.").await.unwrap();
        let err = expect_line(&mut lines, "Test2").await.unwrap_err();
        assert!(matches!(err, HarnessError::Mismatch { .. }));
    }

    #[tokio::test]
    async fn test_skip_lines_returns_skipped() {
        let mock = tokio_test::io::Builder::new().read(b"a\nb\nc\n").build();
        let mut lines = LineReader::new(mock);

        let skipped = skip_lines(&mut lines, 2).await.unwrap();
        assert_eq!(skipped, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(lines.next_line().await.unwrap(), "c");
    }

    #[tokio::test]
    async fn test_skip_past_end_fails_closed() {
        let mock = tokio_test::io::Builder::new().read(b"only\n").build();
        let mut lines = LineReader::new(mock);

        let err = skip_lines(&mut lines, 3).await.unwrap_err();
        assert!(matches!(err, HarnessError::LineReaderClosed));
    }

    #[tokio::test]
    async fn test_run_step_write_and_terminate() {
        let dir = TempDir::new().unwrap();
        let spec = ProcessSpec::new("sh", dir.path()).args(["-c", "echo up; sleep 30"]);
        let mut process = WatchProcess::spawn(&spec).unwrap();
        let mut lines = LineReader::new(process.take_stdout().unwrap());
        let fixture = FixtureGuard::new(dir.path());
        let mut files = BTreeMap::new();
        files.insert("test/new.ts".to_string(), "class Test2 {}".to_string());

        let mut ctx = StepContext {
            lines: &mut lines,
            fixture: &fixture,
            process: &mut process,
            files: &files,
        };

        let out = run_step(&Step::Expect("up".into()), &mut ctx).await.unwrap();
        assert_eq!(out.detail(), "up");

        let out = run_step(&Step::Write("test/new.ts".into()), &mut ctx).await.unwrap();
        assert!(matches!(out, StepOutcome::Wrote(_)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("test/new.ts")).unwrap(),
            "class Test2 {}"
        );

        run_step(&Step::Remove("test/new.ts".into()), &mut ctx).await.unwrap();
        assert!(!dir.path().join("test/new.ts").exists());

        let out = run_step(&Step::Terminate, &mut ctx).await.unwrap();
        assert!(matches!(out, StepOutcome::Terminated(_)));
        assert!(!process.is_running());
    }
}
