//! Scenario runner: spawn, script, teardown
//!
//! Each variant follows the same lifecycle:
//!
//! 1. clear stale trigger files (`FixtureGuard::prepare`), run the
//!    variant's setup command if any
//! 2. spawn the watcher and attach a `LineReader` to its stdout
//! 3. execute the steps strictly in order
//! 4. close the reader, terminate the process, remove trigger files
//!
//! Steps 1-3 share one `timeout_secs` deadline. Step 4 runs on every exit
//! path, including failures, timeouts and Ctrl+C.

use crate::config::{Scenario, Variant};
use crate::error::{HarnessError, Result};
use crate::expect::{run_step, StepContext};
use crate::fixture::FixtureGuard;
use crate::line_reader::LineReader;
use crate::process::{run_to_completion, WatchProcess};
use crate::reporter::Reporter;
use crate::signals;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Totals for one scenario run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Run every variant of `scenario` (or only `filter`) sequentially
pub async fn run_scenario(
    scenario: &Scenario,
    filter: Option<&str>,
    reporter: &mut dyn Reporter,
) -> Result<RunSummary> {
    let start = Instant::now();
    let variants: Vec<Variant> = scenario
        .variants()
        .into_iter()
        .filter(|v| filter.map_or(true, |f| v.name == f))
        .collect();

    if variants.is_empty() {
        let msg = format!("no variant named {}", filter.unwrap_or_default());
        reporter.on_error(&msg);
        return Err(HarnessError::Config(msg));
    }

    reporter.on_run_start(&scenario.name, variants.len());
    let mut summary = RunSummary::default();

    for variant in &variants {
        let id = variant_id(scenario, variant);
        reporter.on_variant_start(&id);

        if scenario.skipped_here() {
            let msg = format!("skipped on {}", std::env::consts::OS);
            reporter.on_variant_finished(&id, "skip", 0, Some(&msg));
            summary.skipped += 1;
            continue;
        }

        let variant_start = Instant::now();
        let outcome = run_variant(scenario, variant, &id, reporter).await;
        let duration_ms = variant_start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                reporter.on_variant_finished(&id, "pass", duration_ms, None);
                summary.passed += 1;
            }
            Err(e) => {
                let msg = e.to_string();
                warn!(variant = %id, "failed: {}", msg);
                reporter.on_variant_finished(&id, "fail", duration_ms, Some(&msg));
                summary.failed += 1;
                if matches!(e, HarnessError::Interrupted) {
                    break;
                }
            }
        }
    }

    summary.duration_ms = start.elapsed().as_millis() as u64;
    reporter.on_run_finished(summary.passed, summary.failed, summary.skipped, summary.duration_ms);
    Ok(summary)
}

/// `scenario::variant`
pub fn variant_id(scenario: &Scenario, variant: &Variant) -> String {
    format!("{}::{}", scenario.name, variant.name)
}

/// Run one variant with full teardown
pub async fn run_variant(
    scenario: &Scenario,
    variant: &Variant,
    id: &str,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let secs = scenario.timeout_secs;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);

    let fixture = FixtureGuard::new(&scenario.cwd);
    fixture.prepare(&scenario.cleanup)?;

    if let Some(setup) = scenario.setup_spec(variant) {
        // Dropping the future on timeout kills the setup child (kill_on_drop)
        let setup_run = async {
            tokio::select! {
                res = run_to_completion(&setup) => res,
                _ = signals::wait_for_shutdown() => Err(HarnessError::Interrupted),
            }
        };
        match tokio::time::timeout_at(deadline, setup_run).await {
            Ok(res) => res?,
            Err(_) => return Err(HarnessError::Timeout { secs }),
        }
    }

    let mut process = WatchProcess::spawn(&scenario.process_spec(variant)?)?;
    let stdout = process.take_stdout().ok_or_else(|| HarnessError::Spawn {
        command: scenario.command.join(" "),
        source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
    })?;
    let mut lines = LineReader::new(stdout);

    let script = run_steps(scenario, id, &mut lines, &fixture, &mut process, reporter);
    let outcome = match tokio::time::timeout_at(deadline, script).await {
        Ok(res) => res,
        Err(_) => Err(HarnessError::Timeout { secs }),
    };

    // Teardown order: stop reading, stop the process, then remove files
    lines.close();
    let terminated = process.terminate().await;
    drop(fixture);

    info!(variant = %id, "teardown complete");
    outcome?;
    terminated.map(|_| ())
}

async fn run_steps(
    scenario: &Scenario,
    id: &str,
    lines: &mut LineReader,
    fixture: &FixtureGuard,
    process: &mut WatchProcess,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let mut ctx = StepContext {
        lines,
        fixture,
        process,
        files: &scenario.files,
    };

    for (index, step) in scenario.steps.iter().enumerate() {
        if signals::shutdown_requested() {
            return Err(HarnessError::Interrupted);
        }

        let result = tokio::select! {
            res = run_step(step, &mut ctx) => res,
            _ = signals::wait_for_shutdown() => Err(HarnessError::Interrupted),
        };

        match result {
            Ok(outcome) => {
                let detail = outcome.detail();
                reporter.on_step(id, index, step, "pass", Some(&detail));
            }
            Err(e) => {
                reporter.on_step(id, index, step, "fail", Some(&e.to_string()));
                return Err(e);
            }
        }
    }
    Ok(())
}
