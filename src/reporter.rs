//! Reporter Module: Trait-based output for Human (CLI) and Machine (JSON) formats
//!
//! - `Reporter` trait defines the event callbacks
//! - `JsonReporter` outputs NDJSON to stdout (for --format=json)
//! - `HumanReporter` outputs human-readable text to stderr
//!
//! ## Stdout Purity
//!
//! When JsonReporter is active, ONLY valid JSON goes to stdout. Logs are
//! routed to stderr by the tracing subscriber.
//!
//! Variant ids have the form `scenario::variant`.

use crate::config::Step;
use serde::Serialize;

/// Machine-readable events for JSON output
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent<'a> {
    /// Emitted at start of a scenario run
    RunStart { scenario: &'a str, count: usize },
    /// Emitted when a variant spawns its process
    VariantStart { id: &'a str },
    /// Emitted after every script step
    Step {
        id: &'a str,
        index: usize,
        step: &'a Step,
        status: &'a str, // "pass", "fail"
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<&'a str>,
    },
    /// Emitted when a variant completes
    VariantFinished {
        id: &'a str,
        status: &'a str, // "pass", "fail", "skip"
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
    },
    /// Emitted at end of the run
    RunFinished {
        passed: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
    },
    /// Emitted on fatal error
    Error { message: &'a str },
}

/// Reporter trait for output abstraction
pub trait Reporter {
    /// Called at start of a scenario run
    fn on_run_start(&mut self, scenario: &str, count: usize);

    /// Called when a variant begins
    fn on_variant_start(&mut self, id: &str);

    /// Called after each step
    fn on_step(&mut self, id: &str, index: usize, step: &Step, status: &str, detail: Option<&str>);

    /// Called when a variant completes
    fn on_variant_finished(&mut self, id: &str, status: &str, duration_ms: u64, message: Option<&str>);

    /// Called at end of the run
    fn on_run_finished(&mut self, passed: usize, failed: usize, skipped: usize, duration_ms: u64);

    /// Called on fatal error
    fn on_error(&mut self, message: &str);
}

/// JSON Reporter - outputs NDJSON to stdout
pub struct JsonReporter;

impl JsonReporter {
    fn emit(event: &MachineEvent<'_>) {
        match serde_json::to_string(event) {
            // ONLY JsonReporter touches stdout
            Ok(json) => println!("{}", json),
            Err(e) => tracing::error!("failed to encode event: {}", e),
        }
    }
}

impl Reporter for JsonReporter {
    fn on_run_start(&mut self, scenario: &str, count: usize) {
        Self::emit(&MachineEvent::RunStart { scenario, count });
    }

    fn on_variant_start(&mut self, id: &str) {
        Self::emit(&MachineEvent::VariantStart { id });
    }

    fn on_step(&mut self, id: &str, index: usize, step: &Step, status: &str, detail: Option<&str>) {
        Self::emit(&MachineEvent::Step {
            id,
            index,
            step,
            status,
            detail,
        });
    }

    fn on_variant_finished(&mut self, id: &str, status: &str, duration_ms: u64, message: Option<&str>) {
        Self::emit(&MachineEvent::VariantFinished {
            id,
            status,
            duration_ms,
            message,
        });
    }

    fn on_run_finished(&mut self, passed: usize, failed: usize, skipped: usize, duration_ms: u64) {
        Self::emit(&MachineEvent::RunFinished {
            passed,
            failed,
            skipped,
            duration_ms,
        });
    }

    fn on_error(&mut self, message: &str) {
        Self::emit(&MachineEvent::Error { message });
    }
}

/// Human Reporter - outputs readable text to stderr
pub struct HumanReporter;

impl Reporter for HumanReporter {
    fn on_run_start(&mut self, scenario: &str, count: usize) {
        eprintln!("[watch-harness] {}: {} variant(s)\n", scenario, count);
    }

    fn on_variant_start(&mut self, id: &str) {
        eprintln!("  {}", id);
    }

    fn on_step(&mut self, _id: &str, index: usize, step: &Step, status: &str, detail: Option<&str>) {
        match status {
            "pass" => eprintln!("    ✓ [{}] {}", index, step),
            _ => {
                eprintln!("    ✗ [{}] {}", index, step);
                if let Some(msg) = detail {
                    eprintln!("        {}", msg);
                }
            }
        }
    }

    fn on_variant_finished(&mut self, _id: &str, status: &str, duration_ms: u64, message: Option<&str>) {
        match status {
            "pass" => eprintln!("  ✓ passed ({}ms)\n", duration_ms),
            "skip" => eprintln!("  ⊘ skipped{}\n", message.map(|m| format!(": {}", m)).unwrap_or_default()),
            _ => {
                eprintln!("  ✗ failed ({}ms)", duration_ms);
                if let Some(msg) = message {
                    for line in msg.lines().take(10) {
                        eprintln!("    {}", line);
                    }
                }
                eprintln!();
            }
        }
    }

    fn on_run_finished(&mut self, passed: usize, failed: usize, skipped: usize, duration_ms: u64) {
        eprintln!(
            "[watch-harness] {} passed, {} failed, {} skipped in {}ms",
            passed, failed, skipped, duration_ms
        );
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("[watch-harness] FATAL ERROR: {}", message);
    }
}

// =============================================================================
// MultiReporter
// =============================================================================

/// MultiReporter - broadcasts events to multiple reporters
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn on_run_start(&mut self, scenario: &str, count: usize) {
        for r in &mut self.reporters {
            r.on_run_start(scenario, count);
        }
    }

    fn on_variant_start(&mut self, id: &str) {
        for r in &mut self.reporters {
            r.on_variant_start(id);
        }
    }

    fn on_step(&mut self, id: &str, index: usize, step: &Step, status: &str, detail: Option<&str>) {
        for r in &mut self.reporters {
            r.on_step(id, index, step, status, detail);
        }
    }

    fn on_variant_finished(&mut self, id: &str, status: &str, duration_ms: u64, message: Option<&str>) {
        for r in &mut self.reporters {
            r.on_variant_finished(id, status, duration_ms, message);
        }
    }

    fn on_run_finished(&mut self, passed: usize, failed: usize, skipped: usize, duration_ms: u64) {
        for r in &mut self.reporters {
            r.on_run_finished(passed, failed, skipped, duration_ms);
        }
    }

    fn on_error(&mut self, message: &str) {
        for r in &mut self.reporters {
            r.on_error(message);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_variant_serialization() {
        let event = MachineEvent::VariantFinished {
            id: "watcher::can run watcher",
            status: "pass",
            duration_ms: 42,
            message: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"variant_finished\""));
        assert!(json.contains("\"id\":\"watcher::can run watcher\""));
        assert!(json.contains("\"status\":\"pass\""));
        assert!(!json.contains("message")); // skip_serializing_if = None
    }

    #[test]
    fn test_json_step_serializes_step() {
        let step = Step::Expect("1 failing".to_string());
        let event = MachineEvent::Step {
            id: "watcher::w",
            index: 7,
            step: &step,
            status: "fail",
            detail: Some("Expected '  2 failing' to include '1 failing'."),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"step\":{\"expect\":\"1 failing\"}"));
        assert!(json.contains("\"index\":7"));
        assert!(json.contains("\"detail\":"));
    }

    #[test]
    fn test_json_unit_step() {
        let step = Step::Terminate;
        let event = MachineEvent::Step {
            id: "watcher::w",
            index: 0,
            step: &step,
            status: "pass",
            detail: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"step\":\"terminate\""));
    }

    #[test]
    fn test_error_event() {
        let event = MachineEvent::Error {
            message: "Line reader closed.",
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"error\""));
    }

    /// Records calls to verify MultiReporter fan-out
    struct Recorder(std::rc::Rc<std::cell::RefCell<Vec<String>>>);

    impl Reporter for Recorder {
        fn on_run_start(&mut self, scenario: &str, _count: usize) {
            self.0.borrow_mut().push(format!("start {}", scenario));
        }
        fn on_variant_start(&mut self, _id: &str) {}
        fn on_step(&mut self, _id: &str, index: usize, _step: &Step, status: &str, _detail: Option<&str>) {
            self.0.borrow_mut().push(format!("step {} {}", index, status));
        }
        fn on_variant_finished(&mut self, _id: &str, _status: &str, _ms: u64, _msg: Option<&str>) {}
        fn on_run_finished(&mut self, passed: usize, failed: usize, _skipped: usize, _ms: u64) {
            self.0.borrow_mut().push(format!("done {}/{}", passed, failed));
        }
        fn on_error(&mut self, _message: &str) {}
    }

    #[test]
    fn test_multi_reporter_fans_out() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut multi = MultiReporter::new(vec![
            Box::new(Recorder(log.clone())),
            Box::new(Recorder(log.clone())),
        ]);

        multi.on_run_start("watcher", 1);
        multi.on_step("watcher::w", 3, &Step::Skip(1), "pass", None);
        multi.on_run_finished(1, 0, 0, 10);

        let log = log.borrow();
        assert_eq!(log.len(), 6);
        assert_eq!(log[0], "start watcher");
        assert_eq!(log[2], "step 3 pass");
        assert_eq!(log[5], "done 1/0");
    }
}
