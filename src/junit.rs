//! JUnit XML Reporter for CI Integration
//!
//! One `<testcase>` per scenario variant. The step transcript goes into
//! `<system-out>` so a CI failure shows what the watcher printed.

use crate::config::Step;
use crate::reporter::Reporter;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Strip ANSI color codes (mocha colours its output) and null bytes
fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // CSI sequences end at the first letter
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else if c != '\0' {
            result.push(c);
        }
    }
    result
}

// =============================================================================
// XML Schema Structs (JUnit Format)
// =============================================================================

#[derive(Serialize)]
#[serde(rename = "testsuites")]
struct TestSuites {
    #[serde(rename = "testsuite")]
    suites: Vec<TestSuite>,
}

#[derive(Serialize)]
struct TestSuite {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@tests")]
    tests: usize,
    #[serde(rename = "@failures")]
    failures: usize,
    #[serde(rename = "@errors")]
    errors: usize,
    #[serde(rename = "@skipped")]
    skipped: usize,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(rename = "testcase")]
    cases: Vec<TestCase>,
    #[serde(rename = "system-err", skip_serializing_if = "Option::is_none")]
    system_err: Option<String>,
}

#[derive(Serialize)]
struct TestCase {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@classname")]
    classname: String,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<Skipped>,
    #[serde(rename = "system-out", skip_serializing_if = "Option::is_none")]
    system_out: Option<String>,
}

#[derive(Serialize)]
struct Failure {
    #[serde(rename = "@message")]
    message: String,
    #[serde(rename = "$text")]
    body: String,
}

#[derive(Serialize)]
struct Skipped {
    #[serde(rename = "@message")]
    message: String,
}

// =============================================================================
// JunitReporter
// =============================================================================

/// Reporter that buffers variant results and writes JUnit XML on completion
pub struct JunitReporter {
    output_path: PathBuf,
    suite_name: String,
    cases: Vec<TestCase>,
    transcript: Vec<String>,
    error_message: Option<String>,
}

impl JunitReporter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            output_path: path,
            suite_name: String::from("watch-harness"),
            cases: Vec::new(),
            transcript: Vec::new(),
            error_message: None,
        }
    }

    /// Render the buffered cases as a JUnit document
    fn render(&mut self, passed: usize, failed: usize, skipped: usize, duration_ms: u64) -> Result<String, quick_xml::DeError> {
        let errors = usize::from(self.error_message.is_some());
        let suite = TestSuite {
            name: self.suite_name.clone(),
            tests: passed + failed + skipped,
            failures: failed,
            errors,
            skipped,
            time: duration_ms as f64 / 1000.0,
            cases: std::mem::take(&mut self.cases),
            system_err: self.error_message.as_deref().map(strip_ansi_codes),
        };
        let root = TestSuites {
            suites: vec![suite],
        };
        let xml = quick_xml::se::to_string(&root)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml))
    }
}

fn write_report(path: &Path, xml: &str) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(xml.as_bytes())?;
    writer.flush()
}

impl Reporter for JunitReporter {
    fn on_run_start(&mut self, scenario: &str, _count: usize) {
        self.suite_name = scenario.to_string();
        self.cases.clear();
        self.transcript.clear();
        self.error_message = None;
    }

    fn on_variant_start(&mut self, _id: &str) {
        self.transcript.clear();
    }

    fn on_step(&mut self, _id: &str, index: usize, step: &Step, status: &str, detail: Option<&str>) {
        let mut entry = format!("[{}] {} {}", index, status, step);
        if let Some(detail) = detail.filter(|d| !d.is_empty()) {
            entry.push_str(" => ");
            entry.push_str(&strip_ansi_codes(detail));
        }
        self.transcript.push(entry);
    }

    fn on_variant_finished(&mut self, id: &str, status: &str, duration_ms: u64, message: Option<&str>) {
        // "scenario::variant" -> classname, name
        let (classname, name) = id.split_once("::").unwrap_or((self.suite_name.as_str(), id));
        let (classname, name) = (classname.to_string(), name.to_string());

        let failure = match status {
            "pass" | "skip" => None,
            _ => Some(Failure {
                message: "Scenario failed".to_string(),
                body: strip_ansi_codes(message.unwrap_or("Scenario failed")),
            }),
        };
        let skipped = (status == "skip").then(|| Skipped {
            message: message.unwrap_or("skipped").to_string(),
        });
        let transcript = std::mem::take(&mut self.transcript);
        let system_out = (!transcript.is_empty()).then(|| transcript.join("\n"));

        self.cases.push(TestCase {
            name,
            classname,
            time: duration_ms as f64 / 1000.0,
            failure,
            skipped,
            system_out,
        });
    }

    fn on_run_finished(&mut self, passed: usize, failed: usize, skipped: usize, duration_ms: u64) {
        let xml = match self.render(passed, failed, skipped, duration_ms) {
            Ok(xml) => xml,
            Err(e) => {
                error!("Failed to serialize JUnit report: {}", e);
                return;
            }
        };
        match write_report(&self.output_path, &xml) {
            Ok(()) => info!("JUnit report written to {}", self.output_path.display()),
            Err(e) => error!("Failed to write JUnit report {}: {}", self.output_path.display(), e),
        }
    }

    fn on_error(&mut self, message: &str) {
        self.error_message = Some(message.to_string());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(strip_ansi_codes("\x1b[31mRed text\x1b[0m"), "Red text");
        assert_eq!(strip_ansi_codes("plain text"), "plain text");
        assert_eq!(strip_ansi_codes("\x1b[1m\x1b[31mBold Red\x1b[0m"), "Bold Red");
    }

    #[test]
    fn test_strip_null_bytes() {
        assert_eq!(strip_ansi_codes("text\0with\0nulls"), "textwithnulls");
    }

    #[test]
    fn test_strip_mocha_failing_line() {
        let input = "\x1b[31m  1 failing\x1b[0m";
        assert_eq!(strip_ansi_codes(input), "  1 failing");
    }

    #[test]
    fn test_variant_id_parsing() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_run_start("watcher", 1);
        reporter.on_variant_finished("watcher::can run watcher", "pass", 1500, None);

        assert_eq!(reporter.cases[0].classname, "watcher");
        assert_eq!(reporter.cases[0].name, "can run watcher");
        assert!((reporter.cases[0].time - 1.5).abs() < 0.001);
    }

    #[test]
    fn test_failure_and_skip_cases() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_run_start("watcher", 2);
        reporter.on_variant_finished(
            "watcher::a",
            "fail",
            50,
            Some("\x1b[31mExpected 'x' to include 'y'.\x1b[0m"),
        );
        reporter.on_variant_finished("watcher::b", "skip", 0, Some("skipped on windows"));

        let failure = reporter.cases[0].failure.as_ref().unwrap();
        assert_eq!(failure.body, "Expected 'x' to include 'y'.");
        assert!(reporter.cases[0].skipped.is_none());
        assert!(reporter.cases[1].failure.is_none());
        assert_eq!(
            reporter.cases[1].skipped.as_ref().unwrap().message,
            "skipped on windows"
        );
    }

    #[test]
    fn test_transcript_goes_to_system_out() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_run_start("watcher", 1);
        reporter.on_variant_start("watcher::a");
        reporter.on_step("watcher::a", 0, &Step::Expect("Run mocha.".into()), "pass", Some("Run mocha."));
        reporter.on_step("watcher::a", 1, &Step::Terminate, "pass", Some(""));
        reporter.on_variant_finished("watcher::a", "pass", 10, None);

        let out = reporter.cases[0].system_out.as_deref().unwrap();
        assert_eq!(
            out,
            "[0] pass expect \"Run mocha.\" => Run mocha.\n[1] pass terminate"
        );
        assert!(reporter.transcript.is_empty());
    }

    #[test]
    fn test_run_start_clears_state() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_variant_finished("s::a", "pass", 10, None);
        reporter.on_error("some error");

        reporter.on_run_start("s", 0);
        assert!(reporter.cases.is_empty());
        assert!(reporter.error_message.is_none());
    }

    #[test]
    fn test_report_written_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xml");
        let mut reporter = JunitReporter::new(path.clone());

        reporter.on_run_start("watcher", 2);
        reporter.on_variant_finished("watcher::a", "pass", 10, None);
        reporter.on_variant_finished("watcher::b", "fail", 20, Some("Line reader closed."));
        reporter.on_run_finished(1, 1, 0, 30);

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<testsuite name=\"watcher\""));
        assert!(xml.contains("tests=\"2\""));
        assert!(xml.contains("failures=\"1\""));
        assert!(xml.contains("Line reader closed."));
        assert!(xml.contains("errors=\"0\""));
        assert!(!xml.contains("<system-err>"));
    }

    #[test]
    fn test_run_error_goes_to_system_err() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xml");
        let mut reporter = JunitReporter::new(path.clone());

        reporter.on_run_start("watcher", 1);
        reporter.on_error("\x1b[31mno variant named nope\x1b[0m");
        reporter.on_run_finished(0, 0, 0, 5);

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("errors=\"1\""));
        assert!(xml.contains("<system-err>no variant named nope</system-err>"));
    }
}
