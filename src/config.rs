//! Configuration Loader
//! - Reads scenario TOML files (command, fixture directory, expected output script)
//! - Provides CLI argument parsing with clap

use crate::error::{HarnessError, Result};
use crate::process::ProcessSpec;
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// CLI Configuration
// =============================================================================

/// Output format for harness results
#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Human-readable CLI output (to stderr)
    #[default]
    Human,
    /// Machine-readable NDJSON (to stdout)
    Json,
}

/// Watch Harness CLI - drive a watch-mode process and check its output
#[derive(Parser)]
#[command(name = "watch-harness", version, about = "Drive a watch-mode process and check its output")]
pub struct Cli {
    /// Output format (also: WATCH_HARNESS_FORMAT env var)
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, env = "WATCH_HARNESS_FORMAT")]
    pub format: OutputFormat,

    /// Path to generate JUnit XML report (also: WATCH_HARNESS_JUNIT_XML env var)
    #[arg(long, env = "WATCH_HARNESS_JUNIT_XML")]
    pub junit_xml: Option<PathBuf>,

    /// Only run the variant with this name
    #[arg(long)]
    pub variant: Option<String>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Scenario file (TOML)
    pub scenario: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands
#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Commands {
    /// Run the scenario (default if no subcommand)
    Run,
    /// List the scenario's variants without running
    List,
}

// =============================================================================
// Scenario Configuration
// =============================================================================

/// One instruction of the output script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Read and discard this many lines
    Skip(usize),
    /// Read one line; it must contain this fragment
    Expect(String),
    /// Write the named entry of `[files]` into the fixture directory
    Write(String),
    /// Remove a file from the fixture directory if present
    Remove(String),
    /// Interrupt the process and wait for it to exit
    Terminate,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Skip(1) => write!(f, "skip 1 line"),
            Step::Skip(n) => write!(f, "skip {} lines", n),
            Step::Expect(s) => write!(f, "expect \"{}\"", s),
            Step::Write(p) => write!(f, "write {}", p),
            Step::Remove(p) => write!(f, "remove {}", p),
            Step::Terminate => write!(f, "terminate"),
        }
    }
}

/// A parameterised run of a scenario
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variant {
    pub name: String,
    /// Extra environment for this run, on top of the scenario's
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Command run to completion in `cwd` before the watcher starts
    #[serde(default)]
    pub setup: Vec<String>,
}

fn default_cwd() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_secs() -> u64 {
    90
}

fn default_grace_secs() -> u64 {
    5
}

/// A watch-mode scenario loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    /// Fixture directory; relative paths are resolved against the scenario file
    #[serde(default = "default_cwd")]
    pub cwd: PathBuf,
    /// Program followed by its arguments. No shell is involved.
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Seconds between SIGINT and SIGKILL on terminate
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// OS families (`unix`, `windows`) or names (`linux`, `macos`) to skip on
    #[serde(default)]
    pub skip_on: Vec<String>,
    /// Files removed before and after every variant
    #[serde(default)]
    pub cleanup: Vec<String>,
    /// Trigger file contents keyed by path relative to `cwd`
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Load and validate a scenario file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml(&contents, base)
            .with_context(|| format!("Failed to load scenario {}", path.display()))
    }

    /// Parse a scenario, resolving a relative `cwd` against `base`
    pub fn from_toml(contents: &str, base: &Path) -> anyhow::Result<Self> {
        let mut scenario: Scenario = toml::from_str(contents)?;
        if scenario.cwd.is_relative() {
            scenario.cwd = base.join(&scenario.cwd);
        }
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(HarnessError::Config("command must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(HarnessError::Config("timeout_secs must be positive".to_string()));
        }
        if self.steps.is_empty() {
            return Err(HarnessError::Config("steps must not be empty".to_string()));
        }
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::Skip(0) => {
                    return Err(HarnessError::Config(format!("step {}: skip count must be positive", i)));
                }
                Step::Write(path) if !self.files.contains_key(path) => {
                    return Err(HarnessError::Config(format!(
                        "step {}: no [files] entry for {}",
                        i, path
                    )));
                }
                _ => {}
            }
        }
        let mut seen = Vec::new();
        for variant in &self.variants {
            if seen.contains(&&variant.name) {
                return Err(HarnessError::Config(format!(
                    "duplicate variant name {}",
                    variant.name
                )));
            }
            seen.push(&variant.name);
        }
        Ok(())
    }

    /// Variants to run; a scenario without any runs once under its own name
    pub fn variants(&self) -> Vec<Variant> {
        if self.variants.is_empty() {
            vec![Variant {
                name: self.name.clone(),
                env: BTreeMap::new(),
                setup: Vec::new(),
            }]
        } else {
            self.variants.clone()
        }
    }

    /// True if the current platform is listed in `skip_on`
    pub fn skipped_here(&self) -> bool {
        self.skipped_on(std::env::consts::FAMILY, std::env::consts::OS)
    }

    fn skipped_on(&self, family: &str, os: &str) -> bool {
        self.skip_on
            .iter()
            .any(|s| s.eq_ignore_ascii_case(family) || s.eq_ignore_ascii_case(os))
    }

    /// Setup command for one variant, if it has one
    pub fn setup_spec(&self, variant: &Variant) -> Option<ProcessSpec> {
        let (program, args) = variant.setup.split_first()?;
        let mut spec = ProcessSpec::new(program.clone(), self.cwd.clone()).args(args.iter().cloned());
        for (k, v) in self.env.iter().chain(variant.env.iter()) {
            spec = spec.env(k.clone(), v.clone());
        }
        Some(spec)
    }

    /// Launch description for one variant
    pub fn process_spec(&self, variant: &Variant) -> Result<ProcessSpec> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| HarnessError::Config("command must not be empty".to_string()))?;
        let mut spec = ProcessSpec::new(program.clone(), self.cwd.clone())
            .args(args.iter().cloned())
            .grace(Duration::from_secs(self.grace_secs));
        for (k, v) in self.env.iter().chain(variant.env.iter()) {
            spec = spec.env(k.clone(), v.clone());
        }
        Ok(spec)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
